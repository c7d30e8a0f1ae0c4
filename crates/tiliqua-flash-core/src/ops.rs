//! Write operations
//!
//! Turns a validated resolution into the ordered list of writes a flashing
//! backend has to perform. The list is built in one pass and then the reset
//! policy is applied over the finished list, so that exactly one reset
//! happens, after the last byte has been written.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, info};

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::layout::{FlashableRegion, Resolution};
use crate::manifest::{RegionType, ERASED_BYTE};

/// How the backend should interpret a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Raw bytes, written as-is
    Raw,
    /// Bitstream container
    Bit,
}

impl Encoding {
    /// Encoding for the contents of a region
    pub fn for_region(region_type: RegionType) -> Self {
        match region_type {
            RegionType::Bitstream => Self::Bit,
            _ => Self::Raw,
        }
    }

    /// Name understood by flashing tools
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Bit => "bit",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A file from the bundle
    File {
        /// File name within the bundle
        name: String,
        /// File contents
        data: Vec<u8>,
    },
    /// Bytes produced while planning (manifest block, erase fill)
    Generated {
        /// Short description for logs
        label: String,
        /// Contents
        data: Vec<u8>,
    },
}

impl Payload {
    /// File name or label
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } => name,
            Self::Generated { label, .. } => label,
        }
    }

    /// Bytes to write
    pub fn data(&self) -> &[u8] {
        match self {
            Self::File { data, .. } | Self::Generated { data, .. } => data,
        }
    }

    /// Bundle file name, if this payload comes from the bundle
    pub fn bundle_file(&self) -> Option<&str> {
        match self {
            Self::File { name, .. } => Some(name),
            Self::Generated { .. } => None,
        }
    }
}

/// One write to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashOperation {
    /// What to write
    pub payload: Payload,
    /// Flash offset to write at
    pub offset: u32,
    /// How the backend should interpret the payload
    pub encoding: Encoding,
    /// Keep the device out of reset after this write
    pub suppress_reset: bool,
}

impl FlashOperation {
    fn new(payload: Payload, offset: u32, encoding: Encoding) -> Self {
        Self {
            payload,
            offset,
            encoding,
            suppress_reset: false,
        }
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.payload.data().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.data().is_empty()
    }
}

impl fmt::Display for FlashOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:06x}  {} ({} bytes, {})",
            self.offset,
            self.payload.name(),
            self.len(),
            self.encoding
        )?;
        if self.suppress_reset {
            write!(f, " [skip reset]")?;
        }
        Ok(())
    }
}

/// Flash order of a region kind; lower goes first
fn write_rank(region_type: RegionType) -> u8 {
    match region_type {
        RegionType::Bitstream => 0,
        RegionType::XipFirmware | RegionType::RamLoad => 1,
        RegionType::OptionStorage => 2,
        RegionType::Manifest => 3,
    }
}

fn file_operation(region: &FlashableRegion, bundle: &Bundle) -> Result<Option<FlashOperation>> {
    let Some(filename) = region.filename.as_deref() else {
        debug!("Region '{}' has no file, nothing to write", region.name);
        return Ok(None);
    };
    let data = bundle.payload(filename)?;
    if data.len() > region.size as usize {
        return Err(Error::PayloadTooLarge {
            filename: filename.to_string(),
            len: data.len(),
            size: region.size,
        });
    }
    let payload = Payload::File {
        name: filename.to_string(),
        data: data.to_vec(),
    };
    Ok(Some(FlashOperation::new(
        payload,
        region.addr,
        Encoding::for_region(region.region_type),
    )))
}

/// Build the write operations for a resolved layout
///
/// Operations come out bitstream first, then firmware in manifest order,
/// then option storage erases (only when `erase_option_storage` is set),
/// then `manifest_block` at the manifest address. The manifest file in the
/// bundle is never written: `manifest_block` must be the encoding of the
/// resolved manifest.
///
/// The reset policy is already applied to the returned list.
pub fn sequence(
    resolution: &Resolution,
    bundle: &Bundle,
    manifest_block: &[u8],
    erase_option_storage: bool,
) -> Result<Vec<FlashOperation>> {
    let mut ordered: Vec<&FlashableRegion> = resolution.regions.iter().collect();
    ordered.sort_by_key(|r| write_rank(r.region_type));

    let mut operations = Vec::new();
    for region in ordered {
        let op = match region.region_type {
            RegionType::Bitstream | RegionType::XipFirmware | RegionType::RamLoad => {
                file_operation(region, bundle)?
            }
            RegionType::OptionStorage if erase_option_storage => Some(FlashOperation::new(
                Payload::Generated {
                    label: format!("erase {}", region.name),
                    data: vec![ERASED_BYTE; region.size as usize],
                },
                region.addr,
                Encoding::Raw,
            )),
            RegionType::OptionStorage => {
                info!("Leaving option storage at 0x{:x} untouched", region.addr);
                None
            }
            RegionType::Manifest => Some(FlashOperation::new(
                Payload::Generated {
                    label: "manifest".to_string(),
                    data: manifest_block.to_vec(),
                },
                region.addr,
                Encoding::Raw,
            )),
        };
        if let Some(op) = op {
            debug!("Queued write: {}", op);
            operations.push(op);
        }
    }

    Ok(apply_reset_policy(operations))
}

/// Let only the last operation reset the device
pub fn apply_reset_policy(operations: Vec<FlashOperation>) -> Vec<FlashOperation> {
    let last = operations.len().saturating_sub(1);
    operations
        .into_iter()
        .enumerate()
        .map(|(i, op)| FlashOperation {
            suppress_reset: i != last,
            ..op
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{resolve, FlashGeometry};
    use crate::manifest::{encode_block, BitstreamManifest, MemoryRegion, MANIFEST_SIZE};

    fn manifest() -> BitstreamManifest {
        BitstreamManifest::new(
            4,
            "xbeam",
            "v1",
            vec![
                MemoryRegion::without_file(RegionType::OptionStorage, 0x1_0000),
                MemoryRegion::new("manifest.json", RegionType::Manifest, 1024).unwrap(),
                MemoryRegion::new("fw.bin", RegionType::RamLoad, 0x100)
                    .unwrap()
                    .with_psram_dst(0x2000_0000),
                MemoryRegion::new("top.bit", RegionType::Bitstream, 0x200).unwrap(),
                MemoryRegion::new("data.bin", RegionType::RamLoad, 0x100)
                    .unwrap()
                    .with_psram_dst(0x2010_0000),
            ],
        )
        .unwrap()
    }

    fn bundle() -> Bundle {
        let mut bundle = Bundle::new();
        bundle.insert("top.bit", vec![0xAA; 0x200]);
        bundle.insert("fw.bin", vec![0x11; 0x80]);
        bundle.insert("data.bin", vec![0x22; 0x100]);
        bundle.insert("manifest.json", b"{}".to_vec());
        bundle
    }

    fn build(erase: bool) -> Result<Vec<FlashOperation>> {
        let resolution = resolve(&manifest(), Some(1), &FlashGeometry::default())?;
        let block = encode_block(&resolution.manifest)?;
        sequence(&resolution, &bundle(), &block, erase)
    }

    #[test]
    fn test_operation_order() {
        let ops = build(false).unwrap();
        let names: Vec<_> = ops.iter().map(|op| op.payload.name()).collect();
        assert_eq!(names, ["top.bit", "fw.bin", "data.bin", "manifest"]);

        assert_eq!(ops[0].offset, 0x20_0000);
        assert_eq!(ops[0].encoding, Encoding::Bit);
        assert_eq!(ops[1].offset, 0x29_0000);
        assert_eq!(ops[2].offset, 0x2A_0000);
        assert_eq!(ops[3].offset, 0x2F_0000);
        assert_eq!(ops[3].len(), MANIFEST_SIZE);
        assert!(ops[1..].iter().all(|op| op.encoding == Encoding::Raw));
    }

    #[test]
    fn test_single_reset_at_end() {
        for erase in [false, true] {
            let ops = build(erase).unwrap();
            let resets: Vec<_> = ops.iter().filter(|op| !op.suppress_reset).collect();
            assert_eq!(resets.len(), 1);
            assert!(!ops.last().unwrap().suppress_reset);
        }
    }

    #[test]
    fn test_option_storage_erase_is_opt_in() {
        let ops = build(false).unwrap();
        assert!(ops.iter().all(|op| op.offset != 0x2E_0000));

        let ops = build(true).unwrap();
        let erase = &ops[3];
        assert_eq!(erase.offset, 0x2E_0000);
        assert_eq!(erase.len(), 0x1_0000);
        assert!(erase.payload.data().iter().all(|&b| b == ERASED_BYTE));
        assert_eq!(erase.payload.bundle_file(), None);
        assert_eq!(ops.last().unwrap().payload.name(), "manifest");
    }

    #[test]
    fn test_manifest_block_replaces_bundle_manifest() {
        let ops = build(false).unwrap();
        let manifest_op = ops.last().unwrap();
        assert_eq!(manifest_op.payload.bundle_file(), None);
        assert_ne!(manifest_op.payload.data(), b"{}");
    }

    #[test]
    fn test_missing_payload() {
        let resolution = resolve(&manifest(), Some(1), &FlashGeometry::default()).unwrap();
        let mut bundle = bundle();
        bundle.remove("data.bin");
        let err = sequence(&resolution, &bundle, &[], false).unwrap_err();
        assert_eq!(
            err,
            Error::MissingPayload {
                filename: "data.bin".to_string()
            }
        );
    }

    #[test]
    fn test_payload_larger_than_region() {
        let resolution = resolve(&manifest(), Some(1), &FlashGeometry::default()).unwrap();
        let mut bundle = bundle();
        bundle.insert("fw.bin", vec![0; 0x101]);
        let err = sequence(&resolution, &bundle, &[], false).unwrap_err();
        assert_eq!(
            err,
            Error::PayloadTooLarge {
                filename: "fw.bin".to_string(),
                len: 0x101,
                size: 0x100,
            }
        );
    }

    #[test]
    fn test_reset_policy_edge_cases() {
        assert!(apply_reset_policy(Vec::new()).is_empty());

        let op = FlashOperation::new(
            Payload::Generated {
                label: "x".to_string(),
                data: vec![1],
            },
            0,
            Encoding::Raw,
        );
        let mut suppressed = op.clone();
        suppressed.suppress_reset = true;
        let ops = apply_reset_policy(vec![suppressed]);
        assert!(!ops[0].suppress_reset);

        let ops = apply_reset_policy(vec![op.clone(), op.clone(), op]);
        let flags: Vec<_> = ops.iter().map(|op| op.suppress_reset).collect();
        assert_eq!(flags, [true, true, false]);
    }

    #[test]
    fn test_display() {
        let ops = build(false).unwrap();
        assert_eq!(
            ops[0].to_string(),
            "0x200000  top.bit (512 bytes, bit) [skip reset]"
        );
        assert_eq!(
            ops[3].to_string(),
            "0x2f0000  manifest (1024 bytes, raw)"
        );
    }
}
