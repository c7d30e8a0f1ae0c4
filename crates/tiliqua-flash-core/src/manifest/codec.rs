//! Manifest encoding
//!
//! Manifests are stored as compact JSON at the start of a fixed-size block
//! of [`MANIFEST_SIZE`] bytes. The rest of the block is left in the erased
//! state (0xFF), so a reader finds the end of the document by scanning for
//! the first 0x00 or 0xFF byte. JSON produced here never contains either:
//! 0xFF is not valid UTF-8 and NUL is always escaped.

use alloc::string::ToString;
use alloc::vec::Vec;

use super::types::ManifestDocument;
use super::{BitstreamManifest, MANIFEST_SIZE};
use crate::error::{Error, Result};
use crate::layout::{manifest_addresses, SlotLayout};

/// Byte value of erased flash
pub const ERASED_BYTE: u8 = 0xFF;

/// Number of leading bytes kept when a block fails to parse
const INVALID_PREVIEW_LEN: usize = 32;

/// Serialize a manifest to JSON, leaving out absent optional fields
pub fn to_json(manifest: &BitstreamManifest) -> Result<Vec<u8>> {
    serde_json::to_vec(manifest).map_err(|e| Error::Json(e.to_string()))
}

/// Parse a manifest from a JSON document
///
/// Bounded fields are checked while converting, so an over-long name or too
/// many regions is reported as a schema violation rather than a JSON error.
pub fn from_json_slice(data: &[u8]) -> Result<BitstreamManifest> {
    let doc: ManifestDocument =
        serde_json::from_slice(data).map_err(|e| Error::Json(e.to_string()))?;
    BitstreamManifest::try_from(doc)
}

/// Encode a manifest into a block ready to be written to flash
///
/// The block is always exactly [`MANIFEST_SIZE`] bytes, padded with 0xFF.
pub fn encode_block(manifest: &BitstreamManifest) -> Result<Vec<u8>> {
    let mut block = to_json(manifest)?;
    if block.len() > MANIFEST_SIZE {
        return Err(Error::ManifestTooLarge {
            size: block.len(),
            max: MANIFEST_SIZE,
        });
    }
    log::debug!(
        "Manifest encoded to {} bytes, padding to {}",
        block.len(),
        MANIFEST_SIZE
    );
    block.resize(MANIFEST_SIZE, ERASED_BYTE);
    Ok(block)
}

/// Length of the document at the start of a block
pub fn content_len(block: &[u8]) -> usize {
    block
        .iter()
        .position(|&b| b == 0x00 || b == ERASED_BYTE)
        .unwrap_or(block.len())
}

/// Decode a manifest from a block read back from flash
pub fn decode_block(block: &[u8]) -> Result<BitstreamManifest> {
    from_json_slice(&block[..content_len(block)])
}

/// What a manifest block read from flash contains
#[derive(Debug, Clone, PartialEq)]
pub enum BlockContents {
    /// Every byte is erased
    Empty,
    /// A manifest that parsed cleanly
    Valid(BitstreamManifest),
    /// Something that is not a manifest
    Invalid {
        /// The first bytes of the block, for diagnostics
        first_bytes: Vec<u8>,
        /// Why decoding failed
        error: Error,
    },
}

/// Classify a manifest block read back from flash
pub fn inspect_block(block: &[u8]) -> BlockContents {
    if block.iter().all(|&b| b == ERASED_BYTE) {
        return BlockContents::Empty;
    }
    match decode_block(block) {
        Ok(manifest) => BlockContents::Valid(manifest),
        Err(error) => BlockContents::Invalid {
            first_bytes: block[..block.len().min(INVALID_PREVIEW_LEN)].to_vec(),
            error,
        },
    }
}

/// Manifest block found at one slot of a flash image
#[derive(Debug, Clone, PartialEq)]
pub struct SlotManifest {
    /// Slot number, `None` for the bootloader region
    pub slot: Option<usize>,
    /// Flash address of the block
    pub addr: u32,
    /// What the block holds
    pub contents: BlockContents,
}

/// Read the manifest block of the bootloader region and of every slot
///
/// `image` is a flash dump starting at address 0. Blocks that lie past the
/// end of the image are left out.
pub fn inspect_image(image: &[u8]) -> Vec<SlotManifest> {
    let bootloader = (None, SlotLayout::bootloader().manifest_addr());
    let slots = manifest_addresses().map(|(slot, addr)| (Some(slot), addr));

    core::iter::once(bootloader)
        .chain(slots)
        .filter_map(|(slot, addr)| {
            let start = addr as usize;
            let block = image.get(start..start + MANIFEST_SIZE)?;
            Some(SlotManifest {
                slot,
                addr,
                contents: inspect_block(block),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{
        BitstreamHelp, ExternalPllConfig, MemoryRegion, RegionType, HELP_IO_LEFT_N,
        HELP_IO_RIGHT_N,
    };
    use alloc::string::String;
    use alloc::vec;

    fn sample() -> BitstreamManifest {
        BitstreamManifest::new(
            4,
            "xbeam",
            "a1b2c3",
            vec![
                MemoryRegion::new("top.bit", RegionType::Bitstream, 0x5_0000).unwrap(),
                MemoryRegion::new("firmware.bin", RegionType::RamLoad, 0x1234)
                    .unwrap()
                    .with_psram_dst(0x2020_0000)
                    .with_crc(0xDEAD_BEEF),
                MemoryRegion::without_file(RegionType::OptionStorage, 0x2_0000),
                MemoryRegion::new("manifest.json", RegionType::Manifest, 1024).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let json = String::from_utf8(to_json(&sample()).unwrap()).unwrap();
        assert!(!json.contains("null"));
        assert!(!json.contains("help"));
        assert!(!json.contains("external_pll_config"));
        assert!(json.contains("\"region_type\":\"RamLoad\""));
        assert!(json.contains("\"psram_dst\":538968064"));
    }

    #[test]
    fn test_block_round_trip() {
        let manifest = sample()
            .with_help(
                BitstreamHelp::new(
                    "Vector scope",
                    "1280x720p60",
                    &["in0"; HELP_IO_LEFT_N],
                    &["-"; HELP_IO_RIGHT_N],
                )
                .unwrap(),
            )
            .with_external_pll_config(ExternalPllConfig {
                clk0_hz: 12_288_000,
                clk1_hz: None,
                clk1_inherit: true,
                spread_spectrum: Some(0.01),
            });

        let block = encode_block(&manifest).unwrap();
        assert_eq!(block.len(), MANIFEST_SIZE);
        assert_eq!(*block.last().unwrap(), ERASED_BYTE);
        assert_eq!(decode_block(&block).unwrap(), manifest);
    }

    #[test]
    fn test_manifest_too_large() {
        let regions = (0..5).map(|i| {
            MemoryRegion::new("0123456789abcdef", RegionType::RamLoad, 0xFFFF_FFFF)
                .unwrap()
                .with_psram_dst(0xFFFF_FFF0 + i)
                .with_crc(0xFFFF_FFFF)
                .with_spiflash_src(0xFFFF_FFFF)
        });
        let manifest = BitstreamManifest::new(
            0xFFFF_FFFF,
            "0123456789abcdef0123456789abcdef",
            "01234567",
            regions,
        )
        .unwrap()
        .with_help(
            BitstreamHelp::new(
                &"b".repeat(64),
                &"v".repeat(64),
                &["01234567890123456789"; HELP_IO_LEFT_N],
                &["01234567890123456789"; HELP_IO_RIGHT_N],
            )
            .unwrap(),
        );

        let size = to_json(&manifest).unwrap().len();
        assert!(size > MANIFEST_SIZE);
        let err = encode_block(&manifest).unwrap_err();
        assert_eq!(
            err,
            Error::ManifestTooLarge {
                size,
                max: MANIFEST_SIZE
            }
        );
        assert_eq!(
            err.to_string(),
            alloc::format!("manifest too large: {} > 1024 bytes", size)
        );
    }

    #[test]
    fn test_content_boundary() {
        assert_eq!(content_len(b"{}\xff\xff"), 2);
        assert_eq!(content_len(b"{}\x00\xff"), 2);
        assert_eq!(content_len(b"{}"), 2);
        assert_eq!(content_len(b"\xff{}"), 0);
    }

    #[test]
    fn test_decode_null_terminated() {
        let mut block = to_json(&sample()).unwrap();
        block.push(0x00);
        block.resize(MANIFEST_SIZE, 0x00);
        assert_eq!(decode_block(&block).unwrap(), sample());
    }

    #[test]
    fn test_schema_checked_on_decode() {
        let doc = br#"{"hw_rev":4,"name":"xbeam","tag":"much_too_long","regions":[]}"#;
        let err = from_json_slice(doc).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));

        // Missing magic falls back to the default
        let doc = br#"{"hw_rev":4,"name":"xbeam","tag":"v1","regions":[]}"#;
        assert_eq!(
            from_json_slice(doc).unwrap().magic,
            crate::manifest::MANIFEST_MAGIC
        );
    }

    #[test]
    fn test_inspect_block() {
        assert_eq!(
            inspect_block(&[ERASED_BYTE; MANIFEST_SIZE]),
            BlockContents::Empty
        );
        assert_eq!(
            inspect_block(&encode_block(&sample()).unwrap()),
            BlockContents::Valid(sample())
        );

        let mut garbage = vec![0x42u8; 64];
        garbage.resize(MANIFEST_SIZE, ERASED_BYTE);
        match inspect_block(&garbage) {
            BlockContents::Invalid { first_bytes, error } => {
                assert_eq!(first_bytes, vec![0x42u8; 32]);
                assert!(matches!(error, Error::Json(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_inspect_image() {
        // Bootloader region and the first two slots only
        let mut image = vec![ERASED_BYTE; 0x30_0000];
        let block = encode_block(&sample()).unwrap();
        image[0x1F_0000..0x1F_0000 + MANIFEST_SIZE].copy_from_slice(&block);
        image[0xF_0000] = b'x';

        let found = inspect_image(&image);
        assert_eq!(found.len(), 3);
        assert_eq!((found[0].slot, found[0].addr), (None, 0xF_0000));
        assert!(matches!(found[0].contents, BlockContents::Invalid { .. }));
        assert_eq!(found[1].slot, Some(0));
        assert_eq!(found[1].contents, BlockContents::Valid(sample()));
        assert_eq!(found[2].contents, BlockContents::Empty);
    }
}
