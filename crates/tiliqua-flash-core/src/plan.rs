//! Flash planning
//!
//! The full pipeline from a bundle to a list of writes: hardware check,
//! region resolution, layout validation, manifest encoding and operation
//! sequencing. Every check runs before any operation is returned, so a
//! plan either comes back complete or not at all.

use alloc::vec::Vec;

use log::{info, warn};

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::layout::{resolve, validate, FlashGeometry, FlashableRegion, SlotLayout};
use crate::manifest::{encode_block, BitstreamManifest};
use crate::ops::{sequence, FlashOperation};

/// What to flash and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRequest {
    /// Target slot, `None` for the bootloader region
    pub slot: Option<usize>,
    /// Overwrite option storage with erased bytes
    pub erase_option_storage: bool,
    /// Hardware revision of the attached device, when known
    pub attached_hw_rev: Option<u32>,
    /// Flash part geometry
    pub geometry: FlashGeometry,
}

impl FlashRequest {
    /// Request for an optional slot
    pub fn new(slot: Option<usize>) -> Self {
        Self {
            slot,
            erase_option_storage: false,
            attached_hw_rev: None,
            geometry: FlashGeometry::default(),
        }
    }

    /// Flash a user slot
    pub fn slot(slot: usize) -> Self {
        Self::new(Some(slot))
    }

    /// Flash the bootloader region
    pub fn bootloader() -> Self {
        Self::new(None)
    }

    /// Also erase option storage
    pub fn with_erase_option_storage(mut self, erase: bool) -> Self {
        self.erase_option_storage = erase;
        self
    }

    /// Check the bundle against the attached hardware revision
    pub fn with_attached_hw_rev(mut self, hw_rev: u32) -> Self {
        self.attached_hw_rev = Some(hw_rev);
        self
    }

    /// Use a different flash geometry
    pub fn with_geometry(mut self, geometry: FlashGeometry) -> Self {
        self.geometry = geometry;
        self
    }
}

/// Validated layout plus the writes that install it
#[derive(Debug, Clone, PartialEq)]
pub struct FlashPlan {
    /// Manifest with every flash address filled in; this is what the
    /// manifest block holds
    pub manifest: BitstreamManifest,
    /// Regions that occupy flash, in manifest order
    pub regions: Vec<FlashableRegion>,
    /// Addresses of the target slot
    pub layout: SlotLayout,
    /// Writes to perform, strictly in this order
    pub operations: Vec<FlashOperation>,
}

impl FlashPlan {
    /// Total number of bytes written
    pub fn total_bytes(&self) -> usize {
        self.operations.iter().map(FlashOperation::len).sum()
    }

    /// Log the regions and operations of the plan
    pub fn print(&self) {
        match self.layout.slot_number() {
            Some(slot) => info!("Regions to flash into slot {}:", slot),
            None => info!("Regions to flash into the bootloader region:"),
        }
        for region in &self.regions {
            for line in alloc::format!("{}", region).lines() {
                info!("  {}", line);
            }
        }
        info!("Operations:");
        for op in &self.operations {
            info!("  {}", op);
        }
    }
}

/// Check that a bundle was built for the attached hardware
pub fn check_hardware(attached_hw_rev: u32, manifest: &BitstreamManifest) -> Result<()> {
    if attached_hw_rev != manifest.hw_rev {
        return Err(Error::HardwareMismatch {
            attached: attached_hw_rev,
            manifest: manifest.hw_rev,
        });
    }
    Ok(())
}

/// Plan the writes that install `bundle` as described by `manifest`
///
/// `manifest` is left untouched; the resolved copy is returned in the plan.
pub fn plan(
    manifest: &BitstreamManifest,
    bundle: &Bundle,
    request: &FlashRequest,
) -> Result<FlashPlan> {
    match request.attached_hw_rev {
        Some(attached) => check_hardware(attached, manifest)?,
        None => warn!("Attached hardware revision unknown, not checking bundle compatibility"),
    }

    let resolution = resolve(manifest, request.slot, &request.geometry)?;
    validate(&resolution, &request.geometry)?;

    let block = encode_block(&resolution.manifest)?;
    let operations = sequence(
        &resolution,
        bundle,
        &block,
        request.erase_option_storage,
    )?;

    info!(
        "Planned {} writes for '{}' ({})",
        operations.len(),
        resolution.manifest.name,
        resolution.manifest.tag
    );
    Ok(FlashPlan {
        manifest: resolution.manifest,
        regions: resolution.regions,
        layout: resolution.layout,
        operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SchemaViolation, SlotAssignmentError};
    use crate::manifest::{decode_block, MemoryRegion, RegionType};
    use alloc::string::ToString;
    use alloc::vec;

    fn manifest() -> BitstreamManifest {
        BitstreamManifest::new(
            4,
            "xbeam",
            "v1",
            vec![
                MemoryRegion::new("top.bit", RegionType::Bitstream, 0x4_0000).unwrap(),
                MemoryRegion::new("fw.bin", RegionType::RamLoad, 0x1234)
                    .unwrap()
                    .with_psram_dst(0x2020_0000),
                MemoryRegion::without_file(RegionType::OptionStorage, 0x1_0000),
                MemoryRegion::new("manifest.json", RegionType::Manifest, 1024).unwrap(),
            ],
        )
        .unwrap()
    }

    fn bundle() -> Bundle {
        [
            ("top.bit", vec![0xAAu8; 0x100]),
            ("fw.bin", vec![0x55u8; 0x1234]),
            ("manifest.json", vec![b'{', b'}']),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_plan_slot() {
        let request = FlashRequest::slot(3).with_attached_hw_rev(4);
        let plan = plan(&manifest(), &bundle(), &request).unwrap();

        assert_eq!(plan.layout.slot_number(), Some(3));
        assert_eq!(plan.operations.len(), 3);
        assert_eq!(plan.total_bytes(), 0x100 + 0x1234 + 1024);

        // The manifest block decodes to the resolved manifest
        let block = plan.operations.last().unwrap();
        assert_eq!(block.offset, 0x4F_0000);
        let written = decode_block(block.payload.data()).unwrap();
        assert_eq!(written, plan.manifest);
        assert_eq!(
            written.find_region(RegionType::RamLoad).unwrap().spiflash_src,
            Some(0x49_0000)
        );
        assert_eq!(written.option_storage_window(), Some(0x4E_0000..0x4F_0000));
    }

    #[test]
    fn test_hardware_mismatch() {
        let request = FlashRequest::slot(0).with_attached_hw_rev(3);
        let err = plan(&manifest(), &bundle(), &request).unwrap_err();
        assert_eq!(
            err,
            Error::HardwareMismatch {
                attached: 3,
                manifest: 4
            }
        );
        assert_eq!(
            err.to_string(),
            "attached hardware (hw=r3) does not match bundle (hw=r4)"
        );
    }

    #[test]
    fn test_fails_before_any_operation() {
        let err = plan(&manifest(), &bundle(), &FlashRequest::bootloader()).unwrap_err();
        assert_eq!(err, Error::SlotAssignment(SlotAssignmentError::MissingSlot));

        let mut oversized = manifest();
        oversized.regions[1].size = 0x6_0000;
        let mut bundle = bundle();
        bundle.insert("fw.bin", vec![0u8; 0x10]);
        let err = plan(&oversized, &bundle, &FlashRequest::slot(1)).unwrap_err();
        assert!(matches!(err, Error::OverlapDetected { .. }));
    }

    #[test]
    fn test_incomplete_manifest_rejected() {
        // Firmware alone would leave the slot's previous manifest in place
        let firmware_only = BitstreamManifest::new(
            4,
            "xbeam",
            "v1",
            vec![MemoryRegion::new("fw.bin", RegionType::RamLoad, 0x1234)
                .unwrap()
                .with_psram_dst(0x2020_0000)],
        )
        .unwrap();
        let err = plan(&firmware_only, &bundle(), &FlashRequest::slot(1)).unwrap_err();
        assert_eq!(
            err,
            Error::SchemaViolation(SchemaViolation::MissingRegion(RegionType::Bitstream))
        );

        let mut no_manifest = manifest();
        no_manifest.regions.pop();
        let err = plan(&no_manifest, &bundle(), &FlashRequest::slot(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema violation: manifest has no Manifest region"
        );
    }

    #[test]
    fn test_erase_option_storage() {
        let request = FlashRequest::slot(2).with_erase_option_storage(true);
        let plan = plan(&manifest(), &bundle(), &request).unwrap();
        let offsets: Vec<_> = plan.operations.iter().map(|op| op.offset).collect();
        assert_eq!(offsets, [0x30_0000, 0x39_0000, 0x3E_0000, 0x3F_0000]);
    }

    #[test]
    fn test_custom_geometry() {
        let geometry = FlashGeometry {
            page_size: 256,
            sector_size: 0x1000,
        };
        let mut manifest = manifest();
        manifest
            .regions
            .insert(
                2,
                MemoryRegion::new("data.bin", RegionType::RamLoad, 0x10)
                    .unwrap()
                    .with_psram_dst(0x2030_0000),
            )
            .unwrap();
        let mut bundle = bundle();
        bundle.insert("data.bin", vec![1u8; 0x10]);

        let request = FlashRequest::slot(0).with_geometry(geometry);
        let plan = plan(&manifest, &bundle, &request).unwrap();
        let data = plan.regions.iter().find(|r| r.name == "data.bin").unwrap();
        assert_eq!(data.addr, 0x19_2000);
    }
}
