//! Region resolution
//!
//! Walks a manifest and gives every region a concrete SPI flash address for
//! the selected slot. The input manifest is never modified: resolution works
//! on a copy, so the same manifest can be resolved again for another slot.

use alloc::string::ToString;
use alloc::vec::Vec;

use log::{debug, trace};

use super::{align_up, FlashGeometry, FlashableRegion, Resolution, SlotLayout};
use crate::error::{Error, Result, SlotAssignmentError};
use crate::manifest::{check_required_regions, BitstreamManifest, RegionType};

/// Check that the slot selector matches the kind of manifest
///
/// XiP manifests (bootloader bundles) must be flashed without a slot; all
/// other manifests need one. Returns the layout to resolve against.
pub fn check_slot_assignment(
    manifest: &BitstreamManifest,
    slot: Option<usize>,
) -> Result<SlotLayout> {
    match (manifest.is_xip(), slot) {
        (true, Some(slot)) => Err(SlotAssignmentError::SlotForXip {
            slot,
            xip_offset: manifest.xip_offset().unwrap_or_default(),
        }
        .into()),
        (false, None) => Err(SlotAssignmentError::MissingSlot.into()),
        (_, slot) => SlotLayout::new(slot),
    }
}

/// Assign flash addresses to every region of `manifest` for `slot`
///
/// - `Bitstream`, `Manifest` and `OptionStorage` regions go to the slot's
///   fixed addresses.
/// - `XipFirmware` regions keep the address fixed when the archive was
///   built, and must have one.
/// - `RamLoad` regions must not have an address yet. They are packed one
///   after another from the slot's firmware base, each starting on a
///   sector boundary.
///
/// The returned regions are not yet checked against each other; see
/// [`super::validate`].
pub fn resolve(
    manifest: &BitstreamManifest,
    slot: Option<usize>,
    geometry: &FlashGeometry,
) -> Result<Resolution> {
    check_required_regions(&manifest.regions)?;
    let layout = check_slot_assignment(manifest, slot)?;

    let mut manifest = manifest.clone();
    let mut ramload_base = layout.firmware_base().map(u64::from);

    for region in manifest.regions.iter_mut() {
        let addr = match region.region_type {
            RegionType::Bitstream => layout.bitstream_addr(),
            RegionType::Manifest => layout.manifest_addr(),
            RegionType::OptionStorage => layout.options_base(),
            RegionType::XipFirmware => match region.spiflash_src {
                Some(addr) => addr,
                None => {
                    return Err(Error::DoubleResolution {
                        region: region.name().to_string(),
                        region_type: region.region_type,
                        addr: None,
                    })
                }
            },
            RegionType::RamLoad => {
                if let Some(addr) = region.spiflash_src {
                    return Err(Error::DoubleResolution {
                        region: region.name().to_string(),
                        region_type: region.region_type,
                        addr: Some(addr),
                    });
                }
                // Only slotted manifests carry RamLoad regions
                let base = ramload_base.ok_or(SlotAssignmentError::MissingSlot)?;
                let addr = u32::try_from(base).map_err(|_| Error::BoundaryOverflow {
                    region: region.name().to_string(),
                    end: base,
                    slot_end: u64::from(layout.slot_end_addr()),
                })?;
                let next = align_up(base + u64::from(region.size), geometry.sector_size);
                trace!(
                    "RamLoad cursor 0x{:x} -> 0x{:x} after '{}'",
                    base,
                    next,
                    region.name()
                );
                ramload_base = Some(next);
                addr
            }
        };

        if let Some(previous) = region.spiflash_src.filter(|&p| p != addr) {
            debug!(
                "Region '{}' moved from 0x{:x} to 0x{:x}",
                region.name(),
                previous,
                addr
            );
        }
        debug!(
            "Region '{}' ({}) at 0x{:x}, {} bytes",
            region.name(),
            region.region_type,
            addr,
            region.size
        );
        region.spiflash_src = Some(addr);
    }

    let regions: Vec<FlashableRegion> = manifest
        .regions
        .iter()
        .filter_map(FlashableRegion::from_region)
        .collect();

    Ok(Resolution {
        manifest,
        regions,
        layout,
    })
}
