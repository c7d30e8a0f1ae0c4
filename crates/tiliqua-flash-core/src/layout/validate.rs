//! Layout validation
//!
//! Runs after resolution over the complete set of placed regions. Nothing
//! here changes an address; a layout either passes every check or the
//! first failure is returned.

use alloc::string::ToString;
use alloc::vec::Vec;

use log::debug;

use super::{FlashGeometry, FlashableRegion, Resolution, SlotLayout};
use crate::error::{Error, Result};

/// Check that every region ends inside the slot
///
/// End addresses are rounded up to `granularity` first. The bootloader
/// region is bounded like a slot, by `[0, SLOT_SIZE)`.
pub fn check_slot_boundary(
    regions: &[FlashableRegion],
    layout: &SlotLayout,
    granularity: u32,
) -> Result<()> {
    let slot_end = u64::from(layout.slot_end_addr());
    for region in regions {
        let end = region.end_addr(granularity);
        if end > slot_end {
            return Err(Error::BoundaryOverflow {
                region: region.name.clone(),
                end,
                slot_end,
            });
        }
    }
    Ok(())
}

/// Check that no two regions share flash
///
/// Regions are sorted by start address and each adjacent pair compared,
/// with the end of the lower region rounded up to `granularity`. Two
/// regions starting at the same address always overlap, whatever their
/// sizes.
pub fn check_overlaps(regions: &[FlashableRegion], granularity: u32) -> Result<()> {
    let mut sorted: Vec<&FlashableRegion> = regions.iter().collect();
    sorted.sort_by_key(|r| r.addr);

    for pair in sorted.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        let first_end = first.end_addr(granularity);
        if first_end > u64::from(second.addr) || first.addr == second.addr {
            return Err(Error::OverlapDetected {
                first: first.name.to_string(),
                first_end,
                second: second.name.to_string(),
                second_start: second.addr,
            });
        }
    }
    Ok(())
}

/// Run every layout check on a resolution
///
/// Overlaps are checked twice: at sector granularity, since a sector is
/// erased as a whole before it is written, and then at page granularity.
pub fn validate(resolution: &Resolution, geometry: &FlashGeometry) -> Result<()> {
    let regions = &resolution.regions;
    check_slot_boundary(regions, &resolution.layout, geometry.sector_size)?;
    check_overlaps(regions, geometry.sector_size)?;
    check_overlaps(regions, geometry.page_size)?;
    debug!(
        "Layout of {} regions in {} is valid",
        regions.len(),
        match resolution.layout.slot_number() {
            Some(_) => "slot",
            None => "bootloader region",
        }
    );
    Ok(())
}
