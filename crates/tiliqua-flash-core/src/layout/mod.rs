//! SPI flash layout
//!
//! Flash is split into a bootloader region at address 0 followed by
//! [`N_MANIFESTS`] fixed-size slots, each holding one user bitstream, its
//! firmware, option storage and manifest block:
//!
//! ```text
//! 0x000000  bootloader bitstream, XiP firmware, options, manifest
//! 0x100000  slot 0: bitstream | ... | firmware of slot N-1 ...
//! 0x200000  slot 1: ...
//! ```
//!
//! Resolution assigns every region a flash address for the selected slot
//! ([`resolve`]), and validation checks the result for slot overflows and
//! overlapping regions ([`validate`]).

mod resolve;
mod slot;
mod validate;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::manifest::{BitstreamManifest, MemoryRegion, RegionType, MANIFEST_SIZE};

pub use resolve::{check_slot_assignment, resolve};
pub use slot::*;
pub use validate::{check_overlaps, check_slot_boundary, validate};

/// Erase/program granularity of the flash part
///
/// Page granularity is used for the generic overlap check and sector
/// granularity for packing and for slot-relative checks. The defaults match
/// the flash fitted to the hardware; other parts can be described through
/// [`crate::config::FlashConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Program page size in bytes
    pub page_size: u32,
    /// Smallest erase sector size in bytes
    pub sector_size: u32,
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self {
            page_size: FLASH_PAGE_SZ,
            sector_size: FLASH_SECTOR_SZ,
        }
    }
}

/// Round `value` up to the next multiple of `granularity`
pub fn align_up(value: u64, granularity: u32) -> u64 {
    let granularity = u64::from(granularity.max(1));
    value.div_ceil(granularity) * granularity
}

/// A region bound to its final flash address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashableRegion {
    /// Name used in logs and errors
    pub name: String,
    /// Region kind
    pub region_type: RegionType,
    /// Bundle file holding the contents, if any
    pub filename: Option<String>,
    /// Flash address
    pub addr: u32,
    /// Number of bytes occupied in flash
    pub size: u32,
    /// RAM destination for `RamLoad` regions
    pub psram_dst: Option<u32>,
}

impl FlashableRegion {
    /// Wrap a memory region that has a flash address
    ///
    /// The manifest region always occupies a whole manifest block, whatever
    /// size it declares.
    pub fn from_region(region: &MemoryRegion) -> Option<Self> {
        let addr = region.spiflash_src?;
        let size = match region.region_type {
            RegionType::Manifest => region.size.max(MANIFEST_SIZE as u32),
            _ => region.size,
        };
        Some(Self {
            name: region.name().to_string(),
            region_type: region.region_type,
            filename: region.filename.as_deref().map(str::to_string),
            addr,
            size,
            psram_dst: region.psram_dst,
        })
    }

    /// Exclusive end address, rounded up to `granularity`
    pub fn end_addr(&self, granularity: u32) -> u64 {
        u64::from(self.addr) + align_up(u64::from(self.size), granularity)
    }
}

impl fmt::Display for FlashableRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.name, self.region_type)?;
        writeln!(f, "    start:     0x{:x}", self.addr)?;
        writeln!(
            f,
            "    start+sz:  0x{:x}",
            u64::from(self.addr) + u64::from(self.size)
        )?;
        write!(
            f,
            "    end:       0x{:x}",
            self.end_addr(FLASH_SECTOR_SZ).saturating_sub(1)
        )?;
        if let Some(psram_dst) = self.psram_dst {
            write!(
                f,
                "\n    psram_dst: 0x{:x} (copied by bootloader before bitstream starts)",
                psram_dst
            )?;
        }
        Ok(())
    }
}

/// Result of resolving a manifest against a slot
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Copy of the input manifest with every flash address filled in
    pub manifest: BitstreamManifest,
    /// Regions that occupy flash, in manifest order
    pub regions: Vec<FlashableRegion>,
    /// Addresses of the target slot
    pub layout: SlotLayout,
}
