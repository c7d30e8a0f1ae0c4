//! Slot addressing
//!
//! Pure arithmetic from a slot selector to the base addresses used inside
//! that slot. These constants are shared with the bootloader, which reads
//! manifests from the same addresses.

use crate::error::{Result, SlotAssignmentError};

/// Number of user slots (and so of user manifests)
pub const N_MANIFESTS: usize = 8;
/// First user slot starts here
pub const SLOT_BITSTREAM_BASE: u32 = 0x10_0000;
/// Spacing between user slots
pub const SLOT_SIZE: u32 = 0x10_0000;
/// Offset of the manifest block from the start of a slot
pub const MANIFEST_OFFSET: u32 = 0xF_0000;
/// Bootloader bitstream address
pub const BOOTLOADER_BITSTREAM_ADDR: u32 = 0x0;
/// Offset of RAM-loaded firmware, relative to the slot *after* the bitstream
pub const FIRMWARE_BASE_OFFSET: u32 = 0x9_0000;
/// Offset of option storage, relative to the slot *after* the bitstream
pub const OPTIONS_BASE_OFFSET: u32 = 0xE_0000;
/// Flash program page size
pub const FLASH_PAGE_SZ: u32 = 1024;
/// Flash erase sector size
pub const FLASH_SECTOR_SZ: u32 = 0x1_0000;

/// Addresses used within one slot, or within the bootloader region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    slot: Option<usize>,
}

impl SlotLayout {
    /// Layout of the bootloader region
    pub const fn bootloader() -> Self {
        Self { slot: None }
    }

    /// Layout of a user slot
    pub fn slot(slot: usize) -> Result<Self> {
        if slot >= N_MANIFESTS {
            return Err(SlotAssignmentError::OutOfRange {
                slot,
                slots: N_MANIFESTS,
            }
            .into());
        }
        Ok(Self { slot: Some(slot) })
    }

    /// Layout for an optional slot, `None` being the bootloader
    pub fn new(slot: Option<usize>) -> Result<Self> {
        match slot {
            Some(n) => Self::slot(n),
            None => Ok(Self::bootloader()),
        }
    }

    /// Slot number, `None` for the bootloader
    pub fn slot_number(&self) -> Option<usize> {
        self.slot
    }

    /// Whether this is the bootloader region
    pub fn is_bootloader(&self) -> bool {
        self.slot.is_none()
    }

    // Slot numbers are below N_MANIFESTS, so these never overflow
    fn index(&self) -> Option<u32> {
        self.slot.map(|n| n as u32)
    }

    /// Where the bitstream goes
    pub fn bitstream_addr(&self) -> u32 {
        match self.index() {
            None => BOOTLOADER_BITSTREAM_ADDR,
            Some(n) => SLOT_BITSTREAM_BASE + n * SLOT_SIZE,
        }
    }

    /// Where the manifest block goes
    pub fn manifest_addr(&self) -> u32 {
        self.bitstream_addr() + MANIFEST_OFFSET
    }

    /// Where the first RAM-loaded region goes
    ///
    /// The bootloader executes its firmware in place, so it has no firmware
    /// base and this returns `None`.
    pub fn firmware_base(&self) -> Option<u32> {
        self.index().map(|n| FIRMWARE_BASE_OFFSET + (n + 1) * SLOT_SIZE)
    }

    /// Where option storage goes
    pub fn options_base(&self) -> u32 {
        match self.index() {
            None => OPTIONS_BASE_OFFSET,
            Some(n) => OPTIONS_BASE_OFFSET + (n + 1) * SLOT_SIZE,
        }
    }

    /// First address of the slot
    pub fn slot_start_addr(&self) -> u32 {
        self.bitstream_addr()
    }

    /// Exclusive end address of the slot
    pub fn slot_end_addr(&self) -> u32 {
        self.bitstream_addr() + SLOT_SIZE
    }
}

/// Manifest block address of every user slot, as `(slot, address)`
pub fn manifest_addresses() -> impl Iterator<Item = (usize, u32)> {
    (0..N_MANIFESTS).map(|n| (n, SlotLayout { slot: Some(n) }.manifest_addr()))
}
