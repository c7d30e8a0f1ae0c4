//! tiliqua-flash-dummy - In-memory flash emulator for testing
//!
//! This crate provides an [`OperationExecutor`] that applies write
//! operations to a flash image held in memory, the way the real flashing
//! tool does: every sector touched by a write is erased first, then
//! programmed. It also counts device resets, so the reset policy of a plan
//! can be checked without hardware.

use log::{debug, trace};
use tiliqua_flash_core::execute::OperationExecutor;
use tiliqua_flash_core::manifest::{inspect_image, SlotManifest, ERASED_BYTE};
use tiliqua_flash_core::FlashOperation;

/// Errors from the emulated device
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DummyError {
    /// Write extends past the end of the flash
    #[error("write of {len} bytes at 0x{offset:x} exceeds flash size 0x{size:x}")]
    AddressOutOfBounds {
        /// Write offset
        offset: u32,
        /// Write length
        len: usize,
        /// Flash size
        size: usize,
    },
}

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub size: usize,
    /// Erase sector size
    pub sector_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            size: 16 * 1024 * 1024,
            sector_size: 64 * 1024,
        }
    }
}

/// A write the emulator has applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Flash offset
    pub offset: u32,
    /// Number of bytes programmed
    pub len: usize,
    /// Whether the device was reset afterwards
    pub reset: bool,
}

/// Dummy flash device
///
/// Emulates the flash and reset line of a board in memory.
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    writes: Vec<WriteRecord>,
    resets: usize,
}

impl DummyFlash {
    /// Create a new, fully erased dummy flash
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![ERASED_BYTE; config.size];
        Self {
            config,
            data,
            writes: Vec::new(),
            resets: 0,
        }
    }

    /// Create a new dummy flash with default configuration (16 MiB)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Read `len` bytes at `offset`, if in range
    pub fn read(&self, offset: u32, len: usize) -> Option<&[u8]> {
        let start = offset as usize;
        self.data.get(start..start.checked_add(len)?)
    }

    /// Writes applied so far, in order
    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    /// Number of times the device was reset
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Manifest blocks of the bootloader region and every slot
    pub fn manifests(&self) -> Vec<SlotManifest> {
        inspect_image(&self.data)
    }

    fn erase_covering(&mut self, start: usize, end: usize) {
        let sector = self.config.sector_size.max(1);
        let first = start / sector * sector;
        let last = end.div_ceil(sector) * sector;
        let last = last.min(self.data.len());
        trace!("Erasing 0x{:x}..0x{:x}", first, last);
        self.data[first..last].fill(ERASED_BYTE);
    }
}

impl OperationExecutor for DummyFlash {
    type Error = DummyError;

    fn execute(&mut self, op: &FlashOperation) -> Result<(), DummyError> {
        let data = op.payload.data();
        let start = op.offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            return Err(DummyError::AddressOutOfBounds {
                offset: op.offset,
                len: data.len(),
                size: self.data.len(),
            });
        }

        self.erase_covering(start, end);
        // Programming can only clear bits
        for (cell, &byte) in self.data[start..end].iter_mut().zip(data) {
            *cell &= byte;
        }

        let reset = !op.suppress_reset;
        if reset {
            self.resets += 1;
        }
        debug!(
            "Wrote {} bytes at 0x{:x}{}",
            data.len(),
            op.offset,
            if reset { ", reset" } else { "" }
        );
        self.writes.push(WriteRecord {
            offset: op.offset,
            len: data.len(),
            reset,
        });
        Ok(())
    }
}
