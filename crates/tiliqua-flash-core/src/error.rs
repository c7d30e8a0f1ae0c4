//! Error types for tiliqua-flash-core
//!
//! Every error here is fatal for the flashing session: nothing is retried at
//! this layer and no write operation is handed out once one of them has been
//! raised.

use alloc::string::String;
use core::fmt;

use crate::manifest::RegionType;

/// Why a slot selector does not fit the manifest being flashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotAssignmentError {
    /// XiP manifests always go to the bootloader region
    SlotForXip {
        /// Slot that was requested
        slot: usize,
        /// Flash address of the XiP firmware fixed in the archive
        xip_offset: u32,
    },
    /// Manifests without XiP firmware need a slot
    MissingSlot,
    /// Slot index is past the last slot
    OutOfRange {
        /// Slot that was requested
        slot: usize,
        /// Number of slots on the device
        slots: usize,
    },
}

/// A manifest that does not fit the bounded manifest encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// A string or list is longer than its fixed maximum
    TooLong {
        /// Field path, e.g. `regions[1].filename`
        field: String,
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },
    /// A fixed-size list has the wrong number of entries
    WrongCount {
        /// Field path
        field: String,
        /// Actual number of entries
        len: usize,
        /// Required number of entries
        expected: usize,
    },
    /// A region kind that may appear at most once appears again
    DuplicateRegion(RegionType),
    /// Two region kinds that exclude each other are both present
    ConflictingRegions(RegionType, RegionType),
    /// A region kind every flashable manifest needs is absent
    MissingRegion(RegionType),
    /// A region carries a field its kind does not use
    UnexpectedField {
        /// Field path, e.g. `regions[0].psram_dst`
        field: String,
        /// Kind of the offending region
        region_type: RegionType,
    },
    /// A region lacks a field its kind requires
    MissingField {
        /// Field path
        field: String,
        /// Kind of the offending region
        region_type: RegionType,
    },
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Attached hardware revision differs from the manifest's
    HardwareMismatch {
        /// Revision reported by the attached device
        attached: u32,
        /// Revision the bundle was built for
        manifest: u32,
    },
    /// Slot selector does not fit the manifest
    SlotAssignment(SlotAssignmentError),
    /// Manifest violates the bounded encoding
    SchemaViolation(SchemaViolation),
    /// Region address precondition failed: a `RamLoad` region that is
    /// already placed, or an `XipFirmware` region that is not
    DoubleResolution {
        /// Region name
        region: String,
        /// Region kind
        region_type: RegionType,
        /// Address the region carried, if any
        addr: Option<u32>,
    },
    /// Region extends past the end of its slot
    BoundaryOverflow {
        /// Region name
        region: String,
        /// Aligned end address of the region (exclusive)
        end: u64,
        /// End address of the slot (exclusive)
        slot_end: u64,
    },
    /// Two regions share flash
    OverlapDetected {
        /// Region with the lower start address
        first: String,
        /// Aligned end of the first region (exclusive)
        first_end: u64,
        /// Region with the higher start address
        second: String,
        /// Start of the second region
        second_start: u32,
    },
    /// Serialized manifest does not fit the fixed manifest block
    ManifestTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Block size in bytes
        max: usize,
    },
    /// A file referenced by the manifest is not in the bundle
    MissingPayload {
        /// Referenced file name
        filename: String,
    },
    /// A bundle file is larger than the region that describes it
    PayloadTooLarge {
        /// File name
        filename: String,
        /// File size in bytes
        len: usize,
        /// Declared region size in bytes
        size: u32,
    },
    /// Manifest document could not be parsed or produced
    Json(String),
}

impl fmt::Display for SlotAssignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotForXip { slot, xip_offset } => write!(
                f,
                "XiP firmware bitstreams must be flashed to the bootloader region, not slot {} \
                 (flash without a slot to write at 0x0 with firmware at 0x{:x})",
                slot, xip_offset
            ),
            Self::MissingSlot => write!(f, "a slot must be specified for non-XiP bitstreams"),
            Self::OutOfRange { slot, slots } => {
                write!(f, "slot {} does not exist (device has {} slots)", slot, slots)
            }
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong { field, len, max } => {
                write!(f, "field '{}' (len={}) is too long (max={})", field, len, max)
            }
            Self::WrongCount {
                field,
                len,
                expected,
            } => write!(
                f,
                "field '{}' has {} entries, must have {}",
                field, len, expected
            ),
            Self::DuplicateRegion(kind) => {
                write!(f, "manifest has more than one {} region", kind)
            }
            Self::ConflictingRegions(a, b) => {
                write!(f, "manifest cannot have both {} and {} regions", a, b)
            }
            Self::MissingRegion(kind) => write!(f, "manifest has no {} region", kind),
            Self::UnexpectedField { field, region_type } => {
                write!(f, "field '{}' is not allowed on {} regions", field, region_type)
            }
            Self::MissingField { field, region_type } => {
                write!(f, "field '{}' is required on {} regions", field, region_type)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareMismatch { attached, manifest } => write!(
                f,
                "attached hardware (hw=r{}) does not match bundle (hw=r{})",
                attached, manifest
            ),
            Self::SlotAssignment(e) => write!(f, "{}", e),
            Self::SchemaViolation(e) => write!(f, "schema violation: {}", e),
            Self::DoubleResolution {
                region,
                region_type,
                addr: Some(addr),
            } => write!(
                f,
                "{} region '{}' already has a flash address (0x{:x})",
                region_type, region, addr
            ),
            Self::DoubleResolution {
                region,
                region_type,
                addr: None,
            } => write!(
                f,
                "{} region '{}' has no flash address (it must be fixed when the archive is built)",
                region_type, region
            ),
            Self::BoundaryOverflow {
                region,
                end,
                slot_end,
            } => write!(
                f,
                "region '{}' exceeds slot boundary: ends at 0x{:x}, slot ends at 0x{:x}",
                region, end, slot_end
            ),
            Self::OverlapDetected {
                first,
                first_end,
                second,
                second_start,
            } => write!(
                f,
                "overlap detected between '{}' (ends at 0x{:x}) and '{}' (starts at 0x{:x})",
                first, first_end, second, second_start
            ),
            Self::ManifestTooLarge { size, max } => {
                write!(f, "manifest too large: {} > {} bytes", size, max)
            }
            Self::MissingPayload { filename } => {
                write!(f, "'{}' not found in bundle", filename)
            }
            Self::PayloadTooLarge {
                filename,
                len,
                size,
            } => write!(
                f,
                "'{}' is {} bytes but its region is only {} bytes",
                filename, len, size
            ),
            Self::Json(msg) => write!(f, "manifest JSON error: {}", msg),
        }
    }
}

impl From<SlotAssignmentError> for Error {
    fn from(e: SlotAssignmentError) -> Self {
        Self::SlotAssignment(e)
    }
}

impl From<SchemaViolation> for Error {
    fn from(e: SchemaViolation) -> Self {
        Self::SchemaViolation(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
