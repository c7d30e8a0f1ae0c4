//! Bitstream manifests
//!
//! A manifest describes one bitstream and every memory region the
//! bootloader has to set up before starting it. The same document is read
//! by the bootloader from a fixed-size block in flash, so all strings and
//! lists in it are bounded (see the `*_LEN`, `*_SIZE` and `*_N` constants)
//! and optional fields are left out of the encoding entirely when absent.
//!
//! - [`types`] holds the bounded data model and its construction checks
//! - [`codec`] encodes manifests to, and decodes them from, flash blocks

pub mod codec;
mod types;

pub use codec::{
    content_len, decode_block, encode_block, from_json_slice, inspect_block, inspect_image,
    to_json, BlockContents, SlotManifest, ERASED_BYTE,
};
pub use types::*;

/// Magic value stored in every manifest
pub const MANIFEST_MAGIC: u32 = 0xFEED_BEEF;
/// Size of the manifest block in flash, padded with 0xFF
pub const MANIFEST_SIZE: usize = 1024;
/// Maximum length of `BitstreamManifest::name`
pub const BITSTREAM_NAME_LEN: usize = 32;
/// Maximum length of `BitstreamManifest::tag`
pub const BITSTREAM_TAG_LEN: usize = 8;
/// Maximum number of regions in one manifest
pub const REGION_MAX_N: usize = 5;
/// Maximum length of `MemoryRegion::filename`
pub const REGION_FILE_LEN: usize = 16;
/// Maximum length of `BitstreamHelp::brief`
pub const HELP_BRIEF_MAX_SIZE: usize = 64;
/// Maximum length of `BitstreamHelp::video`
pub const HELP_VIDEO_MAX_SIZE: usize = 64;
/// Maximum length of a single jack label
pub const HELP_IO_MAX_SIZE: usize = 20;
/// Number of jack labels on the left of the panel
pub const HELP_IO_LEFT_N: usize = 8;
/// Number of connector labels on the right of the panel
pub const HELP_IO_RIGHT_N: usize = 6;
