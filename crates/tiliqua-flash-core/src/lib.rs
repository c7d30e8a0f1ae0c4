//! tiliqua-flash-core - SPI flash layout resolution for bitstream bundles
//!
//! A bitstream bundle is a set of files plus a [`BitstreamManifest`]
//! describing the memory regions the bootloader needs: the bitstream
//! itself, firmware that is executed in place or copied to PSRAM, option
//! storage and the manifest block. This crate decides where each of those
//! regions lives in SPI flash, checks that the result is safe to write and
//! produces the ordered list of write operations for a flashing backend.
//!
//! The crate is `no_std` compatible but requires `alloc`.
//!
//! # Features
//!
//! - `std` - Enable standard library support (bundle directories, TOML
//!   configuration, `std::error::Error` impls)
//!
//! # Example
//!
//! ```ignore
//! use tiliqua_flash_core::{plan, Bundle, FlashRequest};
//!
//! let bundle = Bundle::from_dir("extracted/")?;
//! let manifest = bundle.manifest()?;
//! let plan = plan::plan(&manifest, &bundle, &FlashRequest::slot(2))?;
//! for op in &plan.operations {
//!     println!("{}", op);
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bundle;
#[cfg(feature = "std")]
pub mod config;
pub mod error;
pub mod execute;
pub mod layout;
pub mod manifest;
pub mod ops;
pub mod plan;

pub use bundle::Bundle;
pub use error::{Error, Result};
pub use layout::{FlashGeometry, FlashableRegion, Resolution, SlotLayout};
pub use manifest::{BitstreamManifest, MemoryRegion, RegionType};
pub use ops::{Encoding, FlashOperation, Payload};
pub use plan::{FlashPlan, FlashRequest};
