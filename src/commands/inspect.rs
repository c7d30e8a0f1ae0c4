//! Inspect command implementation

use std::fs;
use std::path::Path;

use tiliqua_flash_core::manifest::{inspect_image, BlockContents, SlotManifest};

use crate::error::CliError;

fn slot_name(found: &SlotManifest) -> String {
    match found.slot {
        Some(slot) => format!("slot {}", slot),
        None => "bootloader".to_string(),
    }
}

/// Run the inspect command
///
/// Returns the manifests found, for callers that want more than the
/// printed summary.
pub fn run_inspect(image: &Path) -> Result<Vec<SlotManifest>, CliError> {
    let data = fs::read(image).map_err(CliError::read(image))?;
    println!(
        "Flash image: {} bytes ({} KiB)",
        data.len(),
        data.len() / 1024
    );

    let found = inspect_image(&data);
    for entry in &found {
        match &entry.contents {
            BlockContents::Empty => {
                println!("{:>10} @ 0x{:06x}: <empty>", slot_name(entry), entry.addr)
            }
            BlockContents::Valid(manifest) => {
                println!(
                    "{:>10} @ 0x{:06x}: '{}' ({}) hw=r{}",
                    slot_name(entry),
                    entry.addr,
                    manifest.name,
                    manifest.tag,
                    manifest.hw_rev
                );
                manifest.print();
            }
            BlockContents::Invalid { first_bytes, error } => {
                println!(
                    "{:>10} @ 0x{:06x}: <invalid: {}>",
                    slot_name(entry),
                    entry.addr,
                    error
                );
                log::debug!("first bytes: {:02x?}", first_bytes);
            }
        }
    }
    Ok(found)
}
