//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tiliqua_flash_core::layout::N_MANIFESTS;
use tiliqua_flash_core::FlashRequest;

/// Parse a slot number, rejecting slots the device does not have
fn parse_slot(s: &str) -> Result<usize, String> {
    let slot: usize = s.parse().map_err(|e| format!("Invalid slot: {}", e))?;
    if slot >= N_MANIFESTS {
        return Err(format!("Slot must be 0..{}", N_MANIFESTS - 1));
    }
    Ok(slot)
}

#[derive(Parser)]
#[command(name = "tiliqua-flash")]
#[command(author, version, about = "Flash bitstream bundles to Tiliqua SPI flash", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Bundle and target options shared by `plan` and `flash`
#[derive(clap::Args, Debug, Clone)]
pub struct BundleArgs {
    /// Extracted bundle directory (contains manifest.json)
    pub bundle: PathBuf,

    /// Slot to flash into; omit for bootloader (XiP) bundles
    #[arg(short, long, value_parser = parse_slot)]
    pub slot: Option<usize>,

    /// Erase option storage regions described by the manifest
    #[arg(long)]
    pub erase_option_storage: bool,

    /// Hardware revision of the attached device, checked against the bundle
    #[arg(long)]
    pub hw_rev: Option<u32>,
}

impl BundleArgs {
    /// Flash request described by these arguments
    pub fn request(&self) -> FlashRequest {
        let request =
            FlashRequest::new(self.slot).with_erase_option_storage(self.erase_option_storage);
        match self.hw_rev {
            Some(hw_rev) => request.with_attached_hw_rev(hw_rev),
            None => request,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show where each region of a bundle would go, without flashing
    Plan {
        #[command(flatten)]
        bundle: BundleArgs,
    },

    /// Flash a bundle
    Flash {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the manifests stored in a flash image
    Inspect {
        /// Flash image file, starting at address 0
        image: PathBuf,
    },

    /// Show the flash address map of every slot
    Slots,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flash() {
        let cli = Cli::try_parse_from([
            "tiliqua-flash",
            "-v",
            "flash",
            "bundle/",
            "--slot",
            "2",
            "--erase-option-storage",
            "--hw-rev",
            "4",
            "-y",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Flash { bundle, yes } = cli.command else {
            panic!("expected flash command");
        };
        assert!(yes);
        let request = bundle.request();
        assert_eq!(request.slot, Some(2));
        assert!(request.erase_option_storage);
        assert_eq!(request.attached_hw_rev, Some(4));
    }

    #[test]
    fn test_bootloader_bundle_has_no_slot() {
        let cli = Cli::try_parse_from(["tiliqua-flash", "plan", "bootloader/"]).unwrap();
        let Commands::Plan { bundle } = cli.command else {
            panic!("expected plan command");
        };
        assert_eq!(bundle.request(), FlashRequest::bootloader());
    }

    #[test]
    fn test_slot_out_of_range() {
        assert!(Cli::try_parse_from(["tiliqua-flash", "plan", "b/", "--slot", "8"]).is_err());
        assert_eq!(parse_slot("7"), Ok(7));
    }
}
