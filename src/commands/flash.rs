//! Flash command implementation

use std::io::{self, BufRead, Write};

use indicatif::{ProgressBar, ProgressStyle};
use tiliqua_flash_core::execute::{execute, FlashProgress};
use tiliqua_flash_core::{FlashGeometry, FlashOperation};
use tiliqua_flash_openfpgaloader::OpenFpgaLoader;

use super::plan::{load_plan, print_plan};
use crate::cli::BundleArgs;
use crate::error::CliError;

/// Progress reporter using an indicatif progress bar
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    pub fn new() -> Result<Self, CliError> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl FlashProgress for IndicatifProgress {
    fn starting(&mut self, _operations: usize, total_bytes: usize) {
        self.bar.set_length(total_bytes as u64);
    }

    fn operation(&mut self, index: usize, op: &FlashOperation) {
        self.bar
            .set_message(format!("[{}] {} @ 0x{:x}", index + 1, op.payload.name(), op.offset));
    }

    fn operation_done(&mut self, _index: usize, op: &FlashOperation) {
        self.bar.inc(op.len() as u64);
    }

    fn complete(&mut self) {
        self.bar.finish_with_message("Flash complete");
    }
}

/// Ask the user to confirm on stdin
fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().map_err(CliError::Terminal)?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(CliError::Terminal)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Run the flash command
pub fn run_flash(
    args: &BundleArgs,
    yes: bool,
    geometry: FlashGeometry,
    loader: &OpenFpgaLoader,
) -> Result<(), CliError> {
    let plan = load_plan(args, geometry)?;
    let mut loader = loader.clone();
    print_plan(&plan, &loader);

    if !yes && !confirm("Proceed with flashing?")? {
        return Err(CliError::Aborted);
    }

    let mut progress = IndicatifProgress::new()?;
    execute(&plan.operations, &mut loader, &mut progress)?;

    match plan.layout.slot_number() {
        Some(slot) => println!("Slot {} flashed, device reset", slot),
        None => println!("Bootloader flashed, device reset"),
    }
    Ok(())
}
