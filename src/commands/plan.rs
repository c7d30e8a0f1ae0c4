//! Plan command implementation

use crate::cli::BundleArgs;
use crate::error::CliError;
use tiliqua_flash_core::plan::{plan, FlashPlan};
use tiliqua_flash_core::{Bundle, FlashGeometry};
use tiliqua_flash_openfpgaloader::OpenFpgaLoader;

/// Load the bundle named by `args` and plan its writes
pub fn load_plan(args: &BundleArgs, geometry: FlashGeometry) -> Result<FlashPlan, CliError> {
    let bundle = Bundle::from_dir(&args.bundle).map_err(CliError::read(&args.bundle))?;
    let manifest = bundle.manifest()?;
    manifest.print();

    let request = args.request().with_geometry(geometry);
    Ok(plan(&manifest, &bundle, &request)?)
}

/// Print the regions of a plan and the commands that would run
pub fn print_plan(plan: &FlashPlan, loader: &OpenFpgaLoader) {
    plan.print();
    println!("The following commands will be executed:");
    for op in &plan.operations {
        println!("\t$ {}", loader.command_line(op));
    }
}

/// Run the plan command
pub fn run_plan(
    args: &BundleArgs,
    geometry: FlashGeometry,
    loader: &OpenFpgaLoader,
) -> Result<(), CliError> {
    let plan = load_plan(args, geometry)?;
    print_plan(&plan, loader);
    println!(
        "{} writes, {} bytes in total",
        plan.operations.len(),
        plan.total_bytes()
    );
    Ok(())
}
