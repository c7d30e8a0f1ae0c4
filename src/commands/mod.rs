//! CLI command implementations
//!
//! ## Planning commands
//!
//! `plan` and `flash` load an extracted bundle, resolve it against the
//! requested slot and either print the resulting writes or hand them to
//! openFPGALoader. Nothing touches the device until every check passed.
//!
//! ## Read-only commands
//!
//! `inspect` decodes the manifests of a flash image and `slots` prints the
//! fixed address map.

mod flash;
mod inspect;
mod plan;
mod slots;

pub use flash::run_flash;
pub use inspect::run_inspect;
pub use plan::run_plan;
pub use slots::run_slots;
