//! Errors reported by the command line tool

use tiliqua_flash_core::config::ConfigError;
use tiliqua_flash_core::execute::ExecuteError;
use tiliqua_flash_openfpgaloader::LoaderError;

/// Command failure
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] tiliqua_flash_core::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("flashing stopped, device needs to be flashed again: {0}")]
    Execute(#[from] ExecuteError<LoaderError>),

    #[error("progress bar template: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    #[error("terminal I/O failed: {0}")]
    Terminal(#[source] std::io::Error),

    #[error("aborted by user")]
    Aborted,
}

impl CliError {
    /// Wrap an I/O error with the path it concerns
    pub fn read(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Read {
            path: path.display().to_string(),
            source,
        }
    }
}
