//! tiliqua-flash-openfpgaloader - Flash plan executor using openFPGALoader
//!
//! Each write operation becomes one `openFPGALoader` invocation:
//!
//! ```text
//! openFPGALoader -c dirtyJtag -f -o 0x190000 --file-type raw --skip-reset fw.bin
//! ```
//!
//! The tool is always handed the exact bytes that were planned. Every
//! payload, bundle files included, is written to a temporary file that lives
//! until the invocation returns.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use log::{debug, info};
use tempfile::NamedTempFile;
use tiliqua_flash_core::config::FlashConfig;
use tiliqua_flash_core::execute::OperationExecutor;
use tiliqua_flash_core::{FlashOperation, Payload};

/// Executable used when none is configured
pub const DEFAULT_PROGRAM: &str = "openFPGALoader";
/// Cable used when none is configured
pub const DEFAULT_CABLE: &str = "dirtyJtag";

/// Errors from running openFPGALoader
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Payload could not be written to a temporary file
    #[error("failed to stage '{name}' for flashing: {source}")]
    Stage {
        /// Payload name
        name: String,
        /// I/O error
        #[source]
        source: io::Error,
    },

    /// Tool could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Executable
        program: String,
        /// I/O error
        #[source]
        source: io::Error,
    },

    /// Tool ran and reported failure
    #[error("{program} failed ({status})")]
    Failed {
        /// Executable
        program: String,
        /// Exit status
        status: ExitStatus,
    },
}

/// Executor that shells out to openFPGALoader
#[derive(Debug, Clone)]
pub struct OpenFpgaLoader {
    program: PathBuf,
    cable: String,
}

impl Default for OpenFpgaLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenFpgaLoader {
    /// Executor with the default program and cable
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            cable: DEFAULT_CABLE.to_string(),
        }
    }

    /// Executor configured from a [`FlashConfig`]
    pub fn from_config(config: &FlashConfig) -> Self {
        let mut loader = Self::new();
        if let Some(path) = &config.loader.path {
            loader.program = PathBuf::from(path);
        }
        if let Some(cable) = &config.loader.cable {
            loader.cable = cable.clone();
        }
        loader
    }

    /// Use another executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Use another cable
    pub fn with_cable(mut self, cable: impl Into<String>) -> Self {
        self.cable = cable.into();
        self
    }

    /// Executable that will be run
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for writing `op` from the file at `path`
    pub fn args(&self, op: &FlashOperation, path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-c".into(),
            self.cable.clone().into(),
            "-f".into(),
            "-o".into(),
            format!("0x{:x}", op.offset).into(),
            "--file-type".into(),
            op.encoding.as_str().into(),
        ];
        if op.suppress_reset {
            args.push("--skip-reset".into());
        }
        args.push(path.into());
        args
    }

    /// Command line for `op`, for showing to the user before flashing
    ///
    /// Payloads are only staged when executed, so bundle files are shown by
    /// name and generated payloads by label.
    pub fn command_line(&self, op: &FlashOperation) -> String {
        let path = match &op.payload {
            Payload::File { name, .. } => PathBuf::from(name),
            Payload::Generated { label, .. } => PathBuf::from(format!("<{}>", label)),
        };
        let mut line = self.program.display().to_string();
        for arg in self.args(op, &path) {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Write the planned payload bytes to a temporary file
    fn stage(&self, op: &FlashOperation) -> Result<NamedTempFile, LoaderError> {
        let name = op.payload.name();
        let stage_err = |source| LoaderError::Stage {
            name: name.to_string(),
            source,
        };
        let mut file = tempfile::Builder::new()
            .prefix("tiliqua-flash-")
            .suffix(".bin")
            .tempfile()
            .map_err(stage_err)?;
        file.write_all(op.payload.data()).map_err(stage_err)?;
        file.flush().map_err(stage_err)?;
        debug!(
            "Staged '{}' ({} bytes) at {}",
            name,
            op.len(),
            file.path().display()
        );
        Ok(file)
    }
}

impl OperationExecutor for OpenFpgaLoader {
    type Error = LoaderError;

    fn execute(&mut self, op: &FlashOperation) -> Result<(), LoaderError> {
        let staged = self.stage(op)?;
        let args = self.args(op, staged.path());
        let program = self.program.display().to_string();

        info!(
            "Writing '{}' ({} bytes) at 0x{:x}",
            op.payload.name(),
            op.len(),
            op.offset
        );
        debug!("Running {} {:?}", program, args);

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .map_err(|source| LoaderError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(LoaderError::Failed { program, status });
        }
        // Temporary payload files are removed here
        drop(staged);
        Ok(())
    }
}
