use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DoctorError>;

/// Usage errors never get here: clap reports them and exits with 2.
#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest {path} is not valid TOML: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("protection system validation failed: {failed} check(s) failed")]
    ValidationFailed { failed: usize },
}

impl DoctorError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Stable tag for JSON error output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Manifest { .. } => "manifest",
            Self::MissingPath { .. } => "missing_path",
            Self::ValidationFailed { .. } => "validation_failed",
        }
    }
}
