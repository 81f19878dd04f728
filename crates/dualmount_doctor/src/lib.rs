#![forbid(unsafe_code)]

pub mod cli;
pub mod error;
pub mod manifest;
pub mod util;
pub mod validate;

pub use cli::run_from_env;
pub use error::{DoctorError, Result};
