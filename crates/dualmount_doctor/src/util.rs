use std::path::Path;

use chrono::Utc;
use fastapi_output::RichOutput;
use serde::Serialize;
use sqlmodel_console::OutputMode as SqlModelOutputMode;
use tracing_subscriber::EnvFilter;

use crate::error::{DoctorError, Result};

#[must_use]
pub fn now_utc_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// How the doctor should talk to whoever is running it.
#[derive(Debug, Clone, Serialize)]
pub struct OutputIntegration {
    /// `sqlmodel-console` output mode; `"json"` switches to JSON lines.
    pub mode: String,
    /// Running under an agent or in CI.
    pub agent: bool,
}

impl OutputIntegration {
    #[must_use]
    pub fn detect() -> Self {
        let environment = fastapi_output::detect_environment();
        Self {
            mode: SqlModelOutputMode::detect().as_str().to_string(),
            agent: environment.is_agent
                || environment.is_ci
                || SqlModelOutputMode::is_agent_environment(),
        }
    }

    #[must_use]
    pub fn should_emit_json(&self) -> bool {
        self.mode == "json"
    }
}

/// Human-facing progress. Silent in JSON mode so stdout carries only JSON.
#[derive(Debug, Clone)]
pub struct CliOutput {
    rich: Option<RichOutput>,
}

impl CliOutput {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            rich: enabled.then(RichOutput::auto),
        }
    }

    pub fn rule(&self, title: Option<&str>) {
        if let Some(rich) = &self.rich {
            rich.rule(title);
        }
    }

    pub fn info(&self, message: &str) {
        if let Some(rich) = &self.rich {
            rich.info(message);
        }
    }

    pub fn success(&self, message: &str) {
        if let Some(rich) = &self.rich {
            rich.success(message);
        }
    }

    pub fn warning(&self, message: &str) {
        if let Some(rich) = &self.rich {
            rich.warning(message);
        }
    }

    pub fn error(&self, message: &str) {
        if let Some(rich) = &self.rich {
            rich.error(message);
        }
    }
}

#[must_use]
pub fn output_for(integration: &OutputIntegration) -> CliOutput {
    CliOutput::new(!integration.should_emit_json())
}

/// Print a failed run to stderr, as one JSON object in JSON mode.
pub fn report_error(error: &DoctorError) {
    let integration = OutputIntegration::detect();
    if integration.should_emit_json() {
        eprintln!(
            "{}",
            serde_json::json!({
                "status": "error",
                "kind": error.kind(),
                "error": error.to_string(),
                "exit_code": error.exit_code(),
                "agent": integration.agent,
            })
        );
    } else {
        eprintln!("dualmount_doctor: {error}");
    }
}

/// Diagnostics go to stderr so stdout stays clean for JSON output.
/// `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(DoctorError::MissingPath {
            path: path.to_path_buf(),
        })
    }
}
