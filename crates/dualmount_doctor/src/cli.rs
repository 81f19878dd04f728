use clap::{Parser, Subcommand};
use dualmount_core::AnchorCatalog;
use serde_json::json;

use crate::error::Result;
use crate::util::{OutputIntegration, output_for};
use crate::validate::{ValidateArgs, run_validate};

#[derive(Debug, Parser)]
#[command(
    name = "dualmount_doctor",
    about = "Offline checks for a dual-mount shell's sacred mount protection system",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check that the protection files exist, carry their markers, and
    /// pre-register every expected anchor. Exit 0 on pass, 1 on fail.
    Validate(ValidateArgs),

    /// Print the standard anchor catalog.
    #[command(name = "list-anchors")]
    ListAnchors,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate(args) => run_validate(args),
        Commands::ListAnchors => {
            print_anchors();
            Ok(())
        }
    }
}

fn print_anchors() {
    let integration = OutputIntegration::detect();
    let catalog = AnchorCatalog::standard();
    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "list-anchors",
                "anchors": catalog.specs(),
            })
        );
        return;
    }
    let ui = output_for(&integration);
    ui.rule(Some("standard anchors"));
    for spec in catalog.specs() {
        let kind = if spec.required { "required" } else { "optional" };
        println!("{}\t{kind}", spec.id);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::error::DoctorError;
    use crate::validate::ValidateArgs;

    use super::{Cli, Commands, run};

    #[test]
    fn list_anchors_command_dispatches_successfully() {
        let result = run(Cli {
            command: Commands::ListAnchors,
        });
        assert!(result.is_ok());
    }

    #[test]
    fn validate_command_dispatches_missing_path_error() {
        let result = run(Cli {
            command: Commands::Validate(ValidateArgs {
                project_dir: PathBuf::from("/tmp/dualmount_doctor/does-not-exist"),
                manifest: None,
                strict: false,
                verbose: false,
            }),
        });

        match result.expect_err("missing project directory should fail") {
            DoctorError::MissingPath { path } => {
                assert_eq!(path, PathBuf::from("/tmp/dualmount_doctor/does-not-exist"));
            }
            other => panic!("expected MissingPath, got {other}"),
        }
    }

    #[test]
    fn cli_parses_validate_flags() {
        use clap::Parser;

        let cli = Cli::try_parse_from([
            "dualmount_doctor",
            "validate",
            "--project-dir",
            "/work/app",
            "--strict",
        ])
        .expect("parse");
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.project_dir, PathBuf::from("/work/app"));
        assert!(args.strict);
        assert!(args.manifest.is_none());
    }
}
