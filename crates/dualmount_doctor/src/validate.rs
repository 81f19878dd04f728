use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::Args;
use dualmount_core::AnchorId;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::{DoctorError, Result};
use crate::manifest::ProtectionManifest;
use crate::util::{OutputIntegration, ensure_dir_exists, init_tracing, now_utc_iso, output_for};

/// Anchor literals passed to a `register*(...)` call, with or without an
/// `{ id: ... }` wrapper.
static REGISTER_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"register\w*\s*\(\s*\{?\s*(?:id\s*:\s*)?['"]([a-z0-9]+(?:-[a-z0-9]+)*)['"]"#)
        .expect("register call regex")
});

#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    #[arg(long = "project-dir", default_value = ".")]
    pub project_dir: PathBuf,

    /// Protection manifest (TOML). Defaults to the project's
    /// `dualmount-protection.toml`, then the built-in layout.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Fail on warnings too.
    #[arg(long)]
    pub strict: bool,

    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    fn push(&mut self, check: Check) {
        debug!(target: "dualmount.doctor", name = %check.name, status = ?check.status, "{}", check.detail);
        self.checks.push(check);
    }

    /// Checks that fail the run. With `strict`, warnings count too.
    #[must_use]
    pub fn failures(&self, strict: bool) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail || (strict && c.status == CheckStatus::Warn))
            .count()
    }

    #[must_use]
    pub fn passed(&self, strict: bool) -> bool {
        self.failures(strict) == 0
    }

    pub fn with_status(&self, status: CheckStatus) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(move |c| c.status == status)
    }
}

/// Anchor ids registered in `source`, in order of appearance, deduplicated.
#[must_use]
pub fn declared_anchors(source: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for captures in REGISTER_CALL.captures_iter(source) {
        if let Some(id) = captures.get(1) {
            let id = id.as_str().to_string();
            if !found.contains(&id) {
                found.push(id);
            }
        }
    }
    found
}

/// Run every check of `manifest` against the tree at `root`. Read-only.
#[must_use]
pub fn validate_project(root: &Path, manifest: &ProtectionManifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    for file in &manifest.files {
        let shown = file.path.display().to_string();
        let path = root.join(&file.path);
        if !path.is_file() {
            report.push(Check::new(&shown, CheckStatus::Fail, format!("{shown} missing")));
            continue;
        }
        report.push(Check::new(&shown, CheckStatus::Pass, format!("{shown} exists")));

        if file.markers.is_empty() {
            continue;
        }
        let name = format!("{shown}#markers");
        match fs::read_to_string(&path) {
            Ok(content) => {
                let missing: Vec<&str> = file
                    .markers
                    .iter()
                    .filter(|marker| !content.contains(marker.as_str()))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    report.push(Check::new(
                        name,
                        CheckStatus::Pass,
                        format!("{} has required functionality", file.role),
                    ));
                } else {
                    report.push(Check::new(
                        name,
                        CheckStatus::Fail,
                        format!("{} missing required functionality: {}", file.role, missing.join(", ")),
                    ));
                }
            }
            Err(err) => report.push(Check::new(
                name,
                CheckStatus::Fail,
                format!("{shown} unreadable: {err}"),
            )),
        }
    }

    check_registry(root, manifest, &mut report);
    report
}

fn check_registry(root: &Path, manifest: &ProtectionManifest, report: &mut ValidationReport) {
    let shown = manifest.registry_file.display().to_string();
    let path = root.join(&manifest.registry_file);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            // A listed registry file has already failed its existence check.
            if !manifest.files.iter().any(|f| f.path == manifest.registry_file) {
                report.push(Check::new(
                    &shown,
                    CheckStatus::Fail,
                    format!("registry file {shown} unreadable: {err}"),
                ));
            }
            return;
        }
    };

    for anchor in &manifest.expected_anchors {
        let name = format!("anchor:{anchor}");
        if content.contains(anchor.as_str()) {
            report.push(Check::new(
                name,
                CheckStatus::Pass,
                format!("sacred mount '{anchor}' is pre-registered"),
            ));
        } else {
            report.push(Check::new(
                name,
                CheckStatus::Fail,
                format!("sacred mount '{anchor}' is not pre-registered"),
            ));
        }
    }

    for declared in declared_anchors(&content) {
        let expected = manifest.expected_anchors.iter().any(|a| a.as_str() == declared);
        if expected {
            continue;
        }
        let detail = match AnchorId::new(declared.as_str()) {
            Ok(_) => format!("anchor '{declared}' is registered in {shown} but not expected"),
            Err(err) => format!("anchor '{declared}' in {shown}: {err}"),
        };
        report.push(Check::new(format!("anchor:{declared}"), CheckStatus::Warn, detail));
    }
}

pub fn run_validate(args: ValidateArgs) -> Result<()> {
    init_tracing(args.verbose);
    let integration = OutputIntegration::detect();
    let ui = output_for(&integration);

    ensure_dir_exists(&args.project_dir)?;
    let (manifest, origin) = ProtectionManifest::resolve(&args.project_dir, args.manifest.as_deref())?;

    ui.rule(Some("dualmount_doctor validate"));
    ui.info(&format!("project_dir={}", args.project_dir.display()));
    ui.info(&format!(
        "manifest={}",
        origin
            .as_ref()
            .map_or_else(|| "built-in".to_string(), |path| path.display().to_string())
    ));

    let report = validate_project(&args.project_dir, &manifest);
    for check in &report.checks {
        match check.status {
            CheckStatus::Pass => ui.success(&check.detail),
            CheckStatus::Warn => ui.warning(&check.detail),
            CheckStatus::Fail => ui.error(&check.detail),
        }
    }

    let failed = report.failures(args.strict);
    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "validate",
                "status": if failed == 0 { "ok" } else { "failed" },
                "generated_at": now_utc_iso(),
                "project_dir": args.project_dir.display().to_string(),
                "manifest": origin.map(|path| path.display().to_string()),
                "strict": args.strict,
                "failed": failed,
                "checks": report.checks,
                "integration": integration,
            })
        );
    }

    if failed == 0 {
        ui.success("Protection system validation PASSED");
        Ok(())
    } else {
        ui.error("Protection system validation FAILED");
        Err(DoctorError::ValidationFailed { failed })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{CheckStatus, declared_anchors, validate_project};
    use crate::manifest::ProtectionManifest;

    const REGISTRY_SOURCE: &str = r#"
export class SacredMountRegistry {
  static register(id: string, required: boolean) {}
}
SacredMountRegistry.register('bottom-nav', true);
SacredMountRegistry.register('fab', true);
SacredMountRegistry.register("top-bar", true);
SacredMountRegistry.register({ id: 'modal-overlay', required: false });
"#;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn healthy_project(root: &Path) {
        write(
            root,
            "src-nextgen/shell/mounts/SacredViewMount.tsx",
            "export function SacredViewMount({ mountId }) {}",
        );
        write(root, "src-nextgen/shell/mounts/SacredMountRegistry.ts", REGISTRY_SOURCE);
        write(
            root,
            "src-nextgen/shell/mounts/useSacredMount.ts",
            "export const useSacredMount = () => ({ isSacredMount: true });",
        );
    }

    #[test]
    fn declared_anchors_reads_plain_and_object_forms() {
        assert_eq!(
            declared_anchors(REGISTRY_SOURCE),
            vec!["bottom-nav", "fab", "top-bar", "modal-overlay"]
        );
    }

    #[test]
    fn healthy_project_passes() {
        let temp = tempdir().expect("tempdir");
        healthy_project(temp.path());

        let report = validate_project(temp.path(), &ProtectionManifest::default());
        assert!(report.passed(true), "{:#?}", report.checks);
        // 3 existence + 3 marker + 4 anchor checks
        assert_eq!(report.checks.len(), 10);
    }

    #[test]
    fn missing_file_fails() {
        let temp = tempdir().expect("tempdir");
        healthy_project(temp.path());
        fs::remove_file(temp.path().join("src-nextgen/shell/mounts/useSacredMount.ts"))
            .expect("remove");

        let report = validate_project(temp.path(), &ProtectionManifest::default());
        assert_eq!(report.failures(false), 1);
        let failed: Vec<_> = report.with_status(CheckStatus::Fail).collect();
        assert_eq!(
            failed[0].detail,
            "src-nextgen/shell/mounts/useSacredMount.ts missing"
        );
    }

    #[test]
    fn missing_marker_is_named() {
        let temp = tempdir().expect("tempdir");
        healthy_project(temp.path());
        write(
            temp.path(),
            "src-nextgen/shell/mounts/SacredViewMount.tsx",
            "export function SacredViewMount() {}",
        );

        let report = validate_project(temp.path(), &ProtectionManifest::default());
        let failed: Vec<_> = report.with_status(CheckStatus::Fail).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].detail,
            "SacredViewMount component missing required functionality: mountId"
        );
    }

    #[test]
    fn unregistered_expected_anchor_fails() {
        let temp = tempdir().expect("tempdir");
        healthy_project(temp.path());
        write(
            temp.path(),
            "src-nextgen/shell/mounts/SacredMountRegistry.ts",
            &REGISTRY_SOURCE.replace("'fab'", "'fab-legacy'"),
        );

        let report = validate_project(temp.path(), &ProtectionManifest::default());
        // "fab" is still a substring of "fab-legacy".
        assert!(report.passed(false));
        let warnings: Vec<_> = report.with_status(CheckStatus::Warn).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].detail.starts_with("anchor 'fab-legacy' is registered"));
        assert!(!report.passed(true));
    }

    #[test]
    fn absent_anchor_literal_fails() {
        let temp = tempdir().expect("tempdir");
        healthy_project(temp.path());
        write(
            temp.path(),
            "src-nextgen/shell/mounts/SacredMountRegistry.ts",
            &REGISTRY_SOURCE.replace("'modal-overlay'", "'overlay'"),
        );

        let report = validate_project(temp.path(), &ProtectionManifest::default());
        let failed: Vec<_> = report.with_status(CheckStatus::Fail).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].detail,
            "sacred mount 'modal-overlay' is not pre-registered"
        );
    }

    #[test]
    fn unlisted_registry_file_is_checked_for_existence() {
        let temp = tempdir().expect("tempdir");
        let manifest = ProtectionManifest {
            files: Vec::new(),
            ..ProtectionManifest::default()
        };

        let report = validate_project(temp.path(), &manifest);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].status, CheckStatus::Fail);
    }
}
