//! Which files make up a shell's mount protection system, and what each must
//! contain.
//!
//! A project may ship a `dualmount-protection.toml` at its root; otherwise
//! the built-in manifest describes the standard mobile shell layout.
//!
//! ```toml
//! registry_file = "src-nextgen/shell/mounts/SacredMountRegistry.ts"
//! expected_anchors = ["bottom-nav", "fab", "top-bar", "modal-overlay"]
//!
//! [[files]]
//! path = "src-nextgen/shell/mounts/SacredViewMount.tsx"
//! role = "SacredViewMount component"
//! markers = ["SacredViewMount", "mountId"]
//! ```

use std::path::{Path, PathBuf};

use dualmount_core::{AnchorCatalog, AnchorId};
use serde::{Deserialize, Serialize};

use crate::error::{DoctorError, Result};

/// File name looked up under the project root when no manifest is given.
pub const MANIFEST_FILE_NAME: &str = "dualmount-protection.toml";

const MOUNTS_DIR: &str = "src-nextgen/shell/mounts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedFile {
    /// Relative to the project root.
    pub path: PathBuf,
    pub role: String,
    /// Substrings that must all appear in the file.
    #[serde(default)]
    pub markers: Vec<String>,
}

impl ProtectedFile {
    fn new(file: &str, role: &str, markers: &[&str]) -> Self {
        Self {
            path: Path::new(MOUNTS_DIR).join(file),
            role: role.to_string(),
            markers: markers.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionManifest {
    pub files: Vec<ProtectedFile>,
    /// The file that pre-registers the sacred mounts.
    pub registry_file: PathBuf,
    pub expected_anchors: Vec<AnchorId>,
}

impl Default for ProtectionManifest {
    fn default() -> Self {
        Self {
            files: vec![
                ProtectedFile::new(
                    "SacredViewMount.tsx",
                    "SacredViewMount component",
                    &["SacredViewMount", "mountId"],
                ),
                ProtectedFile::new(
                    "SacredMountRegistry.ts",
                    "SacredMountRegistry registration",
                    &["SacredMountRegistry", "register"],
                ),
                ProtectedFile::new(
                    "useSacredMount.ts",
                    "useSacredMount hook",
                    &["useSacredMount", "isSacredMount"],
                ),
            ],
            registry_file: Path::new(MOUNTS_DIR).join("SacredMountRegistry.ts"),
            expected_anchors: AnchorCatalog::standard().ids().cloned().collect(),
        }
    }
}

impl ProtectionManifest {
    pub fn from_toml_str(s: &str, origin: &Path) -> Result<Self> {
        toml::from_str(s).map_err(|source| DoctorError::Manifest {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DoctorError::MissingPath {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, path)
    }

    /// An explicit manifest, else the project's own, else the built-in one.
    pub fn resolve(project_dir: &Path, explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let local = project_dir.join(MANIFEST_FILE_NAME);
        if local.is_file() {
            return Ok((Self::load(&local)?, Some(local)));
        }
        Ok((Self::default(), None))
    }
}
