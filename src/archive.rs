//! Type archives
//!
//! An archive is a JSON document carrying a self-contained set of type
//! definitions, used to seed a repository's registry at startup or to ship
//! standard type packs between deployments. Each TypeDef entry carries a
//! fingerprint computed when the archive was built; the registry verifies
//! them before loading so a tampered or hand-edited archive is refused.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::fingerprint::TypeFingerprint;
use crate::typedefs::{AttributeTypeDef, TypeDef};

/// One TypeDef plus the fingerprint recorded at archive build time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeArchiveEntry {
    pub type_def: TypeDef,
    pub fingerprint: TypeFingerprint,
}

/// A self-contained pack of type definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeArchive {
    pub archive_name: String,
    pub archive_version: String,
    /// Metadata collection id of the archive's originator
    pub originator: String,
    #[serde(default)]
    pub attribute_type_defs: Vec<AttributeTypeDef>,
    #[serde(default)]
    pub type_defs: Vec<TypeArchiveEntry>,
}

impl TypeArchive {
    pub fn new(
        archive_name: impl Into<String>,
        archive_version: impl Into<String>,
        originator: impl Into<String>,
    ) -> Self {
        Self {
            archive_name: archive_name.into(),
            archive_version: archive_version.into(),
            originator: originator.into(),
            attribute_type_defs: Vec::new(),
            type_defs: Vec::new(),
        }
    }

    pub fn add_attribute_type_def(&mut self, attr_type_def: AttributeTypeDef) {
        self.attribute_type_defs.push(attr_type_def);
    }

    /// Record a TypeDef, fingerprinting it as archived
    pub fn add_type_def(&mut self, type_def: TypeDef) {
        let fingerprint = TypeFingerprint::of_type_def(&type_def);
        self.type_defs.push(TypeArchiveEntry {
            type_def,
            fingerprint,
        });
    }

    /// Check every recorded fingerprint against its TypeDef
    pub fn verify(&self, source_name: &str) -> Result<()> {
        for entry in &self.type_defs {
            if !entry.fingerprint.matches(&entry.type_def) {
                return Err(CoreError::invalid_parameter(
                    source_name,
                    "verify_archive",
                    format!(
                        "archive {} entry {} does not match its recorded fingerprint",
                        self.archive_name, entry.type_def.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Read an archive from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading archive {}", path.display()))?;
        let archive: TypeArchive = serde_json::from_str(&content)
            .with_context(|| format!("parsing archive {}", path.display()))?;
        debug!(
            archive = %archive.archive_name,
            path = %path.display(),
            types = archive.type_defs.len(),
            "archive read"
        );
        Ok(archive)
    }

    /// Write the archive as pretty-printed JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("writing archive {}", path.display()))?;
        Ok(())
    }
}

/// Find every `.json` archive file under the given search paths. Missing
/// directories are skipped, not errors.
pub fn discover_archives(search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in search_paths {
        if !root.exists() {
            debug!(path = %root.display(), "archive search path does not exist");
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                found.push(path.to_path_buf());
            }
        }
    }
    found.sort();
    found
}
