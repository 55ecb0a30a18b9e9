//! `plugin.toml` parsing.

use std::path::{Path, PathBuf};

use hostdeck_types::PluginManifest;

/// File whose presence marks a directory as a unit.
pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no plugin.toml in {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

pub fn has_manifest(unit_dir: &Path) -> bool {
    unit_dir.join(MANIFEST_FILE).is_file()
}

/// Read and validate the manifest of the unit rooted at `unit_dir`.
pub fn load_manifest(unit_dir: &Path) -> Result<PluginManifest, ManifestError> {
    let path = unit_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(ManifestError::Missing(unit_dir.to_path_buf()));
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest: PluginManifest = toml::from_str(&content).map_err(|source| ManifestError::Parse {
        path: path.clone(),
        source,
    })?;

    if manifest.name.trim().is_empty() {
        return Err(ManifestError::Invalid {
            path,
            reason: "name is empty".into(),
        });
    }
    if manifest.version.trim().is_empty() {
        return Err(ManifestError::Invalid {
            path,
            reason: "version is empty".into(),
        });
    }

    Ok(manifest)
}
