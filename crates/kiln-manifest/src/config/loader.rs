//! Declaration file loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::manifest_file_names;
use super::types::Manifest;
use super::validation::validate_manifest;

/// Load and validate a declaration file
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let is_yaml = path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml");
    let format = if is_yaml { "YAML" } else { "TOML" };
    info!(path = %path.display(), format, "loading manifest");

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest: Manifest = if is_yaml {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    } else {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    };

    validate_manifest(&manifest)?;
    debug!(
        path = %path.display(),
        targets = manifest.targets.len(),
        "manifest loaded and validated"
    );
    Ok(manifest)
}

/// Find the declaration file in a directory or its parents.
///
/// File names are tried in [`manifest_file_names`] order at each level;
/// the nearest directory wins.
pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for manifest");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in manifest_file_names() {
            let candidate = current.join(name);
            if candidate.is_file() {
                info!(path = %candidate.display(), "found manifest");
                return Some(candidate);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no manifest found");
    None
}

/// Locate and load the declaration file for a directory
pub fn load_manifest_from_dir(dir: &Path) -> Result<(Manifest, PathBuf)> {
    let path = find_manifest(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;
    let manifest = load_manifest(&path)?;
    Ok((manifest, path))
}

/// Directory that relative target names and recipe working directories
/// are resolved against
pub fn manifest_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KilnError;
    use tempfile::TempDir;

    const MINIMAL: &str = "[[target]]\nname = \"out.txt\"\nshell = \"touch out.txt\"\n";

    #[test]
    fn test_find_manifest_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kiln.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        assert_eq!(find_manifest(temp.path()), Some(path));
    }

    #[test]
    fn test_find_manifest_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("kiln.toml");
        std::fs::write(&toml_path, MINIMAL).unwrap();
        std::fs::write(temp.path().join("kiln.yaml"), "target: []\n").unwrap();

        assert_eq!(find_manifest(temp.path()).unwrap(), toml_path);
    }

    #[test]
    fn test_find_manifest_in_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".kiln.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let nested = temp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_manifest(&nested).unwrap(), path);
    }

    #[test]
    fn test_load_manifest_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kiln.yaml");
        std::fs::write(
            &path,
            "settings:\n  jobs: 2\ntarget:\n  - name: all\n    phony: true\n",
        )
        .unwrap();

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.settings.jobs, 2);
        assert!(manifest.targets[0].phony);
    }

    #[test]
    fn test_load_manifest_from_dir_missing() {
        let temp = TempDir::new().unwrap();
        let err = load_manifest_from_dir(temp.path()).unwrap_err();
        assert!(matches!(err, KilnError::Config(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_manifest_runs_validation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kiln.toml");
        std::fs::write(&path, "[settings]\njobs = 0\n").unwrap();

        let err = load_manifest(&path).unwrap_err();
        assert!(err.to_string().contains("settings.jobs"));
    }

    #[test]
    fn test_manifest_root() {
        assert_eq!(manifest_root(Path::new("kiln.toml")), PathBuf::from("."));
        assert_eq!(
            manifest_root(Path::new("/work/proj/kiln.toml")),
            PathBuf::from("/work/proj")
        );
    }
}
