//! Artifact metadata collaborator

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

use crate::node::TargetId;

/// Read-only view of the artifacts produced by file targets.
///
/// Queried from the coordinator each time a node becomes ready, so values
/// reflect the artifacts written by actions earlier in the same session.
pub trait ArtifactMetadata: Send + Sync {
    /// Whether the artifact for a target exists
    fn exists(&self, id: &TargetId) -> bool;

    /// Last modification time, `None` when the artifact is absent
    fn modified_at(&self, id: &TargetId) -> Option<SystemTime>;
}

/// Metadata backed by the filesystem, with target ids resolved as paths
/// relative to a root directory
#[derive(Debug, Clone)]
pub struct FsMetadata {
    root: PathBuf,
}

impl FsMetadata {
    /// Create metadata rooted at a directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The build root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for a target
    pub fn artifact_path(&self, id: &TargetId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

impl ArtifactMetadata for FsMetadata {
    fn exists(&self, id: &TargetId) -> bool {
        self.artifact_path(id).exists()
    }

    fn modified_at(&self, id: &TargetId) -> Option<SystemTime> {
        let path = self.artifact_path(id);
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(mtime) => Some(mtime),
            Err(e) => {
                trace!(path = %path.display(), error = %e, "no artifact mtime");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_metadata_missing() {
        let temp = TempDir::new().unwrap();
        let metadata = FsMetadata::new(temp.path());
        let id = TargetId::from("out/app");

        assert!(!metadata.exists(&id));
        assert!(metadata.modified_at(&id).is_none());
    }

    #[test]
    fn test_fs_metadata_existing() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("out")).unwrap();
        std::fs::write(temp.path().join("out/app"), "binary").unwrap();

        let metadata = FsMetadata::new(temp.path());
        let id = TargetId::from("out/app");

        assert!(metadata.exists(&id));
        assert!(metadata.modified_at(&id).is_some());
        assert_eq!(metadata.artifact_path(&id), temp.path().join("out/app"));
    }
}
