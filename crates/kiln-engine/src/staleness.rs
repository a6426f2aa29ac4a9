//! Staleness oracle: decides whether a target must be (re)built

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::metadata::ArtifactMetadata;
use crate::node::{Node, TargetId};

/// Why a node has to be built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "target", rename_all = "snake_case")]
pub enum StaleReason {
    /// Every node is forced stale for this session
    AlwaysMake,
    /// Phony targets are always stale
    Phony,
    /// An artifact does not exist
    Missing,
    /// A dependency ran its action in this session
    DependencyRebuilt(TargetId),
    /// A dependency's artifact is newer than this one, or has none
    DependencyNewer(TargetId),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysMake => f.write_str("forced rebuild"),
            Self::Phony => f.write_str("phony target"),
            Self::Missing => f.write_str("artifact missing"),
            Self::DependencyRebuilt(dep) => write!(f, "dependency '{}' was rebuilt", dep),
            Self::DependencyNewer(dep) => write!(f, "dependency '{}' is newer", dep),
        }
    }
}

/// Oracle verdict for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Up to date, nothing to run
    Fresh,
    /// Must be built
    Stale(StaleReason),
}

impl Staleness {
    /// Whether the node must be built
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// What the oracle needs to know about one dependency
#[derive(Debug, Clone, Copy)]
pub struct DependencyState<'a> {
    /// Dependency node
    pub node: &'a Node,
    /// Whether its action ran and succeeded in this session
    pub rebuilt: bool,
}

/// Applies the staleness rules against an [`ArtifactMetadata`] source.
///
/// Rules are checked in order, first match wins:
/// phony, missing artifact, dependency rebuilt this session, dependency
/// artifact strictly newer (or absent). Timestamps are never compared for
/// rebuilt dependencies. A node with extra outputs is as old as its oldest
/// artifact and missing if any of them is.
pub struct StalenessOracle<'m> {
    metadata: &'m dyn ArtifactMetadata,
    always_make: bool,
}

impl<'m> StalenessOracle<'m> {
    /// Create an oracle
    pub fn new(metadata: &'m dyn ArtifactMetadata) -> Self {
        Self {
            metadata,
            always_make: false,
        }
    }

    /// Treat every node as stale
    pub fn always_make(mut self, always_make: bool) -> Self {
        self.always_make = always_make;
        self
    }

    /// Whether the node must be built
    pub fn must_build(&self, node: &Node, dependencies: &[DependencyState<'_>]) -> bool {
        self.evaluate(node, dependencies).is_stale()
    }

    /// Evaluate a node whose dependencies have all succeeded
    pub fn evaluate(&self, node: &Node, dependencies: &[DependencyState<'_>]) -> Staleness {
        if self.always_make {
            return Staleness::Stale(StaleReason::AlwaysMake);
        }

        if node.is_phony() {
            return Staleness::Stale(StaleReason::Phony);
        }

        let Some(own_mtime) = self.oldest_artifact(node) else {
            return Staleness::Stale(StaleReason::Missing);
        };

        if let Some(dep) = dependencies.iter().find(|d| d.rebuilt) {
            return Staleness::Stale(StaleReason::DependencyRebuilt(dep.node.id.clone()));
        }

        for dep in dependencies {
            if self.is_newer(dep.node, own_mtime) {
                return Staleness::Stale(StaleReason::DependencyNewer(dep.node.id.clone()));
            }
        }

        Staleness::Fresh
    }

    /// Oldest artifact mtime, `None` if any artifact is missing
    fn oldest_artifact(&self, node: &Node) -> Option<SystemTime> {
        let mut oldest: Option<SystemTime> = None;
        for artifact in node.artifacts() {
            if !self.metadata.exists(artifact) {
                return None;
            }
            let mtime = self.metadata.modified_at(artifact)?;
            oldest = Some(oldest.map_or(mtime, |o| o.min(mtime)));
        }
        oldest
    }

    fn is_newer(&self, dep: &Node, than: SystemTime) -> bool {
        if dep.is_phony() {
            return true;
        }
        dep.artifacts()
            .any(|artifact| match self.metadata.modified_at(artifact) {
                Some(mtime) => than < mtime,
                None => true,
            })
    }
}
