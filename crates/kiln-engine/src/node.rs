//! Target and node types

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a buildable target.
///
/// For file targets this is the artifact path relative to the build root;
/// phony targets use any free-form name.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Create a new target ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TargetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque handle to the recipe that produces a target.
///
/// The engine never looks inside; it is handed back to the
/// [`ActionRunner`](crate::ActionRunner) when the target has to be built.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRef(String);

impl ActionRef {
    /// Create a new action reference
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key the front-end registered this action under
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a target corresponds to a real artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Produces a file whose existence and mtime can be observed
    #[default]
    File,
    /// Virtual goal without an artifact; always considered stale
    Phony,
}

/// One declared target: its dependencies, kind and action.
///
/// This is also the declaration type accepted by
/// [`Graph::from_declarations`](crate::Graph::from_declarations).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Target identifier
    pub id: TargetId,
    /// Targets that must be up to date first, in declaration order
    #[serde(default)]
    pub dependencies: Vec<TargetId>,
    /// Action producing the target; `None` means nothing is ever run for it
    #[serde(default)]
    pub action: Option<ActionRef>,
    /// File or phony
    #[serde(default)]
    pub kind: NodeKind,
    /// Further artifacts written by the same action. Dependencies on any of
    /// them resolve to this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<TargetId>,
}

/// Alias used by front-ends that build node lists
pub type NodeDeclaration = Node;

impl Node {
    /// Declare a file target with no dependencies and no action
    pub fn file(id: impl Into<TargetId>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            action: None,
            kind: NodeKind::File,
            outputs: Vec::new(),
        }
    }

    /// Declare a phony target with no dependencies and no action
    pub fn phony(id: impl Into<TargetId>) -> Self {
        Self {
            kind: NodeKind::Phony,
            ..Self::file(id)
        }
    }

    /// Add a dependency
    pub fn depends_on(mut self, dep: impl Into<TargetId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Set the action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(ActionRef::new(action));
        self
    }

    /// Declare a further artifact produced by the same action
    pub fn produces(mut self, output: impl Into<TargetId>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// Every artifact of a file target: its id, then the extra outputs.
    /// Phony targets have none.
    pub fn artifacts(&self) -> impl Iterator<Item = &TargetId> + '_ {
        let artifacts = (!self.is_phony()).then(|| std::iter::once(&self.id).chain(&self.outputs));
        artifacts.into_iter().flatten()
    }

    /// Whether this is a phony target
    pub fn is_phony(&self) -> bool {
        self.kind == NodeKind::Phony
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_display() {
        let id = TargetId::new("build/app.o");
        assert_eq!(id.to_string(), "build/app.o");
        assert_eq!(id.as_str(), "build/app.o");
    }

    #[test]
    fn test_target_id_borrow_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(TargetId::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn test_node_builder() {
        let node = Node::file("app")
            .depends_on("main.o")
            .depends_on("util.o")
            .with_action("link");

        assert_eq!(node.id, TargetId::from("app"));
        assert_eq!(
            node.dependencies,
            vec![TargetId::from("main.o"), TargetId::from("util.o")]
        );
        assert_eq!(node.action, Some(ActionRef::new("link")));
        assert!(!node.is_phony());
    }

    #[test]
    fn test_phony_node() {
        let node = Node::phony("all").depends_on("app");
        assert!(node.is_phony());
        assert!(node.action.is_none());
    }

    #[test]
    fn test_node_artifacts() {
        let node = Node::file("parser.c").produces("parser.h");
        let artifacts: Vec<&str> = node.artifacts().map(TargetId::as_str).collect();
        assert_eq!(artifacts, vec!["parser.c", "parser.h"]);

        assert_eq!(Node::phony("all").artifacts().count(), 0);
    }

    #[test]
    fn test_node_kind_serde() {
        let json = serde_json::to_string(&NodeKind::Phony).unwrap();
        assert_eq!(json, "\"phony\"");
        let kind: NodeKind = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(kind, NodeKind::File);
    }
}
