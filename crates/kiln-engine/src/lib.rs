//! kiln engine - incremental build orchestration
//!
//! This crate turns a set of target declarations into a validated
//! dependency graph, decides which targets are out of date from artifact
//! timestamps, and runs the minimal set of actions in dependency order on
//! a bounded worker pool.
//!
//! Recipes and filesystem access are collaborators: callers supply an
//! [`ActionRunner`] and an [`ArtifactMetadata`] implementation.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod graph;
pub mod metadata;
pub mod node;
pub mod report;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod staleness;
pub mod testing;

pub use cancel::CancelToken;
pub use error::{BuildError, Cycle, FailureReason, Result};
pub use executor::{ActionRunner, Outcome};
pub use graph::{CycleCheck, Graph, SubGraph};
pub use metadata::{ArtifactMetadata, FsMetadata};
pub use node::{ActionRef, Node, NodeDeclaration, NodeKind, TargetId};
pub use report::Report;
pub use reporter::{BuildEvent, BuildReporter, CollectingReporter, HaltReason, ReporterRegistry, TracingReporter};
pub use scheduler::{plan, render_plan, ExecutionPlan, NodeState, Scheduler};
pub use session::{BuildSession, FailurePolicy, SessionOptions};
pub use staleness::{DependencyState, StaleReason, Staleness, StalenessOracle};
