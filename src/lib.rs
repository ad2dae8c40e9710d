//! Crucible - a staged build-graph orchestrator for GCC-style cross
//! toolchains.
//!
//! This crate provides the core library functionality for Crucible: the
//! triple and environment model, the stage catalog and graph builder, the
//! resumable stage runner, and deterministic packaging.

pub mod core;
pub mod graph;
pub mod ops;
pub mod runner;
pub mod sources;
pub mod util;

/// Test utilities and mocks for Crucible unit tests.
///
/// Provides a recording command substrate and fixtures for exercising the
/// scheduler without spawning processes.
#[cfg(test)]
pub mod test_support;

pub use core::{
    classify, derive_prefix_name, BuildRequest, Environment, EnvironmentId, EnvironmentSet,
    FeatureSet, ForceRebuild, RoleCategory, TripleSpec,
};

pub use graph::{Stage, StageGraph, StageId};
pub use runner::{BuildRun, BuildRunner, ResumePolicy, StageStatus};
pub use util::Config;
