//! Error taxonomy for the build core.
//!
//! Structural errors (`ConfigError`, `DependencyError`) surface before any
//! external process runs. `CommandError` is scoped to one stage and its
//! dependent subgraph. Nothing is silently retried; re-invocation is the
//! caller's responsibility and is made safe by the resume policy.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed or unsupported triple / role combination.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed triple `{triple}`: expected 2 to 4 dash-separated fields")]
    FieldCount { triple: String },

    #[error("malformed triple `{triple}`: empty field")]
    EmptyField { triple: String },

    #[error("unknown architecture `{arch}` in triple `{triple}`")]
    UnknownArch { triple: String, arch: String },

    #[error("unknown operating system `{os}` in triple `{triple}`")]
    UnknownOs { triple: String, os: String },

    #[error(
        "unsupported role combination build={build} host={host} target={target}: {reason}"
    )]
    UnsupportedRole {
        build: String,
        host: String,
        target: String,
        reason: String,
    },

    #[error("unsupported feature selection: {reason}")]
    UnsupportedFeature { reason: String },
}

/// A required component install path cannot be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "component `{component}` is not registered in environment `{environment}` \
     or any borrowed sibling"
)]
pub struct ComponentNotFoundError {
    pub component: String,
    pub environment: String,
}

/// A component source tree is missing from the provisioning layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("source tree for `{component}` not found at {path}")]
pub struct SourceNotFound {
    pub component: String,
    pub path: PathBuf,
}

/// A stage's predecessor cannot be resolved locally or via any declared
/// sibling environment. Raised during graph construction, before execution.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("stage `{stage}` declares unknown predecessor `{predecessor}`")]
    UnresolvedPredecessor { stage: String, predecessor: String },

    #[error("environment `{environment}` borrows from undeclared sibling `{sibling}`")]
    UnknownSibling {
        environment: String,
        sibling: String,
    },

    #[error("no stage of `{environment}` produces borrowed path `{path}`")]
    UnresolvedBorrow {
        environment: String,
        path: PathBuf,
    },

    #[error("stage dependency cycle involving `{stage}`")]
    Cycle { stage: String },

    #[error(
        "stages `{first}` and `{second}` may run concurrently but both write `{path}`"
    )]
    OverlappingOutputs {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error(transparent)]
    Component(#[from] ComponentNotFoundError),

    #[error(transparent)]
    Source(#[from] SourceNotFound),
}

/// A non-best-effort stage's external command exited non-zero.
#[derive(Debug, Clone, Error)]
#[error("stage `{stage}` failed with exit code {exit_code}\n{output_tail}")]
pub struct CommandError {
    pub stage: String,
    pub exit_code: i32,
    pub output_tail: String,
}

/// Archive creation failed on a completed environment.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("environment `{environment}` has no prefix tree at {prefix}; nothing to package")]
    MissingPrefix {
        environment: String,
        prefix: PathBuf,
    },

    #[error("failed to archive environment `{environment}`")]
    Archive {
        environment: String,
        #[source]
        source: anyhow::Error,
    },
}
