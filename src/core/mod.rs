//! Core data model.
//!
//! This module contains the foundational types of the orchestrator:
//! - Platform triples and role classification
//! - Environments (one toolchain build instance each) and borrow edges
//! - The build request record
//! - The error taxonomy

pub mod environment;
pub mod errors;
pub mod request;
pub mod triple;

pub use environment::{derive_prefix_name, BorrowEdge, Environment, EnvironmentId, EnvironmentSet};
pub use errors::{
    CommandError, ComponentNotFoundError, ConfigError, DependencyError, PackagingError,
    SourceNotFound,
};
pub use request::{BuildRequest, FeatureSet, ForceRebuild, ResolvedRequest};
pub use triple::{classify, RoleCategory, TripleSpec};
