//! Stage model, template catalog, and graph construction.

pub mod build;
pub mod catalog;
pub mod stage;

pub use build::StageGraph;
pub use catalog::Catalog;
pub use stage::{CommandSpec, CompletionMarker, EnvOverlay, Stage, StageId, StageKind};
