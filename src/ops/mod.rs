//! High-level operations tying the core together.

pub mod build;
pub mod package;
pub mod plan;

pub use build::BuildOptions;
pub use package::{ArchiveWriter, Packager, TarZstdWriter};
pub use plan::PlanEntry;
