//! Stage execution: command executor, resume policy, borrow linker, and the
//! wave scheduler driving a build run.

pub mod events;
pub mod executor;
pub mod linker;
pub mod resume;
pub mod run;

pub use events::{EventSink, JsonLinesSink, StageEvent, TracingSink};
pub use executor::{CommandExecutor, CommandOutcome, CommandSubstrate, DryRunSubstrate, ProcessSubstrate};
pub use resume::ResumePolicy;
pub use run::{BuildRun, BuildRunner, RunSummary, StageLog, StageStatus};
