//! Resume / idempotence policy.
//!
//! Before a stage is scheduled its completion marker is evaluated against
//! the filesystem. A satisfied marker skips the stage unless a force flag
//! targets it or one of its predecessors actually re-ran in this run.
//! Running the policy over an already-complete run issues zero external
//! commands.

use std::collections::BTreeSet;

use crate::core::request::ForceRebuild;
use crate::graph::stage::{Stage, StageId};

/// Skip decisions for one build run.
#[derive(Debug, Clone, Default)]
pub struct ResumePolicy {
    force_all: bool,
    force_stages: BTreeSet<String>,
}

impl ResumePolicy {
    pub fn new(force: &ForceRebuild) -> Self {
        ResumePolicy {
            force_all: force.all,
            force_stages: force.stages.clone(),
        }
    }

    /// Whether a force flag targets this stage. Matches the bare stage
    /// name, the `environment/stage` form, or a whole environment by name.
    pub fn is_forced(&self, id: &StageId) -> bool {
        self.force_all
            || self.force_stages.contains(&id.name)
            || self.force_stages.contains(&id.to_string())
            || self.force_stages.contains(id.environment.as_str())
    }

    /// Whether the stage may transition directly to skipped.
    ///
    /// `predecessor_ran` is true when any predecessor actually executed in
    /// this run: a re-run invalidates everything downstream of it even when
    /// downstream markers are still satisfied.
    pub fn should_skip(&self, stage: &Stage, predecessor_ran: bool) -> bool {
        !self.is_forced(&stage.id) && !predecessor_ran && stage.marker.is_satisfied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::EnvironmentId;
    use crate::graph::stage::{CompletionMarker, StageKind};

    fn stage(name: &str, marker: CompletionMarker) -> Stage {
        Stage::new(
            StageId::new(EnvironmentId::from_name("env"), name),
            StageKind::Commands,
            0,
        )
        .marker(marker)
    }

    fn satisfied_marker(tmp: &tempfile::TempDir) -> CompletionMarker {
        let path = tmp.path().join("artifact");
        std::fs::write(&path, "").unwrap();
        CompletionMarker::ArtifactExists(path)
    }

    #[test]
    fn test_satisfied_marker_skips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = ResumePolicy::default();
        let stage = stage("compiler", satisfied_marker(&tmp));

        assert!(policy.should_skip(&stage, false));
    }

    #[test]
    fn test_unsatisfied_marker_runs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = ResumePolicy::default();
        let stage = stage(
            "compiler",
            CompletionMarker::ArtifactExists(tmp.path().join("missing")),
        );

        assert!(!policy.should_skip(&stage, false));
    }

    #[test]
    fn test_force_by_name_and_qualified_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let force = ForceRebuild {
            stages: ["compiler".to_string(), "env/libc".to_string()]
                .into_iter()
                .collect(),
            all: false,
        };
        let policy = ResumePolicy::new(&force);

        assert!(!policy.should_skip(&stage("compiler", satisfied_marker(&tmp)), false));
        assert!(!policy.should_skip(&stage("libc", satisfied_marker(&tmp)), false));
        assert!(policy.should_skip(&stage("binutils", satisfied_marker(&tmp)), false));
    }

    #[test]
    fn test_force_whole_environment() {
        let tmp = tempfile::TempDir::new().unwrap();
        let force = ForceRebuild {
            stages: ["env".to_string()].into_iter().collect(),
            all: false,
        };
        let policy = ResumePolicy::new(&force);

        // Every stage of the named environment rebuilds.
        assert!(!policy.should_skip(&stage("binutils", satisfied_marker(&tmp)), false));
        assert!(!policy.should_skip(&stage("compiler", satisfied_marker(&tmp)), false));
    }

    #[test]
    fn test_force_all() {
        let tmp = tempfile::TempDir::new().unwrap();
        let force = ForceRebuild {
            stages: BTreeSet::new(),
            all: true,
        };
        let policy = ResumePolicy::new(&force);

        assert!(!policy.should_skip(&stage("binutils", satisfied_marker(&tmp)), false));
    }

    #[test]
    fn test_predecessor_rerun_invalidates_skip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = ResumePolicy::default();
        let stage = stage("package", satisfied_marker(&tmp));

        assert!(policy.should_skip(&stage, false));
        assert!(!policy.should_skip(&stage, true));
    }
}
