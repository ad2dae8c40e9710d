//! Build run scheduling.
//!
//! Executes a stage graph on a bounded worker pool in waves: every stage
//! whose predecessors have reached succeeded or skipped is ready, ready
//! stages run concurrently, chains run strictly in sequence. On a fatal
//! failure nothing downstream of the failed stage is ever scheduled, the
//! running wave finishes undisturbed, and independent branches continue to
//! completion.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use rayon::prelude::*;

use crate::core::environment::EnvironmentSet;
use crate::core::errors::CommandError;
use crate::graph::build::StageGraph;
use crate::graph::stage::{Stage, StageId, StageKind};
use crate::ops::package::Packager;
use crate::runner::events::{EventSink, StageEvent, TracingSink};
use crate::runner::executor::{CommandExecutor, CommandSubstrate};
use crate::runner::linker::execute_borrow;
use crate::runner::resume::ResumePolicy;

/// Execution status of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

/// Captured output of one executed stage.
#[derive(Debug, Clone)]
pub struct StageLog {
    pub stage: StageId,
    pub output: String,
}

/// The executing (then executed) instance of a stage graph.
#[derive(Debug)]
pub struct BuildRun {
    statuses: HashMap<StageId, StageStatus>,
    logs: Vec<StageLog>,
    executed: HashSet<StageId>,
}

impl BuildRun {
    pub fn status(&self, id: &StageId) -> StageStatus {
        self.statuses
            .get(id)
            .copied()
            .unwrap_or(StageStatus::Pending)
    }

    pub fn statuses(&self) -> &HashMap<StageId, StageStatus> {
        &self.statuses
    }

    pub fn logs(&self) -> &[StageLog] {
        &self.logs
    }

    /// Stages that actually invoked work in this run.
    pub fn executed(&self) -> &HashSet<StageId> {
        &self.executed
    }

    /// Summarize against the graph the run was built from.
    pub fn summary(&self, graph: &StageGraph) -> RunSummary {
        let mut summary = RunSummary::default();
        for stage in graph.iter_ordered() {
            match self.status(&stage.id) {
                StageStatus::Succeeded => summary.succeeded += 1,
                StageStatus::Skipped => summary.skipped += 1,
                StageStatus::Failed => {
                    summary.failed.push((stage.id.clone(), stage.best_effort))
                }
                StageStatus::Pending | StageStatus::Running => {
                    summary.pending.push(stage.id.clone())
                }
            }
        }
        summary
    }
}

/// Partial-failure summary of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    /// Failed stages with their best-effort flag.
    pub failed: Vec<(StageId, bool)>,
    /// Stages never scheduled because a predecessor failed.
    pub pending: Vec<StageId>,
}

impl RunSummary {
    /// A run succeeds when every stage reached succeeded or skipped, best-
    /// effort failures aside.
    pub fn is_success(&self) -> bool {
        self.pending.is_empty() && self.failed.iter().all(|(_, best_effort)| *best_effort)
    }
}

/// Outcome of one stage inside a wave.
struct WaveOutcome {
    id: StageId,
    status: StageStatus,
    executed: bool,
    log: Option<String>,
}

/// Drives a stage graph to completion.
pub struct BuildRunner<'a> {
    graph: &'a StageGraph,
    set: &'a EnvironmentSet,
    substrate: &'a dyn CommandSubstrate,
    packager: &'a Packager<'a>,
    resume: ResumePolicy,
    sink: &'a dyn EventSink,
    jobs: usize,
    dry_run: bool,
    base_env: Option<BTreeMap<String, String>>,
}

impl<'a> BuildRunner<'a> {
    pub fn new(
        graph: &'a StageGraph,
        set: &'a EnvironmentSet,
        substrate: &'a dyn CommandSubstrate,
        packager: &'a Packager<'a>,
    ) -> Self {
        static TRACING_SINK: TracingSink = TracingSink;
        BuildRunner {
            graph,
            set,
            substrate,
            packager,
            resume: ResumePolicy::default(),
            sink: &TRACING_SINK,
            jobs: 4,
            dry_run: false,
            base_env: None,
        }
    }

    pub fn resume(mut self, resume: ResumePolicy) -> Self {
        self.resume = resume;
        self
    }

    pub fn sink(mut self, sink: &'a dyn EventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Bound the worker pool.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Treat borrow and package stages as no-ops; command stages still go
    /// through the (echoing) substrate.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Replace the base process environment (tests).
    pub fn base_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.base_env = Some(env);
        self
    }

    /// Run the graph to completion or containment.
    pub fn run(&self) -> BuildRun {
        let executor = match &self.base_env {
            Some(env) => CommandExecutor::with_base_env(self.substrate, env.clone()),
            None => CommandExecutor::new(self.substrate),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .ok();

        let mut statuses: HashMap<StageId, StageStatus> = self
            .graph
            .iter_ordered()
            .map(|s| (s.id.clone(), StageStatus::Pending))
            .collect();
        let mut executed: HashSet<StageId> = HashSet::new();
        let mut logs: Vec<StageLog> = Vec::new();

        loop {
            let ready: Vec<&Stage> = self
                .graph
                .iter_ordered()
                .filter(|stage| {
                    statuses[&stage.id] == StageStatus::Pending
                        && stage.predecessors.iter().all(|pred| {
                            match statuses.get(pred).copied().unwrap_or(StageStatus::Pending) {
                                StageStatus::Succeeded | StageStatus::Skipped => true,
                                // A best-effort failure does not block
                                // dependents.
                                StageStatus::Failed => self
                                    .graph
                                    .get(pred)
                                    .map(|p| p.best_effort)
                                    .unwrap_or(false),
                                _ => false,
                            }
                        })
                })
                .collect();

            if ready.is_empty() {
                break;
            }

            let outcomes: Vec<WaveOutcome> = match &pool {
                Some(pool) => pool.install(|| {
                    ready
                        .par_iter()
                        .map(|stage| self.process(stage, &executor, &executed))
                        .collect()
                }),
                None => ready
                    .iter()
                    .map(|stage| self.process(stage, &executor, &executed))
                    .collect(),
            };

            for outcome in outcomes {
                statuses.insert(outcome.id.clone(), outcome.status);
                if outcome.executed {
                    executed.insert(outcome.id.clone());
                }
                if let Some(output) = outcome.log {
                    logs.push(StageLog {
                        stage: outcome.id,
                        output,
                    });
                }
            }
        }

        let run = BuildRun {
            statuses,
            logs,
            executed,
        };
        let summary = run.summary(self.graph);
        self.sink.emit(&StageEvent::RunFinished {
            success: summary.is_success(),
            succeeded: summary.succeeded as u64,
            skipped: summary.skipped as u64,
            failed: summary.failed.len() as u64,
            pending: summary.pending.len() as u64,
        });
        run
    }

    /// Execute or skip one ready stage.
    fn process(
        &self,
        stage: &Stage,
        executor: &CommandExecutor<'_>,
        executed: &HashSet<StageId>,
    ) -> WaveOutcome {
        let environment = stage.id.environment.to_string();
        let predecessor_ran = stage.predecessors.iter().any(|p| executed.contains(p));

        if self.resume.should_skip(stage, predecessor_ran) {
            self.sink.emit(&StageEvent::Skipped {
                stage: stage.id.to_string(),
                environment,
            });
            return WaveOutcome {
                id: stage.id.clone(),
                status: StageStatus::Skipped,
                executed: false,
                log: None,
            };
        }

        self.sink.emit(&StageEvent::Started {
            stage: stage.id.to_string(),
            environment: environment.clone(),
        });
        let start = Instant::now();

        let result: Result<String, CommandError> = match &stage.kind {
            StageKind::Commands => executor.run_stage(stage),
            StageKind::Borrow(_) | StageKind::Package if self.dry_run => {
                Ok(format!("would run {}", stage.id))
            }
            StageKind::Borrow(edge) => {
                execute_borrow(self.set, &stage.id.environment, edge)
                    .map(|()| format!("borrowed {}", edge.dest_rel.display()))
                    .map_err(|e| CommandError {
                        stage: stage.id.to_string(),
                        exit_code: -1,
                        output_tail: format!("{e:#}"),
                    })
            }
            StageKind::Package => {
                let env = self
                    .set
                    .get(&stage.id.environment)
                    .expect("package stage belongs to a known environment");
                self.packager
                    .package(env)
                    .map(|path| format!("archived {}", path.display()))
                    .map_err(|e| CommandError {
                        stage: stage.id.to_string(),
                        exit_code: -1,
                        output_tail: format!("{e}"),
                    })
            }
        };

        match result {
            Ok(log) => {
                self.sink.emit(&StageEvent::Succeeded {
                    stage: stage.id.to_string(),
                    environment,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                WaveOutcome {
                    id: stage.id.clone(),
                    status: StageStatus::Succeeded,
                    executed: true,
                    log: Some(log),
                }
            }
            Err(err) => {
                self.sink.emit(&StageEvent::Failed {
                    stage: stage.id.to_string(),
                    environment,
                    exit_code: err.exit_code,
                    best_effort: stage.best_effort,
                });
                WaveOutcome {
                    id: stage.id.clone(),
                    status: StageStatus::Failed,
                    executed: true,
                    log: Some(err.to_string()),
                }
            }
        }
    }
}
