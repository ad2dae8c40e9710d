//! Implementation of `crucible build`.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::core::environment::EnvironmentSet;
use crate::core::request::BuildRequest;
use crate::graph::build::StageGraph;
use crate::ops::package::{Packager, TarZstdWriter};
use crate::ops::plan::apply_overrides;
use crate::runner::events::{EventSink, JsonLinesSink, StageEvent};
use crate::runner::executor::{CommandSubstrate, DryRunSubstrate, ProcessSubstrate};
use crate::runner::resume::ResumePolicy;
use crate::runner::run::{BuildRunner, RunSummary};
use crate::sources::DirSourceProvider;
use crate::util::Config;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// The request record from the CLI or a request file.
    pub request: BuildRequest,

    /// Echo commands without executing them.
    pub dry_run: bool,

    /// Emit machine-readable events, one JSON object per line.
    pub json_events: bool,

    /// Verbose output.
    pub verbose: bool,
}

/// Run one toolchain build request end to end.
pub fn execute(opts: BuildOptions) -> Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &opts.request);
    config.validate()?;

    let resolved = opts.request.resolve().context("invalid build request")?;
    tracing::info!(
        role = %resolved.role,
        build = %resolved.build,
        host = %resolved.host,
        target = %resolved.target,
        "resolved request"
    );

    let set = EnvironmentSet::for_request(&resolved, &config);
    let provider = DirSourceProvider::new(&config.home);
    let graph = StageGraph::build(&set, &resolved.features, &provider, config.jobs)?;

    if opts.verbose {
        eprintln!(
            "    Planning {} stage(s) across {} environment(s)",
            graph.len(),
            set.len()
        );
    }

    let substrate: Box<dyn CommandSubstrate> = if opts.dry_run {
        Box::new(DryRunSubstrate)
    } else {
        Box::new(ProcessSubstrate)
    };
    let writer = TarZstdWriter::new(config.compress_level);
    let packager = Packager::new(&writer);

    let sink: Box<dyn EventSink> = if opts.json_events {
        Box::new(JsonLinesSink)
    } else {
        Box::new(ProgressSink::new(graph.len() as u64, opts.verbose))
    };

    let start = Instant::now();
    let run = BuildRunner::new(&graph, &set, substrate.as_ref(), &packager)
        .resume(ResumePolicy::new(&resolved.force))
        .sink(sink.as_ref())
        .jobs(config.jobs)
        .dry_run(opts.dry_run)
        .run();
    let summary = run.summary(&graph);

    let elapsed = start.elapsed();
    eprintln!(
        "    Finished {} succeeded, {} skipped in {:.2}s",
        summary.succeeded,
        summary.skipped,
        elapsed.as_secs_f64()
    );

    if !summary.is_success() {
        report_failures(&run, &summary);
        bail!(
            "build of `{}` failed: {} stage(s) failed, {} never scheduled",
            set.primary().id(),
            summary.failed.len(),
            summary.pending.len()
        );
    }

    Ok(())
}

/// Print captured output tails of failed stages.
fn report_failures(run: &crate::runner::run::BuildRun, summary: &RunSummary) {
    for (stage, best_effort) in &summary.failed {
        if *best_effort {
            continue;
        }
        eprintln!("error: stage `{stage}` failed");
        if let Some(log) = run.logs().iter().find(|l| &l.stage == stage) {
            for line in log.output.lines() {
                eprintln!("       {line}");
            }
        }
    }
}

/// Progress-bar event sink for interactive runs.
struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    fn new(total: u64, verbose: bool) -> Self {
        let bar = if verbose || total <= 1 {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            bar
        };
        ProgressSink { bar }
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: &StageEvent) {
        match event {
            StageEvent::Started { stage, .. } => self.bar.set_message(stage.clone()),
            StageEvent::Skipped { .. } | StageEvent::Succeeded { .. } => self.bar.inc(1),
            StageEvent::Failed { stage, .. } => {
                self.bar.println(format!("failed: {stage}"));
                self.bar.inc(1);
            }
            StageEvent::RunFinished { .. } => self.bar.finish_and_clear(),
        }
    }
}
