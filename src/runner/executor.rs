//! Stage command execution.
//!
//! Runs one stage's external command sequence with the stage's environment
//! overlay merged over a base environment. The process-spawning substrate is
//! injected so the executor itself stays substrate-agnostic: production uses
//! real subprocesses, tests record commands, dry runs only echo them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::core::errors::CommandError;
use crate::graph::stage::{CommandSpec, Stage};
use crate::util::fs::ensure_dir;
use crate::util::ProcessBuilder;

/// Result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Process-spawning substrate.
pub trait CommandSubstrate: Send + Sync {
    /// Run one command to completion, capturing combined output.
    fn run(
        &self,
        spec: &CommandSpec,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<CommandOutcome>;
}

/// Production substrate: real subprocesses with a fully explicit
/// environment.
#[derive(Debug, Default)]
pub struct ProcessSubstrate;

impl CommandSubstrate for ProcessSubstrate {
    fn run(
        &self,
        spec: &CommandSpec,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<CommandOutcome> {
        let output = ProcessBuilder::new(&spec.program)
            .args(&spec.args)
            .cwd(cwd)
            .env_replace(env.clone())
            .exec()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

/// Dry-run substrate: echoes commands without executing anything.
#[derive(Debug, Default)]
pub struct DryRunSubstrate;

impl CommandSubstrate for DryRunSubstrate {
    fn run(
        &self,
        spec: &CommandSpec,
        cwd: &Path,
        _env: &BTreeMap<String, String>,
    ) -> Result<CommandOutcome> {
        tracing::info!(cwd = %cwd.display(), "would run: {}", spec.display_command());
        Ok(CommandOutcome {
            exit_code: 0,
            output: String::new(),
        })
    }
}

/// Runs stages through an injected substrate.
pub struct CommandExecutor<'a> {
    substrate: &'a dyn CommandSubstrate,
    base_env: BTreeMap<String, String>,
}

impl<'a> CommandExecutor<'a> {
    /// Executor over the current process environment.
    pub fn new(substrate: &'a dyn CommandSubstrate) -> Self {
        CommandExecutor {
            substrate,
            base_env: std::env::vars().collect(),
        }
    }

    /// Executor over an explicit base environment.
    pub fn with_base_env(
        substrate: &'a dyn CommandSubstrate,
        base_env: BTreeMap<String, String>,
    ) -> Self {
        CommandExecutor {
            substrate,
            base_env,
        }
    }

    /// Run a stage's command sequence in order, aborting at the first
    /// non-zero exit. Returns the combined output, tagged per command.
    pub fn run_stage(&self, stage: &Stage) -> Result<String, CommandError> {
        let command_error = |exit_code: i32, log: &str| CommandError {
            stage: stage.id.to_string(),
            exit_code,
            output_tail: tail(log, 40),
        };

        let cwd = stage
            .build_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("."));
        if let Some(dir) = &stage.build_dir {
            ensure_dir(dir).map_err(|e| command_error(-1, &e.to_string()))?;
        }

        let env = stage.overlay.merged(&self.base_env);

        let mut log = String::new();
        for command in &stage.commands {
            tracing::debug!(stage = %stage.id, "$ {}", command.display_command());
            log.push_str(&format!("[{}] $ {}\n", stage.id, command.display_command()));

            let outcome = self
                .substrate
                .run(command, cwd, &env)
                .map_err(|e| command_error(-1, &format!("{log}{e:#}")))?;
            log.push_str(&outcome.output);

            if !outcome.success() {
                return Err(command_error(outcome.exit_code, &log));
            }
        }

        Ok(log)
    }
}

/// Last `lines` lines of a log.
fn tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
