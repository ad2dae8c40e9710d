//! Test utilities and mocks.
//!
//! Provides a recording command substrate, a no-op source provider, and
//! helpers that materialize completion markers and borrowable artifacts on
//! a real (temporary) filesystem.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;

use crate::core::environment::EnvironmentSet;
use crate::core::errors::SourceNotFound;
use crate::graph::build::StageGraph;
use crate::graph::stage::{CommandSpec, CompletionMarker};
use crate::ops::package::ArchiveWriter;
use crate::runner::executor::{CommandOutcome, CommandSubstrate};
use crate::sources::SourceProvider;
use crate::util::fs::{ensure_dir, write_file};
use crate::util::Config;

/// A config rooted below a test directory.
pub fn test_config(dir: &Path) -> Config {
    Config {
        home: dir.join("home"),
        prefix_dir: dir.join("prefix"),
        jobs: 2,
        compress_level: 3,
    }
}

/// Source provider that never checks the filesystem.
#[derive(Debug, Clone)]
pub struct NullSourceProvider {
    base: PathBuf,
}

impl Default for NullSourceProvider {
    fn default() -> Self {
        NullSourceProvider {
            base: PathBuf::from("/src"),
        }
    }
}

impl NullSourceProvider {
    /// Provider handing out paths below `base`.
    pub fn rooted(base: impl Into<PathBuf>) -> Self {
        NullSourceProvider { base: base.into() }
    }
}

impl SourceProvider for NullSourceProvider {
    fn source_path(&self, component: &str) -> Result<PathBuf, SourceNotFound> {
        Ok(self.base.join(component))
    }
}

/// Recording command substrate.
///
/// Commands are recorded in invocation order; an optional pattern makes
/// matching commands fail with exit code 1. Nothing touches the real
/// process table.
#[derive(Debug, Default)]
pub struct MockSubstrate {
    commands: Mutex<Vec<String>>,
    envs: Mutex<Vec<BTreeMap<String, String>>>,
    fail_matching: Option<String>,
}

impl MockSubstrate {
    /// Substrate failing every command whose display form contains
    /// `pattern`.
    pub fn failing_on(pattern: impl Into<String>) -> Self {
        MockSubstrate {
            fail_matching: Some(pattern.into()),
            ..MockSubstrate::default()
        }
    }

    /// All commands recorded so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Environment of the most recent command.
    pub fn last_env(&self) -> BTreeMap<String, String> {
        self.envs.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl CommandSubstrate for MockSubstrate {
    fn run(
        &self,
        spec: &CommandSpec,
        _cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<CommandOutcome> {
        let display = spec.display_command();
        self.commands.lock().unwrap().push(display.clone());
        self.envs.lock().unwrap().push(env.clone());

        let failed = self
            .fail_matching
            .as_ref()
            .is_some_and(|pattern| display.contains(pattern));
        Ok(CommandOutcome {
            exit_code: if failed { 1 } else { 0 },
            output: if failed {
                format!("mock failure: {display}\n")
            } else {
                String::new()
            },
        })
    }
}

/// Archive writer that only creates an empty archive file.
#[derive(Debug, Default)]
pub struct StubArchiveWriter;

impl ArchiveWriter for StubArchiveWriter {
    fn compress(&self, _dir: &Path, dest: &Path) -> Result<()> {
        std::fs::write(dest, b"")?;
        Ok(())
    }
}

/// Create every stage's completion-marker artifact, as a finished run would
/// have.
pub fn satisfy_all_markers(graph: &StageGraph) {
    for stage in graph.iter_ordered() {
        match &stage.marker {
            CompletionMarker::ArtifactExists(path) => write_file(path, b"").unwrap(),
            CompletionMarker::AllExist(paths) => {
                for path in paths {
                    write_file(path, b"").unwrap();
                }
            }
            CompletionMarker::StampEquals { path, expected } => {
                write_file(path, expected.as_bytes()).unwrap()
            }
            CompletionMarker::Never => {}
        }
    }
}

/// Create the source-side artifact of every declared borrow edge, so borrow
/// stages have something to copy.
pub fn materialize_borrow_sources(set: &EnvironmentSet) {
    for env in set.iter() {
        for edge in env.borrows() {
            let source = set
                .get(&edge.source)
                .expect("borrow edges point at known siblings");
            let path = source.prefix().join(&edge.source_rel);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if name.contains('.') || name.starts_with("gdbserver") {
                write_file(&path, name.as_bytes()).unwrap();
            } else {
                ensure_dir(&path).unwrap();
                write_file(&path.join("placeholder"), b"").unwrap();
            }
        }
    }
}
