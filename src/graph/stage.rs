//! Stages - immutable descriptions of one external build step.
//!
//! A stage is a description, not a running process: its command sequence,
//! working directory, environment overlay, declared outputs, and completion
//! marker are all fixed at graph-construction time. Identical filesystem
//! state always yields identical commands.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::environment::{BorrowEdge, EnvironmentId};

/// Identifier of a stage, qualified by its owning environment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StageId {
    pub environment: EnvironmentId,
    pub name: String,
}

impl StageId {
    pub fn new(environment: EnvironmentId, name: impl Into<String>) -> Self {
        StageId {
            environment,
            name: name.into(),
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.environment, self.name)
    }
}

/// What executing a stage means.
#[derive(Debug, Clone, Serialize)]
pub enum StageKind {
    /// Run the external command sequence.
    Commands,
    /// Copy a declared artifact from a sibling environment's prefix.
    Borrow(BorrowEdge),
    /// Archive the completed prefix.
    Package,
}

/// One external command of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Display form for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Environment overlay of a stage.
///
/// Merged functionally over the base process environment at execution time;
/// no ambient mutable state survives between stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvOverlay {
    /// Replacement variables. An empty value clears the variable for the
    /// child (some C-library configure scripts refuse a populated
    /// `LD_LIBRARY_PATH`).
    pub vars: BTreeMap<String, String>,

    /// Directories prepended to `PATH`, e.g. sibling toolchain `bin` dirs.
    pub path_prepend: Vec<PathBuf>,
}

impl EnvOverlay {
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.path_prepend.is_empty()
    }

    /// Merge the overlay over a base environment, returning the child's
    /// complete environment map.
    pub fn merged(&self, base: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut env = base.clone();

        for (key, value) in &self.vars {
            env.insert(key.clone(), value.clone());
        }

        if !self.path_prepend.is_empty() {
            let existing = env.get("PATH").cloned().unwrap_or_default();
            let joined = std::env::join_paths(
                self.path_prepend
                    .iter()
                    .cloned()
                    .chain(std::env::split_paths(&existing)),
            )
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(existing);
            env.insert("PATH".to_string(), joined);
        }

        env
    }
}

/// Filesystem predicate deciding whether a stage's output already satisfies
/// its contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CompletionMarker {
    /// A key artifact exists.
    ArtifactExists(PathBuf),

    /// All listed artifacts exist.
    AllExist(Vec<PathBuf>),

    /// A stamp file exists and its trimmed content equals the expected
    /// string. Used by side-dependency installs that are shared across
    /// hosts.
    StampEquals { path: PathBuf, expected: String },

    /// Never satisfied; the stage always runs.
    Never,
}

impl CompletionMarker {
    /// Evaluate the predicate against the current filesystem.
    pub fn is_satisfied(&self) -> bool {
        match self {
            CompletionMarker::ArtifactExists(path) => path.exists(),
            CompletionMarker::AllExist(paths) => paths.iter().all(|p| p.exists()),
            CompletionMarker::StampEquals { path, expected } => {
                match std::fs::read_to_string(path) {
                    Ok(content) => content.trim() == expected,
                    Err(_) => false,
                }
            }
            CompletionMarker::Never => false,
        }
    }
}

/// An immutable description of one build stage.
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub id: StageId,

    pub kind: StageKind,

    /// Stages that must reach succeeded/skipped first.
    pub predecessors: Vec<StageId>,

    /// External command sequence, executed in order, aborted at the first
    /// non-zero exit. Empty for borrow and package stages.
    pub commands: Vec<CommandSpec>,

    /// Working directory of the command sequence. Owned exclusively by this
    /// stage for the lifetime of a run.
    pub build_dir: Option<PathBuf>,

    pub overlay: EnvOverlay,

    /// Paths this stage writes. Used to resolve borrow sources and to prove
    /// concurrently-ready stages write disjoint subpaths.
    pub outputs: Vec<PathBuf>,

    pub marker: CompletionMarker,

    /// A failure is recorded but does not block dependents.
    pub best_effort: bool,

    /// Position of the originating template in the catalog; the
    /// deterministic topological tie-break.
    pub catalog_index: usize,
}

impl Stage {
    pub fn new(id: StageId, kind: StageKind, catalog_index: usize) -> Self {
        Stage {
            id,
            kind,
            predecessors: Vec::new(),
            commands: Vec::new(),
            build_dir: None,
            overlay: EnvOverlay::default(),
            outputs: Vec::new(),
            marker: CompletionMarker::Never,
            best_effort: false,
            catalog_index,
        }
    }

    pub fn predecessor(mut self, id: StageId) -> Self {
        self.predecessors.push(id);
        self
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn build_dir(mut self, dir: PathBuf) -> Self {
        self.build_dir = Some(dir);
        self
    }

    pub fn overlay(mut self, overlay: EnvOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn output(mut self, path: PathBuf) -> Self {
        self.outputs.push(path);
        self
    }

    pub fn marker(mut self, marker: CompletionMarker) -> Self {
        self.marker = marker;
        self
    }

    pub fn best_effort(mut self, value: bool) -> Self {
        self.best_effort = value;
        self
    }

    /// Whether this stage writes a path covering `path`.
    pub fn produces(&self, path: &Path) -> bool {
        self.outputs.iter().any(|out| path.starts_with(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_id() -> EnvironmentId {
        EnvironmentId::from_name("test-env")
    }

    #[test]
    fn test_stage_id_display() {
        let id = StageId::new(env_id(), "binutils");
        assert_eq!(id.to_string(), "test-env/binutils");
    }

    #[test]
    fn test_overlay_merge_replaces_and_prepends() {
        let mut base = BTreeMap::new();
        base.insert("PATH".to_string(), "/usr/bin".to_string());
        base.insert("LD_LIBRARY_PATH".to_string(), "/usr/lib".to_string());

        let mut overlay = EnvOverlay::default();
        overlay
            .vars
            .insert("LD_LIBRARY_PATH".to_string(), String::new());
        overlay.path_prepend.push(PathBuf::from("/opt/cross/bin"));

        let merged = overlay.merged(&base);
        assert_eq!(merged["LD_LIBRARY_PATH"], "");
        assert!(merged["PATH"].starts_with("/opt/cross/bin"));
        assert!(merged["PATH"].contains("/usr/bin"));

        // The base map is untouched: merging is functional.
        assert_eq!(base["LD_LIBRARY_PATH"], "/usr/lib");
    }

    #[test]
    fn test_completion_marker_artifact() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bin/ld");

        let marker = CompletionMarker::ArtifactExists(path.clone());
        assert!(!marker.is_satisfied());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();
        assert!(marker.is_satisfied());
    }

    #[test]
    fn test_completion_marker_stamp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let stamp = tmp.path().join(".host");

        let marker = CompletionMarker::StampEquals {
            path: stamp.clone(),
            expected: "x86_64-w64-mingw32".to_string(),
        };
        assert!(!marker.is_satisfied());

        std::fs::write(&stamp, "x86_64-linux-gnu\n").unwrap();
        assert!(!marker.is_satisfied());

        std::fs::write(&stamp, "x86_64-w64-mingw32\n").unwrap();
        assert!(marker.is_satisfied());
    }

    #[test]
    fn test_stage_produces_subpaths() {
        let stage = Stage::new(StageId::new(env_id(), "compiler"), StageKind::Commands, 0)
            .output(PathBuf::from("/prefix/lib64"));

        assert!(stage.produces(Path::new("/prefix/lib64/libstdc++.so.6")));
        assert!(!stage.produces(Path::new("/prefix/bin/gcc")));
    }
}
