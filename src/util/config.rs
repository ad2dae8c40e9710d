//! Persistent configuration.
//!
//! Global defaults live in `~/.config/crucible/config.toml`. Every field can
//! be overridden per request from the CLI or a request file.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

/// Default zstd compression level for packaging.
pub const DEFAULT_COMPRESS_LEVEL: i32 = 17;

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding component source trees (binutils, gcc, glibc, ...).
    pub home: PathBuf,

    /// Directory toolchain prefixes are installed under.
    pub prefix_dir: PathBuf,

    /// Concurrent jobs passed to external build tools.
    pub jobs: usize,

    /// zstd compression level used when packaging (1..=22).
    pub compress_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        let home = BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Config {
            prefix_dir: home.clone(),
            home,
            jobs: default_jobs(),
            compress_level: DEFAULT_COMPRESS_LEVEL,
        }
    }
}

/// External builds are make-bound; a couple of extra jobs keeps the pipe full.
fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() + 2)
        .unwrap_or(4)
}

impl Config {
    /// Load the global config file, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Path of the global config file, if a config directory exists.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "crucible").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            bail!("jobs must be at least 1");
        }
        if !(1..=22).contains(&self.compress_level) {
            bail!(
                "compress_level must be within 1..=22, got {}",
                self.compress_level
            );
        }
        Ok(())
    }
}
