//! CLI definitions using clap.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use semver::Version;

use crucible::core::request::{BuildRequest, ForceRebuild};

/// Crucible - staged toolchain builds for native, cross, Canadian-cross and
/// bare-metal targets
#[derive(Parser)]
#[command(name = "crucible")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a toolchain for a (build, host, target) combination
    Build(BuildArgs),

    /// Show the stage sequence a request would execute
    Plan(PlanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// The request record, shared by `build` and `plan`.
#[derive(Args, Clone)]
pub struct RequestArgs {
    /// Build platform triple (probed from the host compiler when omitted)
    #[arg(long)]
    pub build: Option<String>,

    /// Host platform triple (defaults to the build platform)
    #[arg(long)]
    pub host: Option<String>,

    /// Target platform triple (defaults to the host platform)
    #[arg(long)]
    pub target: Option<String>,

    /// Toolchain variant version
    #[arg(long, value_name = "VERSION")]
    pub toolchain_version: Option<Version>,

    /// Skip the debugger build
    #[arg(long)]
    pub without_debugger: bool,

    /// Also build the remote debug server
    #[arg(long)]
    pub with_gdbserver: bool,

    /// Bare-metal targets: skip the C library and borrow the runtime from a
    /// native sibling toolchain
    #[arg(long)]
    pub without_libc: bool,

    /// Install debugger init scripts and pretty-printers
    #[arg(long)]
    pub with_scripts: bool,

    /// Build the secondary 32-bit runtime
    #[arg(long)]
    pub multilib: bool,

    /// Enable native-language messages
    #[arg(long)]
    pub nls: bool,

    /// Directory holding component source trees
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Directory toolchain prefixes are installed under
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Concurrent jobs for external build tools
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// zstd compression level for packaging (1-22)
    #[arg(long)]
    pub compress: Option<i32>,

    /// Import the request from a TOML file; flags override imported values
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Export the assembled request to a TOML file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,
}

impl RequestArgs {
    /// Assemble the request record, starting from an imported file when
    /// given and applying flags on top.
    pub fn to_request(&self) -> Result<BuildRequest> {
        let mut request = match &self.request {
            Some(path) => BuildRequest::load(path)?,
            None => BuildRequest::default(),
        };

        if self.build.is_some() {
            request.build = self.build.clone();
        }
        if self.host.is_some() {
            request.host = self.host.clone();
        }
        if self.target.is_some() {
            request.target = self.target.clone();
        }
        if let Some(version) = &self.toolchain_version {
            request.version = version.clone();
        }

        if self.without_debugger {
            request.features.debugger = false;
        }
        if self.with_gdbserver {
            request.features.remote_debugger = true;
        }
        if self.without_libc {
            request.features.libc = false;
        }
        if self.with_scripts {
            request.features.scripting_support = true;
        }
        if self.multilib {
            request.features.multilib = true;
        }
        if self.nls {
            request.features.nls = true;
        }

        if self.home.is_some() {
            request.home = self.home.clone();
        }
        if self.prefix.is_some() {
            request.prefix_dir = self.prefix.clone();
        }
        if self.jobs.is_some() {
            request.jobs = self.jobs;
        }
        if self.compress.is_some() {
            request.compress_level = self.compress;
        }

        if let Some(path) = &self.export {
            request.save(path)?;
        }

        Ok(request)
    }
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Force a stage (or environment/stage) to rebuild; repeatable
    #[arg(long = "force", value_name = "STAGE")]
    pub force: Vec<String>,

    /// Rebuild everything, ignoring completion markers
    #[arg(long)]
    pub force_all: bool,

    /// Echo external commands without executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable build events (json)
    #[arg(long, value_name = "FMT")]
    pub message_format: Option<String>,
}

impl BuildArgs {
    pub fn to_request(&self) -> Result<BuildRequest> {
        let mut request = self.request.to_request()?;
        request.force = ForceRebuild {
            stages: self.force.iter().cloned().collect(),
            all: self.force_all,
        };
        Ok(request)
    }
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
