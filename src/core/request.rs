//! The build request record - the external surface of the core.
//!
//! A request names the triple combination, the feature set, and force-rebuild
//! flags. It can come from CLI flags or a TOML request file; defaulting rules
//! follow the classic configure convention: build is probed from the host
//! compiler, host defaults to build, target defaults to host.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigError;
use crate::core::triple::{classify, RoleCategory, TripleSpec};
use crate::util::process::{find_host_compiler, ProcessBuilder};

/// Requested toolchain features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    /// Build the debugger.
    pub debugger: bool,

    /// Build the remote debug server (hosted targets only).
    pub remote_debugger: bool,

    /// Build a C library. For freestanding targets `false` selects the
    /// headerless mode that borrows its runtime from a native sibling.
    pub libc: bool,

    /// Install debugger init scripts and pretty-printers.
    pub scripting_support: bool,

    /// Build the secondary 32-bit runtime where the target supports it.
    pub multilib: bool,

    /// Enable native-language messages in the built tools.
    pub nls: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        FeatureSet {
            debugger: true,
            remote_debugger: false,
            libc: true,
            scripting_support: false,
            multilib: false,
            nls: false,
        }
    }
}

/// Force-rebuild selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceRebuild {
    /// Stage names (or `environment/stage` forms) to rebuild.
    pub stages: BTreeSet<String>,

    /// Rebuild everything, ignoring completion markers.
    pub all: bool,
}

impl ForceRebuild {
    /// Whether any forcing is requested at all.
    pub fn is_empty(&self) -> bool {
        !self.all && self.stages.is_empty()
    }
}

fn default_version() -> Version {
    Version::new(15, 0, 1)
}

/// One toolchain build request, as supplied by the CLI or a request file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRequest {
    /// Build platform; probed from the host compiler when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    /// Host platform; defaults to build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Target platform; defaults to host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Toolchain variant version; the major participates in prefix naming.
    #[serde(default = "default_version")]
    pub version: Version,

    pub features: FeatureSet,

    pub force: ForceRebuild,

    /// Override the configured source home directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// Override the configured install prefix directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_dir: Option<PathBuf>,

    /// Override the configured job count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Override the configured compression level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_level: Option<i32>,
}

impl Default for BuildRequest {
    fn default() -> Self {
        BuildRequest {
            build: None,
            host: None,
            target: None,
            version: default_version(),
            features: FeatureSet::default(),
            force: ForceRebuild::default(),
            home: None,
            prefix_dir: None,
            jobs: None,
            compress_level: None,
        }
    }
}

impl BuildRequest {
    /// Load a request from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = crate::util::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse request file: {}", path.display()))
    }

    /// Save the request to a TOML file, for later re-import.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to encode request")?;
        crate::util::fs::write_file(path, contents)
    }

    /// Resolve the triple fields and validate the combination.
    ///
    /// All `ConfigError`s of a request surface here, before any environment
    /// is constructed.
    pub fn resolve(&self) -> Result<ResolvedRequest, ConfigError> {
        let build_str = match &self.build {
            Some(b) => b.clone(),
            None => detect_build_triple().ok_or_else(|| ConfigError::UnsupportedFeature {
                reason: "no build triple given and no host compiler found to probe one".into(),
            })?,
        };
        let host_str = self.host.clone().unwrap_or_else(|| build_str.clone());
        let target_str = self.target.clone().unwrap_or_else(|| host_str.clone());

        let build = TripleSpec::parse(&build_str)?;
        let host = TripleSpec::parse(&host_str)?;
        let target = TripleSpec::parse(&target_str)?;
        let role = classify(&build, &host, &target)?;

        let features = self.features.clone();
        if features.remote_debugger && target.is_freestanding() {
            return Err(ConfigError::UnsupportedFeature {
                reason: "a remote debug server cannot run on a bare-metal target; \
                         use an on-chip probe speaking the remote protocol instead"
                    .into(),
            });
        }
        if features.multilib && !target.needs_multilib() {
            return Err(ConfigError::UnsupportedFeature {
                reason: format!("target {} has no secondary runtime ISA", target),
            });
        }

        Ok(ResolvedRequest {
            role,
            build,
            host,
            target,
            version: self.version.clone(),
            features,
            force: self.force.clone(),
        })
    }
}

/// A request with triples parsed and the role combination validated.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub role: RoleCategory,
    pub build: TripleSpec,
    pub host: TripleSpec,
    pub target: TripleSpec,
    pub version: Version,
    pub features: FeatureSet,
    pub force: ForceRebuild,
}

/// Probe the build triple from the host compiler.
pub fn detect_build_triple() -> Option<String> {
    let compiler = find_host_compiler()?;
    let output = ProcessBuilder::new(compiler)
        .arg("-dumpmachine")
        .exec()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let triple = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!triple.is_empty()).then_some(triple)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(build: &str, host: &str, target: &str) -> BuildRequest {
        BuildRequest {
            build: Some(build.to_string()),
            host: Some(host.to_string()),
            target: Some(target.to_string()),
            ..BuildRequest::default()
        }
    }

    #[test]
    fn test_host_and_target_default_chain() {
        let req = BuildRequest {
            build: Some("x86_64-linux-gnu".into()),
            ..BuildRequest::default()
        };
        let resolved = req.resolve().unwrap();
        assert_eq!(resolved.role, RoleCategory::Native);
        assert_eq!(resolved.host.to_string(), "x86_64-linux-gnu");
        assert_eq!(resolved.target.to_string(), "x86_64-linux-gnu");
    }

    #[test]
    fn test_malformed_triple_rejected_before_environments() {
        let req = request("bad", "bad", "bad");
        assert!(matches!(
            req.resolve(),
            Err(ConfigError::FieldCount { .. })
        ));
    }

    #[test]
    fn test_remote_debugger_on_bare_metal_rejected() {
        let mut req = request("x86_64-linux-gnu", "x86_64-linux-gnu", "arm-none-eabi");
        req.features.remote_debugger = true;
        assert!(matches!(
            req.resolve(),
            Err(ConfigError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn test_multilib_needs_capable_target() {
        let mut req = request(
            "x86_64-linux-gnu",
            "x86_64-linux-gnu",
            "aarch64-linux-gnu",
        );
        req.features.multilib = true;
        assert!(req.resolve().is_err());

        let mut req = request(
            "x86_64-linux-gnu",
            "x86_64-linux-gnu",
            "x86_64-linux-gnu",
        );
        req.features.multilib = true;
        assert!(req.resolve().is_ok());
    }

    #[test]
    fn test_request_file_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("request.toml");

        let mut req = request(
            "x86_64-linux-gnu",
            "x86_64-w64-mingw32",
            "aarch64-linux-gnu",
        );
        req.features.remote_debugger = true;
        req.force.stages.insert("compiler".to_string());

        req.save(&path).unwrap();
        let loaded = BuildRequest::load(&path).unwrap();

        assert_eq!(loaded.build, req.build);
        assert_eq!(loaded.features, req.features);
        assert_eq!(loaded.force, req.force);
        assert_eq!(loaded.version, req.version);
    }
}
