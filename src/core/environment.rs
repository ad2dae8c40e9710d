//! Environments - one toolchain build instance each.
//!
//! An environment owns an install prefix, knows where its components land,
//! and declares which artifacts it borrows from sibling environments. The
//! prefix is unique per environment and only ever written by the
//! environment's own stages or by borrow edges pointing into it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::errors::ComponentNotFoundError;
use crate::core::request::ResolvedRequest;
use crate::core::triple::{RoleCategory, TripleSpec};
use crate::util::Config;

/// Identifier of an environment: its derived prefix name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct an id from a raw name, for lookups and tests.
    pub fn from_name(name: impl Into<String>) -> Self {
        EnvironmentId(name.into())
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A declared read-only artifact dependency on a sibling environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowEdge {
    /// Environment the artifact is read from.
    pub source: EnvironmentId,

    /// Path below the source environment's prefix.
    pub source_rel: PathBuf,

    /// Path below the borrowing environment's prefix.
    pub dest_rel: PathBuf,
}

/// Derive the canonical prefix name of an environment.
///
/// Pure and deterministic: identical inputs always produce the identical
/// name. Only the major version participates, so point releases share a
/// prefix.
pub fn derive_prefix_name(
    role: RoleCategory,
    _build: &TripleSpec,
    host: &TripleSpec,
    target: &TripleSpec,
    version: &Version,
) -> String {
    match role {
        RoleCategory::Native => format!("{}-native-gcc{}", host, version.major),
        _ => format!("{}-host-{}-target-gcc{}", host, target, version.major),
    }
}

/// Runtime library directory name for a word size.
fn runtime_lib_name(word_size: u32) -> &'static str {
    if word_size == 32 {
        "lib32"
    } else {
        "lib64"
    }
}

/// One toolchain build instance.
#[derive(Debug, Clone)]
pub struct Environment {
    id: EnvironmentId,
    role: RoleCategory,
    build: TripleSpec,
    host: TripleSpec,
    target: TripleSpec,
    version: Version,
    prefix: PathBuf,
    components: BTreeMap<String, PathBuf>,
    borrows: Vec<BorrowEdge>,
}

impl Environment {
    /// Create an environment under `prefix_dir`.
    pub fn new(
        role: RoleCategory,
        build: TripleSpec,
        host: TripleSpec,
        target: TripleSpec,
        version: Version,
        prefix_dir: &Path,
    ) -> Self {
        let id = EnvironmentId(derive_prefix_name(role, &build, &host, &target, &version));
        let prefix = prefix_dir.join(id.as_str());
        Environment {
            id,
            role,
            build,
            host,
            target,
            version,
            prefix,
            components: BTreeMap::new(),
            borrows: Vec::new(),
        }
    }

    pub fn id(&self) -> &EnvironmentId {
        &self.id
    }

    pub fn role(&self) -> RoleCategory {
        self.role
    }

    pub fn build(&self) -> &TripleSpec {
        &self.build
    }

    pub fn host(&self) -> &TripleSpec {
        &self.host
    }

    pub fn target(&self) -> &TripleSpec {
        &self.target
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The install prefix. Unique per environment; never shared.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn share_dir(&self) -> PathBuf {
        self.prefix.join("share")
    }

    /// Installed location of the debugger init file.
    pub fn gdbinit_path(&self) -> PathBuf {
        self.share_dir().join(".gdbinit")
    }

    /// Pretty-printer script directory installed with the compiler.
    pub fn pretty_printer_rel(&self) -> PathBuf {
        PathBuf::from("share").join(format!("gcc-{}", self.version.major))
    }

    /// Prefix of the target library tree.
    ///
    /// Canadian variants keep target libraries at the top of the prefix,
    /// everything else nests them under the target triple.
    pub fn lib_prefix(&self) -> PathBuf {
        match self.role {
            RoleCategory::CanadianCross => self.prefix.clone(),
            _ => self.prefix.join(self.target.to_string()),
        }
    }

    /// Host runtime libraries the installed tools link against, selected by
    /// host word size.
    pub fn runtime_lib_rel(&self) -> PathBuf {
        PathBuf::from(runtime_lib_name(self.host.word_size()))
    }

    pub fn runtime_lib_dir(&self) -> PathBuf {
        self.prefix.join(self.runtime_lib_rel())
    }

    /// Link option pinning the run path to the prefix-relative runtime dir.
    pub fn rpath_option(&self) -> String {
        format!(
            "-Wl,-rpath='$ORIGIN'/../{}",
            runtime_lib_name(self.host.word_size())
        )
    }

    /// Prefix prepended to installed tool names, e.g. `aarch64-linux-gnu-`.
    pub fn tool_prefix(&self) -> String {
        match self.role {
            RoleCategory::Native => String::new(),
            _ => format!("{}-", self.target),
        }
    }

    /// Executable suffix on the host platform.
    pub fn exe_suffix(&self) -> &'static str {
        if self.host.is_windows_host() {
            ".exe"
        } else {
            ""
        }
    }

    /// Deterministic location of the packaged prefix archive: a pure
    /// function of the prefix tree location and the canonical name.
    pub fn archive_path(&self) -> PathBuf {
        let dir = self.prefix.parent().unwrap_or(&self.prefix);
        dir.join(format!("{}.tar.zst", self.id))
    }

    /// Register a locally built component's install path.
    pub fn register_component(&mut self, name: impl Into<String>, path: PathBuf) {
        self.components.insert(name.into(), path);
    }

    /// Look up a locally registered component.
    pub fn local_component(&self, name: &str) -> Option<&Path> {
        self.components.get(name).map(PathBuf::as_path)
    }

    /// Declare a borrow from a sibling environment.
    pub fn add_borrow(&mut self, edge: BorrowEdge) {
        self.borrows.push(edge);
    }

    /// Declared borrow edges, in declaration order.
    pub fn borrows(&self) -> &[BorrowEdge] {
        &self.borrows
    }
}

/// The environments one build request gives rise to: the requested one plus
/// the siblings it borrows from.
#[derive(Debug, Clone)]
pub struct EnvironmentSet {
    primary: EnvironmentId,
    envs: BTreeMap<EnvironmentId, Environment>,
}

impl EnvironmentSet {
    /// Construct the environment set for a resolved request.
    pub fn for_request(req: &ResolvedRequest, config: &Config) -> EnvironmentSet {
        let prefix_dir = &config.prefix_dir;
        let mut primary = Environment::new(
            req.role,
            req.build.clone(),
            req.host.clone(),
            req.target.clone(),
            req.version.clone(),
            prefix_dir,
        );
        let mut siblings: Vec<Environment> = Vec::new();

        match req.role {
            RoleCategory::Native | RoleCategory::Cross => {}

            RoleCategory::FreestandingCross if !req.features.libc => {
                // Headerless mode: the hosted runtime and the pretty-printer
                // scripts come from the native toolchain of the build machine.
                let mut native = Environment::new(
                    RoleCategory::Native,
                    req.build.clone(),
                    req.build.clone(),
                    req.build.clone(),
                    req.version.clone(),
                    prefix_dir,
                );
                native.register_component("support-scripts", native.share_dir());

                let runtime = native.runtime_lib_rel();
                for lib in ["libstdc++.so.6", "libstdc++.so.6.debug"] {
                    primary.add_borrow(BorrowEdge {
                        source: native.id().clone(),
                        source_rel: runtime.join(lib),
                        dest_rel: primary.runtime_lib_rel().join(lib),
                    });
                }
                if req.features.scripting_support {
                    primary.add_borrow(BorrowEdge {
                        source: native.id().clone(),
                        source_rel: native.pretty_printer_rel(),
                        dest_rel: primary.pretty_printer_rel(),
                    });
                }
                siblings.push(native);
            }

            RoleCategory::FreestandingCross => {}

            RoleCategory::CanadianCross => {
                // Target libraries and the remote debug server come from the
                // build->target cross toolchain; the host runtime the
                // installed tools link against comes from the build->host one.
                let cross_target = Environment::new(
                    RoleCategory::Cross,
                    req.build.clone(),
                    req.build.clone(),
                    req.target.clone(),
                    req.version.clone(),
                    prefix_dir,
                );
                let cross_host = Environment::new(
                    RoleCategory::Cross,
                    req.build.clone(),
                    req.build.clone(),
                    req.host.clone(),
                    req.version.clone(),
                    prefix_dir,
                );

                primary.add_borrow(BorrowEdge {
                    source: cross_target.id().clone(),
                    source_rel: PathBuf::from(req.target.to_string()),
                    dest_rel: PathBuf::from(req.target.to_string()),
                });
                primary.add_borrow(BorrowEdge {
                    source: cross_target.id().clone(),
                    source_rel: PathBuf::from("lib/gcc"),
                    dest_rel: PathBuf::from("lib/gcc"),
                });
                if req.features.remote_debugger {
                    let gdbserver = format!(
                        "gdbserver{}",
                        if req.target.is_windows_host() { ".exe" } else { "" }
                    );
                    primary.add_borrow(BorrowEdge {
                        source: cross_target.id().clone(),
                        source_rel: PathBuf::from("bin").join(&gdbserver),
                        dest_rel: PathBuf::from("bin").join(&gdbserver),
                    });
                }

                if req.host.is_windows_host() {
                    for dll in ["libstdc++-6.dll", "libgcc_s_seh-1.dll"] {
                        primary.add_borrow(BorrowEdge {
                            source: cross_host.id().clone(),
                            source_rel: PathBuf::from(req.host.to_string())
                                .join("lib")
                                .join(dll),
                            dest_rel: PathBuf::from("bin").join(dll),
                        });
                    }
                } else {
                    // The tools installed by this variant run on `host`, so
                    // their runtime comes from the cross sibling's target
                    // library tree.
                    for lib in ["libstdc++.so.6", "libgcc_s.so.1"] {
                        primary.add_borrow(BorrowEdge {
                            source: cross_host.id().clone(),
                            source_rel: PathBuf::from(req.host.to_string())
                                .join("lib")
                                .join(lib),
                            dest_rel: primary.runtime_lib_rel().join(lib),
                        });
                    }
                }

                if req.features.debugger {
                    for dep in ["gmp", "mpfr", "icu", "iconv"] {
                        primary.register_component(dep, config.home.join(dep).join("install"));
                    }
                    if req.host.is_windows_host() {
                        primary
                            .register_component("python-embed", config.home.join("python-embed"));
                    }
                }

                siblings.push(cross_target);
                siblings.push(cross_host);
            }
        }

        let primary_id = primary.id().clone();
        let mut envs = BTreeMap::new();
        envs.insert(primary_id.clone(), primary);
        for sibling in siblings {
            envs.insert(sibling.id().clone(), sibling);
        }

        EnvironmentSet {
            primary: primary_id,
            envs,
        }
    }

    /// The requested environment.
    pub fn primary(&self) -> &Environment {
        &self.envs[&self.primary]
    }

    pub fn primary_id(&self) -> &EnvironmentId {
        &self.primary
    }

    pub fn get(&self, id: &EnvironmentId) -> Option<&Environment> {
        self.envs.get(id)
    }

    /// All environments, primary first, siblings in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        std::iter::once(self.primary()).chain(
            self.envs
                .values()
                .filter(move |e| *e.id() != self.primary),
        )
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    /// Resolve a component install path for an environment.
    ///
    /// A local registration wins; otherwise the path may be inherited from a
    /// sibling the environment borrows from, in borrow declaration order.
    pub fn resolve_component_path(
        &self,
        env: &EnvironmentId,
        name: &str,
    ) -> Result<PathBuf, ComponentNotFoundError> {
        let environment = self.envs.get(env).ok_or_else(|| ComponentNotFoundError {
            component: name.to_string(),
            environment: env.to_string(),
        })?;

        if let Some(path) = environment.local_component(name) {
            return Ok(path.to_path_buf());
        }

        for edge in environment.borrows() {
            if let Some(sibling) = self.envs.get(&edge.source) {
                if let Some(path) = sibling.local_component(name) {
                    return Ok(path.to_path_buf());
                }
            }
        }

        Err(ComponentNotFoundError {
            component: name.to_string(),
            environment: env.to_string(),
        })
    }
}
