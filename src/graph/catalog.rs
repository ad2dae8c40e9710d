//! The stage template catalog.
//!
//! A fixed list of stage templates, each guarded by a precondition over the
//! environment's role category and the requested feature set. Instantiation
//! order follows catalog declaration order, which is also the deterministic
//! tie-break of the topological sort: identical requests always yield the
//! identical stage sequence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::environment::{Environment, EnvironmentSet};
use crate::core::errors::DependencyError;
use crate::core::request::FeatureSet;
use crate::core::triple::RoleCategory;
use crate::graph::stage::{CommandSpec, CompletionMarker, EnvOverlay, Stage, StageId, StageKind};
use crate::sources::{resolve_source, SourceProvider};

/// Catalog positions of the templates; declaration order is the topological
/// tie-break.
pub mod order {
    pub const DEP_GMP: usize = 0;
    pub const DEP_MPFR: usize = 1;
    pub const DEP_ICU: usize = 2;
    pub const DEP_ICONV: usize = 3;
    pub const BINUTILS: usize = 4;
    pub const BOOTSTRAP: usize = 5;
    pub const HEADERS: usize = 6;
    pub const RUNTIME_LIBGCC: usize = 7;
    pub const LIBC: usize = 8;
    pub const COMPILER: usize = 9;
    pub const DEBUGGER: usize = 10;
    pub const BORROW: usize = 11;
    pub const DEBUG_SYMBOLS: usize = 12;
    pub const SUPPORT_SCRIPTS: usize = 13;
    pub const PACKAGE: usize = 14;
}

/// The debugger side dependencies of a Canadian-cross variant, in catalog
/// order. Mutually independent static installs.
pub const DEBUGGER_SIDE_DEPS: [&str; 4] = ["gmp", "mpfr", "icu", "iconv"];

/// Shared runtime artifacts whose debug symbols are split out after a full
/// compiler build.
const RUNTIME_ARTIFACTS: [&str; 2] = ["libstdc++.so.6", "libgcc_s.so.1"];

/// Instantiates stage templates for one environment.
pub struct Catalog<'a> {
    set: &'a EnvironmentSet,
    sources: &'a dyn SourceProvider,
    jobs: usize,
}

impl<'a> Catalog<'a> {
    pub fn new(set: &'a EnvironmentSet, sources: &'a dyn SourceProvider, jobs: usize) -> Self {
        Catalog { set, sources, jobs }
    }

    /// All command stages of one environment for a feature set.
    ///
    /// Borrow and package stages are inserted by the graph builder; this
    /// produces only the templates whose precondition holds.
    pub fn stages_for(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Vec<Stage>, DependencyError> {
        match env.role() {
            RoleCategory::Native => self.native_stages(env, features),
            RoleCategory::Cross => self.cross_stages(env, features),
            RoleCategory::FreestandingCross => self.freestanding_stages(env, features),
            RoleCategory::CanadianCross => self.canadian_stages(env, features),
        }
    }

    // --- per-role template selection ---------------------------------------

    /// Native: the system provides headers and a C library, so the chain is
    /// binary utilities (with the debugger folded in), the full compiler,
    /// debug-symbol extraction, and support scripts.
    fn native_stages(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Vec<Stage>, DependencyError> {
        let mut stages = vec![self.binutils(env, features)?];

        let compiler = self
            .full_compiler(env, features, &[])?
            .predecessor(self.sid(env, "binutils"));
        stages.push(compiler);

        stages.extend(self.debug_symbol_stages(env, env.runtime_lib_dir()));

        if features.scripting_support {
            stages.push(self.support_scripts(env)?);
        }

        Ok(stages)
    }

    /// Cross: the full bootstrap chain of a hosted target.
    fn cross_stages(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Vec<Stage>, DependencyError> {
        let mut stages = vec![self.binutils(env, features)?];

        stages.push(
            self.bootstrap_compiler(env, features)?
                .predecessor(self.sid(env, "binutils")),
        );

        stages.push(
            self.headers(env)?
                .predecessor(self.sid(env, "compiler-bootstrap")),
        );

        let libc_pred = if env.target().os() == "linux" {
            stages.push(
                self.runtime_libgcc(env)?
                    .predecessor(self.sid(env, "headers")),
            );
            "runtime-libgcc"
        } else {
            "headers"
        };

        stages.push(self.libc(env)?.predecessor(self.sid(env, libc_pred)));

        stages.push(
            self.full_compiler(env, features, &[])?
                .predecessor(self.sid(env, "libc")),
        );

        if env.target().os() == "linux" {
            stages.extend(self.debug_symbol_stages(env, env.lib_prefix().join("lib")));
        }

        if features.scripting_support {
            stages.push(self.support_scripts(env)?);
        }

        Ok(stages)
    }

    /// Freestanding: no kernel headers, no hosted C library. With the libc
    /// feature the target gets a bare-metal C library; without it the
    /// runtime is borrowed from a native sibling.
    fn freestanding_stages(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Vec<Stage>, DependencyError> {
        let mut stages = vec![self.binutils(env, features)?];

        if features.libc {
            stages.push(
                self.bootstrap_compiler(env, features)?
                    .predecessor(self.sid(env, "binutils")),
            );
            stages.push(
                self.libc(env)?
                    .predecessor(self.sid(env, "compiler-bootstrap")),
            );
            stages.push(
                self.full_compiler(env, features, &[])?
                    .predecessor(self.sid(env, "libc")),
            );
        } else {
            stages.push(
                self.full_compiler(env, features, &[])?
                    .predecessor(self.sid(env, "binutils")),
            );
        }

        Ok(stages)
    }

    /// Canadian-cross: binary utilities and a partial compiler, with the
    /// debugger built standalone against its four side dependencies and the
    /// target libraries borrowed from the build->target cross sibling.
    fn canadian_stages(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Vec<Stage>, DependencyError> {
        let mut stages = Vec::new();

        if features.debugger {
            for (index, dep) in DEBUGGER_SIDE_DEPS.into_iter().enumerate() {
                stages.push(self.side_dep(env, dep, order::DEP_GMP + index)?);
            }
        }

        stages.push(self.binutils(env, features)?);

        stages.push(
            self.partial_compiler(env, features)?
                .predecessor(self.sid(env, "binutils")),
        );

        if features.debugger {
            let mut debugger = self.debugger(env, features)?;
            for dep in DEBUGGER_SIDE_DEPS {
                debugger = debugger.predecessor(self.sid(env, format!("dep-{dep}")));
            }
            stages.push(debugger);
        }

        Ok(stages)
    }

    // --- stage constructors ------------------------------------------------

    /// Binary-utilities build. For native and plain cross variants the
    /// debugger is configured in the same tree.
    fn binutils(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, "binutils", None)?;
        let fold_debugger =
            features.debugger && !matches!(env.role(), RoleCategory::CanadianCross);

        let mut options = self.basic_options(env, features);
        if fold_debugger {
            options.extend(self.gdb_options(env, features)?);
        } else {
            options.push("--disable-gdb".into());
            options.push("--disable-gdbserver".into());
        }

        let tp = env.tool_prefix();
        let exe = env.exe_suffix();
        let mut outputs: Vec<PathBuf> = ["ld", "as", "ar", "nm", "objcopy", "objdump", "ranlib", "strip"]
            .iter()
            .map(|tool| env.bin_dir().join(format!("{tp}{tool}{exe}")))
            .collect();
        if fold_debugger {
            outputs.push(env.bin_dir().join(format!("{tp}gdb{exe}")));
            outputs.push(env.share_dir().join("gdb"));
        }
        if fold_debugger && features.remote_debugger {
            outputs.push(env.bin_dir().join(format!("gdbserver{exe}")));
        }

        let marker = env.bin_dir().join(format!("{tp}ld{exe}"));

        let mut stage = Stage::new(
            self.sid(env, "binutils"),
            StageKind::Commands,
            order::BINUTILS,
        )
        .build_dir(self.build_dir(&source, env, ""))
        .command(configure(&source, options))
        .command(self.make(&[]))
        .command(self.make(&["install-strip"]))
        .overlay(self.sibling_path_overlay(env))
        .marker(CompletionMarker::ArtifactExists(marker));
        for output in outputs {
            stage = stage.output(output);
        }
        Ok(stage)
    }

    /// Staged compiler build: driver and code generators only.
    fn bootstrap_compiler(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, "gcc", None)?;
        let mut options = self.basic_options(env, features);
        options.extend(self.gcc_options(env, features));
        options.push("--disable-shared".into());

        // Windows targets fold the bootstrap runtime into this stage.
        let (make_targets, install_targets): (&[&str], &[&str]) =
            if env.target().os() == "w64" {
                (
                    &["all-gcc", "all-target-libgcc"],
                    &["install-strip-gcc", "install-target-libgcc"],
                )
            } else {
                (&["all-gcc"], &["install-strip-gcc"])
            };

        let tp = env.tool_prefix();
        let exe = env.exe_suffix();
        let mut stage = Stage::new(
            self.sid(env, "compiler-bootstrap"),
            StageKind::Commands,
            order::BOOTSTRAP,
        )
        .build_dir(self.build_dir(&source, env, "-stage1"))
        .command(configure(&source, options))
        .command(self.make(make_targets))
        .command(self.make(install_targets))
        .overlay(self.sibling_path_overlay(env))
        .marker(CompletionMarker::ArtifactExists(
            env.bin_dir().join(format!("{tp}gcc{exe}")),
        ))
        .output(env.bin_dir().join(format!("{tp}gcc{exe}")));
        if env.target().os() == "w64" {
            stage = stage.output(env.prefix().join("lib/gcc"));
        }
        Ok(stage)
    }

    /// Kernel and C-library header install for a hosted target.
    fn headers(&self, env: &Environment) -> Result<Stage, DependencyError> {
        let vendor = env.target().explicit_vendor();
        let lib_prefix = env.lib_prefix();

        let stage = match env.target().os() {
            "w64" => {
                let source = resolve_source(self.sources, "mingw", None)?;
                let mut options = self.libc_options(env);
                options.push("--without-crt".into());

                Stage::new(self.sid(env, "headers"), StageKind::Commands, order::HEADERS)
                    .build_dir(self.build_dir(&source, env, "-headers"))
                    .command(configure(&source, options))
                    .command(self.make(&[]))
                    .command(self.make(&["install"]))
                    .marker(CompletionMarker::ArtifactExists(
                        lib_prefix.join("include/_mingw.h"),
                    ))
                    .output(lib_prefix.join("include"))
            }
            _ => {
                let kernel = resolve_source(self.sources, "linux", vendor)?;
                let libc = resolve_source(self.sources, "glibc", vendor)?;
                let build_dir = self.build_dir(&libc, env, "-headers");
                let kernel_obj = self.build_dir(&kernel, env, "");

                let mut libc_options = self.libc_options(env);
                libc_options.push("libc_cv_forced_unwind=yes".into());

                let mut overlay = EnvOverlay::default();
                overlay.vars.insert("LD_LIBRARY_PATH".into(), String::new());

                // The stub header lets the bootstrap runtime compile before
                // the C library exists.
                let stubs = lib_prefix.join("include/gnu/stubs.h");

                Stage::new(self.sid(env, "headers"), StageKind::Commands, order::HEADERS)
                    .build_dir(build_dir)
                    .command(CommandSpec::new(
                        "mkdir",
                        ["-p".to_string(), kernel_obj.display().to_string()],
                    ))
                    .command(CommandSpec::new(
                        "make",
                        [
                            "-C".to_string(),
                            kernel.display().to_string(),
                            format!("O={}", kernel_obj.display()),
                            format!("ARCH={}", kernel_arch(env.target().arch())),
                            format!("INSTALL_HDR_PATH={}", lib_prefix.display()),
                            format!("-j{}", self.jobs),
                            "headers_install".to_string(),
                        ],
                    ))
                    .command(configure(&libc, libc_options))
                    .command(self.make(&["install-headers"]))
                    .command(CommandSpec::new(
                        "touch",
                        [stubs.display().to_string()],
                    ))
                    .overlay(overlay)
                    .marker(CompletionMarker::AllExist(vec![
                        lib_prefix.join("include/linux/version.h"),
                        stubs,
                    ]))
                    .output(lib_prefix.join("include"))
            }
        };
        Ok(stage)
    }

    /// Bootstrap runtime build, re-entering the staged compiler tree.
    fn runtime_libgcc(&self, env: &Environment) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, "gcc", None)?;
        let marker = env
            .prefix()
            .join("lib/gcc")
            .join(env.target().to_string())
            .join(env.version().major.to_string())
            .join("libgcc.a");

        Ok(Stage::new(
            self.sid(env, "runtime-libgcc"),
            StageKind::Commands,
            order::RUNTIME_LIBGCC,
        )
        .build_dir(self.build_dir(&source, env, "-stage1"))
        .command(self.make(&["all-target-libgcc"]))
        .command(self.make(&["install-target-libgcc"]))
        .marker(CompletionMarker::ArtifactExists(marker))
        .output(env.prefix().join("lib/gcc")))
    }

    /// Full C-library build of a hosted or bare-metal target.
    fn libc(&self, env: &Environment) -> Result<Stage, DependencyError> {
        let vendor = env.target().explicit_vendor();
        let lib_prefix = env.lib_prefix();

        let (component, marker): (&str, PathBuf) = match env.target().os() {
            "linux" => ("glibc", lib_prefix.join("lib/libc.so.6")),
            "w64" => ("mingw", lib_prefix.join("lib/libmingw32.a")),
            _ => ("newlib", lib_prefix.join("lib/libc.a")),
        };
        let source = resolve_source(self.sources, component, vendor)?;

        let mut overlay = EnvOverlay::default();
        // Some C-library configure scripts refuse to run with a populated
        // library path pointing at the half-built prefix.
        overlay.vars.insert("LD_LIBRARY_PATH".into(), String::new());

        Ok(Stage::new(self.sid(env, "libc"), StageKind::Commands, order::LIBC)
            .build_dir(self.build_dir(&source, env, ""))
            .command(configure(&source, self.libc_options(env)))
            .command(self.make(&[]))
            .command(self.make(&["install"]))
            .overlay(overlay)
            .marker(CompletionMarker::ArtifactExists(marker))
            .output(lib_prefix.join("lib"))
            .output(lib_prefix.join("include")))
    }

    /// Full compiler build.
    fn full_compiler(
        &self,
        env: &Environment,
        features: &FeatureSet,
        extra_options: &[&str],
    ) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, "gcc", None)?;
        let mut options = self.basic_options(env, features);
        options.extend(self.gcc_options(env, features));
        options.extend(extra_options.iter().map(|s| s.to_string()));

        let lib_prefix = env.lib_prefix();
        let marker = match env.target().os() {
            "linux" => lib_prefix.join("lib/libstdc++.so.6"),
            "w64" => lib_prefix.join("lib/libstdc++.dll.a"),
            _ => lib_prefix.join("lib/libstdc++.a"),
        };

        let tp = env.tool_prefix();
        let exe = env.exe_suffix();
        let mut stage = Stage::new(
            self.sid(env, "compiler"),
            StageKind::Commands,
            order::COMPILER,
        )
        .build_dir(self.build_dir(&source, env, ""))
        .command(configure(&source, options))
        .command(self.make(&[]))
        .command(self.make(&["install-strip"]))
        .overlay(self.sibling_path_overlay(env))
        .marker(CompletionMarker::ArtifactExists(marker))
        .output(env.prefix().join("lib/gcc"))
        .output(lib_prefix.join("lib"))
        .output(env.share_dir());
        for tool in ["gcc", "g++", "cpp"] {
            stage = stage.output(env.bin_dir().join(format!("{tp}{tool}{exe}")));
        }
        if env.role() == RoleCategory::Native {
            stage = stage.output(env.runtime_lib_dir());
        }
        Ok(stage)
    }

    /// Partial compiler of a Canadian-cross variant: driver and code
    /// generators only; target libraries arrive over borrow edges.
    fn partial_compiler(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, "gcc", None)?;
        let mut options = self.basic_options(env, features);
        options.extend(self.gcc_options(env, features));

        let tp = env.tool_prefix();
        let exe = env.exe_suffix();
        let mut stage = Stage::new(
            self.sid(env, "compiler"),
            StageKind::Commands,
            order::COMPILER,
        )
        .build_dir(self.build_dir(&source, env, ""))
        .command(configure(&source, options))
        .command(self.make(&["all-gcc"]))
        .command(self.make(&["install-strip-gcc"]))
        .overlay(self.sibling_path_overlay(env))
        .marker(CompletionMarker::ArtifactExists(
            env.bin_dir().join(format!("{tp}gcc{exe}")),
        ))
        .output(env.prefix().join("lib/gcc"));
        for tool in ["gcc", "g++", "cpp"] {
            stage = stage.output(env.bin_dir().join(format!("{tp}{tool}{exe}")));
        }
        Ok(stage)
    }

    /// Standalone debugger build of a Canadian-cross variant.
    fn debugger(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, "binutils", None)?;

        let mut options = self.basic_options(env, features);
        options.extend(self.gdb_options(env, features)?);
        options.push("--disable-binutils".into());

        for dep in DEBUGGER_SIDE_DEPS {
            let install = self
                .set
                .resolve_component_path(env.id(), dep)
                .map_err(DependencyError::from)?;
            let flag = match dep {
                "gmp" => format!("--with-gmp={}", install.display()),
                "mpfr" => format!("--with-mpfr={}", install.display()),
                "icu" => format!("--with-libicu-prefix={}", install.display()),
                _ => format!("--with-libiconv-prefix={}", install.display()),
            };
            options.push(flag);
        }

        let mut overlay = self.sibling_path_overlay(env);
        if env.host().is_windows_host() {
            overlay.vars.insert("ORIGIN".into(), "$$ORIGIN".into());
            let embed = self
                .set
                .resolve_component_path(env.id(), "python-embed")
                .map_err(DependencyError::from)?;
            overlay
                .vars
                .insert("PYTHON_EMBED_PACKAGE".into(), embed.display().to_string());
        }

        let tp = env.tool_prefix();
        let exe = env.exe_suffix();
        Ok(Stage::new(
            self.sid(env, "debugger"),
            StageKind::Commands,
            order::DEBUGGER,
        )
        .build_dir(self.build_dir(&source, env, "-gdb"))
        .command(configure(&source, options))
        .command(self.make(&[]))
        .command(self.make(&["install-strip"]))
        .overlay(overlay)
        .marker(CompletionMarker::ArtifactExists(
            env.bin_dir().join(format!("{tp}gdb{exe}")),
        ))
        .output(env.bin_dir().join(format!("{tp}gdb{exe}")))
        .output(env.share_dir().join("gdb")))
    }

    /// One debugger side dependency: a static install shared across variants
    /// with the same host, stamped with the host triple.
    fn side_dep(
        &self,
        env: &Environment,
        dep: &str,
        catalog_index: usize,
    ) -> Result<Stage, DependencyError> {
        let source = resolve_source(self.sources, dep, None)?;
        let install = self
            .set
            .resolve_component_path(env.id(), dep)
            .map_err(DependencyError::from)?;
        let stamp = install.join(".host");
        let host = env.host().to_string();

        let options = vec![
            format!("--host={host}"),
            "--disable-shared".into(),
            "--enable-static".into(),
            format!("--prefix={}", install.display()),
            "CFLAGS=-O3".into(),
            "CXXFLAGS=-O3".into(),
        ];

        Ok(Stage::new(
            self.sid(env, format!("dep-{dep}")),
            StageKind::Commands,
            catalog_index,
        )
        .build_dir(self.build_dir(&source, env, ""))
        .command(configure(&source, options))
        .command(self.make(&[]))
        .command(self.make(&["install"]))
        .command(CommandSpec::new(
            "sh",
            [
                "-c".to_string(),
                format!("printf '%s' '{host}' > {}", stamp.display()),
            ],
        ))
        .overlay(self.sibling_path_overlay(env))
        .marker(CompletionMarker::StampEquals {
            path: stamp,
            expected: host,
        })
        .output(install))
    }

    /// Split debug symbols out of shared runtime artifacts. Best-effort: a
    /// library without symbols does not block packaging.
    fn debug_symbol_stages(&self, env: &Environment, lib_dir: PathBuf) -> Vec<Stage> {
        let objcopy = format!("{}objcopy", env.tool_prefix());
        RUNTIME_ARTIFACTS
            .into_iter()
            .map(|artifact| {
                let lib = lib_dir.join(artifact);
                let debug = lib_dir.join(format!("{artifact}.debug"));
                Stage::new(
                    self.sid(env, format!("debug-symbols-{artifact}")),
                    StageKind::Commands,
                    order::DEBUG_SYMBOLS,
                )
                .predecessor(self.sid(env, "compiler"))
                .build_dir(lib_dir.clone())
                .command(CommandSpec::new(
                    objcopy.clone(),
                    [
                        "--only-keep-debug".to_string(),
                        lib.display().to_string(),
                        debug.display().to_string(),
                    ],
                ))
                .command(CommandSpec::new(
                    objcopy.clone(),
                    ["--strip-debug".to_string(), lib.display().to_string()],
                ))
                .command(CommandSpec::new(
                    objcopy.clone(),
                    [
                        format!("--add-gnu-debuglink={}", debug.display()),
                        lib.display().to_string(),
                    ],
                ))
                .marker(CompletionMarker::ArtifactExists(debug.clone()))
                .output(lib)
                .output(debug)
                .best_effort(true)
            })
            .collect()
    }

    /// Install the debugger init file; native variants also get a `cc`
    /// alias for the system compiler slot.
    fn support_scripts(&self, env: &Environment) -> Result<Stage, DependencyError> {
        let scripts = resolve_source(self.sources, "scripts", None)?;
        let gdbinit = env.gdbinit_path();

        let mut stage = Stage::new(
            self.sid(env, "support-scripts"),
            StageKind::Commands,
            order::SUPPORT_SCRIPTS,
        )
        .predecessor(self.sid(env, "compiler"))
        .build_dir(env.prefix().to_path_buf())
        .command(CommandSpec::new(
            "cp",
            [
                scripts.join(".gdbinit").display().to_string(),
                gdbinit.display().to_string(),
            ],
        ))
        .marker(CompletionMarker::ArtifactExists(gdbinit.clone()))
        .output(gdbinit);

        if env.role() == RoleCategory::Native {
            let cc = env.bin_dir().join("cc");
            stage = stage
                .command(CommandSpec::new(
                    "ln",
                    ["-sf".to_string(), "gcc".to_string(), cc.display().to_string()],
                ))
                .output(cc);
        }
        Ok(stage)
    }

    // --- option tables -----------------------------------------------------

    fn basic_options(&self, env: &Environment, features: &FeatureSet) -> Vec<String> {
        vec![
            "--disable-werror".into(),
            if features.nls {
                "--enable-nls".into()
            } else {
                "--disable-nls".into()
            },
            format!("--build={}", env.build()),
            format!("--host={}", env.host()),
            format!("--target={}", env.target()),
            format!("--prefix={}", env.prefix().display()),
            "CFLAGS=-O3".into(),
            "CXXFLAGS=-O3".into(),
        ]
    }

    fn gcc_options(&self, env: &Environment, features: &FeatureSet) -> Vec<String> {
        let mut options: Vec<String> = match env.target().os() {
            "linux" => vec!["--disable-bootstrap".into()],
            "w64" => vec![
                "--disable-sjlj-exceptions".into(),
                "--enable-threads=win32".into(),
            ],
            _ if features.libc => DISABLE_HOSTED_OPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            _ => DISABLE_HOSTED_OPTIONS_PURE
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        options.push("--enable-languages=c,c++".into());
        options.push(if features.multilib {
            "--enable-multilib".into()
        } else {
            "--disable-multilib".into()
        });
        options
    }

    fn libc_options(&self, env: &Environment) -> Vec<String> {
        let lib_prefix = env.lib_prefix();
        match env.target().os() {
            "linux" => vec![
                format!("--prefix={}", lib_prefix.display()),
                format!("--host={}", env.target()),
                format!("--build={}", env.build()),
                "--disable-werror".into(),
            ],
            "w64" => vec![
                format!("--host={}", env.target()),
                format!("--prefix={}", lib_prefix.display()),
                "--with-default-msvcrt=ucrt".into(),
                "--disable-werror".into(),
            ],
            // The bare-metal C library nests its own install subdirectory.
            _ => vec![
                format!("--prefix={}", env.prefix().display()),
                format!("--target={}", env.target()),
                format!("--build={}", env.build()),
                "--disable-werror".into(),
            ],
        }
    }

    fn gdb_options(
        &self,
        env: &Environment,
        features: &FeatureSet,
    ) -> Result<Vec<String>, DependencyError> {
        let mut options = Vec::new();
        if features.debugger {
            if env.host().is_windows_host() {
                let scripts = resolve_source(self.sources, "scripts", None)?;
                options.push(format!(
                    "--with-python={}",
                    scripts.join("python_config.sh").display()
                ));
                options.push("CXXFLAGS=-O3 -D_WIN32_WINNT=0x0600".into());
            } else {
                options.push(format!("LDFLAGS={}", env.rpath_option()));
                options.push("--with-python=/usr/bin/python3".into());
            }
            options.push(format!(
                "--with-system-gdbinit={}",
                env.gdbinit_path().display()
            ));
            options.push("--enable-gdb".into());
            options.push("--disable-unit-tests".into());
        } else {
            options.push("--disable-gdb".into());
        }

        // The remote server runs on the target, so it is only built where
        // host and target toolchains agree; Canadian variants borrow it.
        let server_here = features.remote_debugger
            && matches!(env.role(), RoleCategory::Native | RoleCategory::Cross);
        options.push(if server_here {
            "--enable-gdbserver".into()
        } else {
            "--disable-gdbserver".into()
        });

        Ok(options)
    }

    // --- helpers -----------------------------------------------------------

    fn sid(&self, env: &Environment, name: impl Into<String>) -> StageId {
        StageId::new(env.id().clone(), name)
    }

    /// Per-environment build directory inside a component source tree.
    fn build_dir(&self, source: &Path, env: &Environment, suffix: &str) -> PathBuf {
        source.join(format!("build-{}{suffix}", env.id()))
    }

    fn make(&self, targets: &[&str]) -> CommandSpec {
        let mut args = vec![format!("-j{}", self.jobs)];
        args.extend(targets.iter().map(|t| t.to_string()));
        CommandSpec::new("make", args)
    }

    /// Sibling toolchain `bin` directories on PATH, so configure scripts
    /// find the cross tools an environment depends on.
    fn sibling_path_overlay(&self, env: &Environment) -> EnvOverlay {
        let mut overlay = EnvOverlay {
            vars: BTreeMap::new(),
            path_prepend: Vec::new(),
        };
        for edge in env.borrows() {
            if let Some(sibling) = self.set.get(&edge.source) {
                let bin = sibling.bin_dir();
                if !overlay.path_prepend.contains(&bin) {
                    overlay.path_prepend.push(bin);
                }
            }
        }
        overlay
    }
}

/// Configure invocation against a source tree, run inside the build dir.
fn configure(source: &Path, options: Vec<String>) -> CommandSpec {
    CommandSpec::new(source.join("configure").display().to_string(), options)
}

/// Features disabled for a bare-metal target with a C library.
const DISABLE_HOSTED_OPTIONS: [&str; 9] = [
    "--disable-threads",
    "--disable-libstdcxx-verbose",
    "--disable-shared",
    "--with-headers",
    "--disable-libsanitizer",
    "--disable-libssp",
    "--disable-libquadmath",
    "--disable-libgomp",
    "--with-newlib",
];

/// Features disabled for a bare-metal target without any C library.
const DISABLE_HOSTED_OPTIONS_PURE: [&str; 10] = [
    "--disable-threads",
    "--disable-hosted-libstdcxx",
    "--disable-libstdcxx-verbose",
    "--disable-shared",
    "--without-headers",
    "--disable-libvtv",
    "--disable-libsanitizer",
    "--disable-libssp",
    "--disable-libquadmath",
    "--disable-libgomp",
];

/// Kernel source tree architecture names.
fn kernel_arch(arch: &str) -> &'static str {
    match arch {
        "i486" | "i686" | "x86_64" => "x86",
        "arm" | "armeb" => "arm",
        "aarch64" => "arm64",
        "riscv32" | "riscv32be" | "riscv64" => "riscv",
        "loongarch64" => "loongarch",
        "mips64el" => "mips",
        _ => "generic",
    }
}
