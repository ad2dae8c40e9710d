//! Implementation of `crucible plan`: show the deterministic stage sequence
//! a request would execute, without running anything.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::environment::EnvironmentSet;
use crate::core::request::BuildRequest;
use crate::graph::build::StageGraph;
use crate::graph::stage::StageKind;
use crate::sources::DirSourceProvider;
use crate::util::Config;

/// One stage of the printed plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub stage: String,
    pub environment: String,
    pub kind: String,
    pub best_effort: bool,
    pub predecessors: Vec<String>,
    pub commands: Vec<String>,
}

/// Resolve a request and return its stage sequence in execution order.
pub fn stage_plan(request: &BuildRequest) -> Result<Vec<PlanEntry>> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, request);
    config.validate()?;

    let resolved = request.resolve().context("invalid build request")?;
    let set = EnvironmentSet::for_request(&resolved, &config);

    // Planning never schedules, so missing source trees are acceptable.
    let provider = DirSourceProvider::lenient(&config.home);
    let graph = StageGraph::build(&set, &resolved.features, &provider, config.jobs)?;

    Ok(graph
        .iter_ordered()
        .map(|stage| PlanEntry {
            stage: stage.id.name.clone(),
            environment: stage.id.environment.to_string(),
            kind: match stage.kind {
                StageKind::Commands => "commands".to_string(),
                StageKind::Borrow(_) => "borrow".to_string(),
                StageKind::Package => "package".to_string(),
            },
            best_effort: stage.best_effort,
            predecessors: stage.predecessors.iter().map(|p| p.to_string()).collect(),
            commands: stage
                .commands
                .iter()
                .map(|c| c.display_command())
                .collect(),
        })
        .collect())
}

/// Per-request overrides of the persistent configuration.
pub fn apply_overrides(config: &mut Config, request: &BuildRequest) {
    if let Some(home) = &request.home {
        config.home = home.clone();
    }
    if let Some(prefix_dir) = &request.prefix_dir {
        config.prefix_dir = prefix_dir.clone();
    }
    if let Some(jobs) = request.jobs {
        config.jobs = jobs;
    }
    if let Some(level) = request.compress_level {
        config.compress_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str) -> BuildRequest {
        BuildRequest {
            build: Some("x86_64-linux-gnu".into()),
            host: Some("x86_64-linux-gnu".into()),
            target: Some(target.into()),
            home: Some("/srv/sources".into()),
            prefix_dir: Some("/opt/toolchains".into()),
            ..BuildRequest::default()
        }
    }

    #[test]
    fn test_native_plan_sequence() {
        let entries = stage_plan(&request("x86_64-linux-gnu")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.stage.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "binutils",
                "compiler",
                "debug-symbols-libstdc++.so.6",
                "debug-symbols-libgcc_s.so.1",
                "package",
            ]
        );
        assert_eq!(entries.last().unwrap().kind, "package");
    }

    #[test]
    fn test_plan_is_serializable() {
        let entries = stage_plan(&request("aarch64-linux-gnu")).unwrap();
        let json = serde_json::to_string(&entries).unwrap();
        assert!(json.contains("compiler-bootstrap"));
    }

    #[test]
    fn test_overrides_take_effect() {
        let mut config = Config::default();
        apply_overrides(&mut config, &request("x86_64-linux-gnu"));
        assert_eq!(config.home, std::path::PathBuf::from("/srv/sources"));
        assert_eq!(
            config.prefix_dir,
            std::path::PathBuf::from("/opt/toolchains")
        );
    }
}
