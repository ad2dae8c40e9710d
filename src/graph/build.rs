//! Stage graph construction.
//!
//! Builds the minimal dependency-ordered stage set for one build request:
//! the requested environment's stages, the stages of every sibling it
//! borrows from (closed under transitive dependency), and the borrow-copy
//! stages linking them. The graph is validated cycle-free and its execution
//! order is fully deterministic.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::environment::{EnvironmentId, EnvironmentSet};
use crate::core::errors::DependencyError;
use crate::core::request::FeatureSet;
use crate::graph::catalog::{order, Catalog};
use crate::graph::stage::{CompletionMarker, Stage, StageId, StageKind};
use crate::sources::SourceProvider;

/// The directed acyclic graph of stages for one build request.
#[derive(Debug)]
pub struct StageGraph {
    stages: Vec<Stage>,
    graph: DiGraph<usize, ()>,
    nodes: HashMap<StageId, NodeIndex>,
    order: Vec<StageId>,
}

/// Feature set a borrowed sibling is built with: a full hosted build
/// matching the primary's debugger and scripting choices.
fn sibling_features(primary: &FeatureSet) -> FeatureSet {
    FeatureSet {
        debugger: primary.debugger,
        remote_debugger: primary.remote_debugger,
        libc: true,
        scripting_support: primary.scripting_support,
        multilib: false,
        nls: primary.nls,
    }
}

impl StageGraph {
    /// Build and validate the stage graph for a request.
    pub fn build(
        set: &EnvironmentSet,
        features: &FeatureSet,
        sources: &dyn SourceProvider,
        jobs: usize,
    ) -> Result<StageGraph, DependencyError> {
        let catalog = Catalog::new(set, sources, jobs);

        // Close the environment list over borrow edges, primary first.
        let mut env_ids: Vec<EnvironmentId> = Vec::new();
        let mut queue = VecDeque::from([set.primary_id().clone()]);
        let mut seen: HashSet<EnvironmentId> = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let env = set.get(&id).ok_or_else(|| DependencyError::UnknownSibling {
                environment: set.primary_id().to_string(),
                sibling: id.to_string(),
            })?;
            for edge in env.borrows() {
                queue.push_back(edge.source.clone());
            }
            env_ids.push(id);
        }

        // Instantiate command stages per environment.
        let mut stages: Vec<Stage> = Vec::new();
        for id in &env_ids {
            let env = set.get(id).expect("environment closed over above");
            let env_features = if id == set.primary_id() {
                features.clone()
            } else {
                sibling_features(features)
            };
            stages.extend(catalog.stages_for(env, &env_features)?);
        }

        // Insert borrow stages: after every source stage writing the
        // borrowed path, and after local stages writing into the
        // destination path.
        for id in &env_ids {
            let env = set.get(id).expect("environment closed over above");
            for edge in env.borrows() {
                let source_env =
                    set.get(&edge.source)
                        .ok_or_else(|| DependencyError::UnknownSibling {
                            environment: id.to_string(),
                            sibling: edge.source.to_string(),
                        })?;
                let source_abs = source_env.prefix().join(&edge.source_rel);
                let dest_abs = env.prefix().join(&edge.dest_rel);

                let mut predecessors: Vec<StageId> = stages
                    .iter()
                    .filter(|s| s.id.environment == edge.source && overlaps(s, &source_abs))
                    .map(|s| s.id.clone())
                    .collect();
                if predecessors.is_empty() {
                    return Err(DependencyError::UnresolvedBorrow {
                        environment: edge.source.to_string(),
                        path: edge.source_rel.clone(),
                    });
                }
                predecessors.extend(
                    stages
                        .iter()
                        .filter(|s| s.id.environment == *id && overlaps(s, &dest_abs))
                        .map(|s| s.id.clone()),
                );

                let name = format!("borrow-{}", path_slug(&edge.dest_rel));
                let mut stage = Stage::new(
                    StageId::new(id.clone(), name),
                    StageKind::Borrow(edge.clone()),
                    order::BORROW,
                )
                .marker(CompletionMarker::ArtifactExists(dest_abs.clone()))
                .output(dest_abs);
                stage.predecessors = predecessors;
                stages.push(stage);
            }
        }

        // The primary environment is packaged once everything else in it is
        // done.
        {
            let env = set.primary();
            let predecessors: Vec<StageId> = stages
                .iter()
                .filter(|s| s.id.environment == *set.primary_id())
                .map(|s| s.id.clone())
                .collect();
            let archive = env.archive_path();
            let mut stage = Stage::new(
                StageId::new(set.primary_id().clone(), "package"),
                StageKind::Package,
                order::PACKAGE,
            )
            .marker(CompletionMarker::ArtifactExists(archive.clone()))
            .output(archive);
            stage.predecessors = predecessors;
            stages.push(stage);
        }

        Self::assemble(stages)
    }

    /// Wire stages into a graph, order it deterministically, and validate.
    fn assemble(stages: Vec<Stage>) -> Result<StageGraph, DependencyError> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: HashMap<StageId, NodeIndex> = HashMap::new();

        for (index, stage) in stages.iter().enumerate() {
            let node = graph.add_node(index);
            nodes.insert(stage.id.clone(), node);
        }

        for stage in &stages {
            let to = nodes[&stage.id];
            for pred in &stage.predecessors {
                let from = *nodes.get(pred).ok_or_else(|| {
                    DependencyError::UnresolvedPredecessor {
                        stage: stage.id.to_string(),
                        predecessor: pred.to_string(),
                    }
                })?;
                graph.update_edge(from, to, ());
            }
        }

        let order = deterministic_topo_order(&stages, &graph, &nodes)?;

        let result = StageGraph {
            stages,
            graph,
            nodes,
            order,
        };
        result.validate_disjoint_outputs()?;
        Ok(result)
    }

    /// No two stages without an ordering between them may write overlapping
    /// paths.
    fn validate_disjoint_outputs(&self) -> Result<(), DependencyError> {
        for (i, a) in self.stages.iter().enumerate() {
            for b in self.stages.iter().skip(i + 1) {
                let Some(path) = a.outputs.iter().find_map(|out_a| {
                    b.outputs
                        .iter()
                        .find(|out_b| out_a.starts_with(out_b) || out_b.starts_with(out_a))
                        .map(|out_b| {
                            if out_a.starts_with(out_b) {
                                out_a.clone()
                            } else {
                                out_b.to_path_buf()
                            }
                        })
                }) else {
                    continue;
                };

                let na = self.nodes[&a.id];
                let nb = self.nodes[&b.id];
                let ordered = has_path_connecting(&self.graph, na, nb, None)
                    || has_path_connecting(&self.graph, nb, na, None);
                if !ordered {
                    return Err(DependencyError::OverlappingOutputs {
                        first: a.id.to_string(),
                        second: b.id.to_string(),
                        path,
                    });
                }
            }
        }
        Ok(())
    }

    /// Stages in deterministic execution order.
    pub fn order(&self) -> &[StageId] {
        &self.order
    }

    /// Stages in deterministic execution order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Stage> {
        self.order.iter().map(move |id| self.get(id).unwrap())
    }

    pub fn get(&self, id: &StageId) -> Option<&Stage> {
        self.nodes
            .get(id)
            .map(|node| &self.stages[self.graph[*node]])
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every stage reachable from `id` through dependency edges.
    pub fn transitive_dependents(&self, id: &StageId) -> HashSet<StageId> {
        let mut result = HashSet::new();
        let Some(&start) = self.nodes.get(id) else {
            return result;
        };
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors(node) {
                let stage_id = self.stages[self.graph[next]].id.clone();
                if result.insert(stage_id) {
                    queue.push_back(next);
                }
            }
        }
        result
    }
}

/// Kahn's algorithm with a deterministic tie-break: among ready stages, the
/// lowest (catalog position, instantiation position) runs first. Identical
/// requests yield identical sequences, which reproducible resumption relies
/// on.
fn deterministic_topo_order(
    stages: &[Stage],
    graph: &DiGraph<usize, ()>,
    nodes: &HashMap<StageId, NodeIndex>,
) -> Result<Vec<StageId>, DependencyError> {
    let mut indegree: HashMap<NodeIndex, usize> = nodes
        .values()
        .map(|&node| {
            (
                node,
                graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .count(),
            )
        })
        .collect();

    let rank = |node: NodeIndex| {
        let index = graph[node];
        std::cmp::Reverse((stages[index].catalog_index, index))
    };

    let mut ready: BinaryHeap<_> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&node, _)| rank(node))
        .collect();

    let mut order = Vec::with_capacity(stages.len());
    while let Some(std::cmp::Reverse((_, index))) = ready.pop() {
        let id = stages[index].id.clone();
        let node = nodes[&id];
        order.push(id);
        for next in graph.neighbors(node) {
            let deg = indegree.get_mut(&next).unwrap();
            *deg -= 1;
            if *deg == 0 {
                ready.push(rank(next));
            }
        }
    }

    if order.len() != stages.len() {
        let stuck = stages
            .iter()
            .find(|s| !order.contains(&s.id))
            .map(|s| s.id.to_string())
            .unwrap_or_default();
        return Err(DependencyError::Cycle { stage: stuck });
    }
    Ok(order)
}

/// Whether a stage's declared outputs overlap a path.
fn overlaps(stage: &Stage, path: &std::path::Path) -> bool {
    stage
        .outputs
        .iter()
        .any(|out| out.starts_with(path) || path.starts_with(out))
}

/// Filesystem path flattened into a stage-name fragment.
fn path_slug(path: &std::path::Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::BuildRequest;
    use crate::test_support::{test_config, NullSourceProvider};

    fn graph_for(
        build: &str,
        host: &str,
        target: &str,
        mutate: impl FnOnce(&mut BuildRequest),
    ) -> (StageGraph, EnvironmentSet, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut request = BuildRequest {
            build: Some(build.to_string()),
            host: Some(host.to_string()),
            target: Some(target.to_string()),
            ..BuildRequest::default()
        };
        mutate(&mut request);
        let resolved = request.resolve().unwrap();
        let set = EnvironmentSet::for_request(&resolved, &test_config(tmp.path()));
        let sources = NullSourceProvider::default();
        let graph = StageGraph::build(&set, &resolved.features, &sources, 4).unwrap();
        (graph, set, tmp)
    }

    fn names(graph: &StageGraph) -> Vec<String> {
        graph.order().iter().map(|id| id.name.clone()).collect()
    }

    #[test]
    fn test_native_stage_order() {
        let (graph, _, _tmp) =
            graph_for("x86_64-linux-gnu", "x86_64-linux-gnu", "x86_64-linux-gnu", |_| {});

        assert_eq!(
            names(&graph),
            vec![
                "binutils",
                "compiler",
                "debug-symbols-libstdc++.so.6",
                "debug-symbols-libgcc_s.so.1",
                "package",
            ]
        );
    }

    #[test]
    fn test_topological_validity() {
        let (graph, _, _tmp) = graph_for(
            "x86_64-linux-gnu",
            "x86_64-w64-mingw32",
            "aarch64-linux-gnu",
            |r| r.features.remote_debugger = true,
        );

        let position: HashMap<_, _> = graph
            .order()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        for stage in graph.iter_ordered() {
            for pred in &stage.predecessors {
                assert!(
                    position[pred] < position[&stage.id],
                    "{pred} must come before {}",
                    stage.id
                );
            }
        }
    }

    #[test]
    fn test_identical_requests_yield_identical_order() {
        let make = || {
            let (graph, _, tmp) = graph_for(
                "x86_64-linux-gnu",
                "x86_64-w64-mingw32",
                "aarch64-linux-gnu",
                |_| {},
            );
            drop(tmp);
            names(&graph)
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn test_freestanding_borrows_from_native() {
        let (graph, set, _tmp) =
            graph_for("x86_64-linux-gnu", "x86_64-linux-gnu", "arm-none-eabi", |r| {
                r.features.libc = false;
                r.features.scripting_support = true;
            });

        let primary = set.primary_id();
        let primary_names: Vec<_> = graph
            .iter_ordered()
            .filter(|s| s.id.environment == *primary)
            .map(|s| s.id.name.clone())
            .collect();

        // No hosted-runtime stages on a headerless bare-metal build.
        assert!(!primary_names.iter().any(|n| n == "headers"));
        assert!(!primary_names.iter().any(|n| n == "libc"));
        assert!(!primary_names.iter().any(|n| n == "runtime-libgcc"));

        // The runtime library, its debug symbols, and the support scripts
        // are borrowed from the native sibling.
        let borrows: Vec<_> = primary_names
            .iter()
            .filter(|n| n.starts_with("borrow-"))
            .cloned()
            .collect();
        assert_eq!(borrows.len(), 3);
        assert!(borrows.iter().any(|n| n.contains("libstdc++.so.6.debug")));
        assert!(borrows.iter().any(|n| n.contains("gcc-15")));

        // Borrow stages run after the native stages that produce the
        // artifacts.
        let position: HashMap<_, _> = graph
            .order()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        for stage in graph.iter_ordered() {
            if let StageKind::Borrow(edge) = &stage.kind {
                let source_stage_before = stage
                    .predecessors
                    .iter()
                    .any(|p| p.environment == edge.source && position[p] < position[&stage.id]);
                assert!(source_stage_before, "{} has no source ordering", stage.id);
            }
        }

        // The native sibling's stages are part of the same graph.
        assert!(graph
            .iter_ordered()
            .any(|s| s.id.environment != *primary && s.id.name == "compiler"));
    }

    #[test]
    fn test_canadian_debugger_waits_for_concurrent_side_deps() {
        let (graph, set, _tmp) = graph_for(
            "x86_64-linux-gnu",
            "x86_64-w64-mingw32",
            "aarch64-linux-gnu",
            |_| {},
        );

        let primary = set.primary_id().clone();
        let debugger = StageId::new(primary.clone(), "debugger");
        let stage = graph.get(&debugger).unwrap();

        let side_deps: Vec<_> = stage
            .predecessors
            .iter()
            .filter(|p| p.name.starts_with("dep-"))
            .collect();
        assert_eq!(side_deps.len(), 4);

        // No ordering exists among the four side dependencies themselves.
        for a in &side_deps {
            let dependents = graph.transitive_dependents(a);
            for b in &side_deps {
                if a != b {
                    assert!(!dependents.contains(b));
                }
            }
        }
    }

    #[test]
    fn test_package_is_last_primary_stage() {
        let (graph, set, _tmp) = graph_for(
            "x86_64-linux-gnu",
            "x86_64-linux-gnu",
            "aarch64-linux-gnu",
            |_| {},
        );

        let last = graph.order().last().unwrap();
        assert_eq!(last.name, "package");
        assert_eq!(last.environment, *set.primary_id());

        // Only the requested environment is packaged.
        let packages = graph
            .iter_ordered()
            .filter(|s| matches!(s.kind, StageKind::Package))
            .count();
        assert_eq!(packages, 1);
    }

    #[test]
    fn test_forced_rebuild_scope_is_transitive_dependents() {
        let (graph, set, _tmp) =
            graph_for("x86_64-linux-gnu", "x86_64-linux-gnu", "x86_64-linux-gnu", |_| {});

        let compiler = StageId::new(set.primary_id().clone(), "compiler");
        let dependents = graph.transitive_dependents(&compiler);

        let names: HashSet<_> = dependents.iter().map(|id| id.name.as_str()).collect();
        assert!(names.contains("debug-symbols-libstdc++.so.6"));
        assert!(names.contains("package"));
        assert!(!names.contains("binutils"));
    }
}
