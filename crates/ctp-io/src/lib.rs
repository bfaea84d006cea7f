use anyhow::Context;
use ctp_core::{
    BeliefBuilder, BeliefEntry, BeliefVector, ConnectionState, Edge, Graph, PolicyEntry,
    SolveReport, SolverConfig, StateSpace, VertexId, F,
};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod cli;
pub use cli::*;

/// A navigation problem: road graph, what is known about each road, and
/// where the trip starts and ends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub name: String,
    pub graph: Graph,
    #[serde(default)]
    pub beliefs: Vec<BeliefEntry>, // edges not listed are open
    pub start: VertexId,
    pub goal: VertexId,
}

impl Problem {
    pub fn initial_beliefs(&self) -> ctp_core::Result<BeliefVector> {
        BeliefBuilder::new(&self.graph).with_entries(&self.beliefs).build()
    }

    pub fn build_space(&self, config: &SolverConfig) -> ctp_core::Result<StateSpace> {
        let beliefs = self.initial_beliefs()?;
        StateSpace::build(&self.graph, &beliefs, self.start, self.goal, config)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let problem: Problem = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(problem)
    }
}

/// Edge count for a random problem: the spanning path plus chords, capped at
/// the complete graph.
fn edge_budget(vertices: usize, extra_edges: usize) -> usize {
    let max_edges = vertices.saturating_mul(vertices.saturating_sub(1)) / 2;
    vertices
        .saturating_sub(1)
        .saturating_add(extra_edges)
        .min(max_edges)
}

/// Random connected problem: a path through all vertices, `extra_edges`
/// chords, and `unknown` of the edges marked unknown. Same seed, same
/// problem.
pub fn generate_problem(vertices: usize, extra_edges: usize, unknown: usize, seed: u64) -> Problem {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let vertices = vertices.max(2);

    let mut edges: Vec<Edge> = (1..vertices)
        .map(|v| Edge::new(v - 1, v, rng.gen_range(1..=10) as F))
        .collect();

    let target = edge_budget(vertices, extra_edges);
    while edges.len() < target {
        let a = rng.gen_range(0..vertices);
        let b = rng.gen_range(0..vertices);
        if a == b || edges.iter().any(|e| e.touches(VertexId(a)) && e.touches(VertexId(b))) {
            continue;
        }
        edges.push(Edge::new(a, b, rng.gen_range(1..=10) as F));
    }

    let unknown = unknown.min(edges.len());
    let mut picked = sample(&mut rng, edges.len(), unknown).into_vec();
    picked.sort_unstable();
    let beliefs = picked
        .into_iter()
        .map(|edge| BeliefEntry {
            edge,
            state: ConnectionState::Unknown,
            probability: (rng.gen_range(0.1..0.9) * 100.0_f64).round() / 100.0,
        })
        .collect();

    Problem {
        name: format!("random-{}-{}", vertices, seed),
        graph: Graph::with_vertices(vertices, edges),
        beliefs,
        start: VertexId(0),
        goal: VertexId(vertices - 1),
    }
}

/// Run manifest with the solved policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub timestamp: String,
    pub problem: String,
    pub config: SolverConfig,
    pub report: SolveReport,
    pub states: usize,
    pub start_value: Option<F>, // None when the goal is unreachable
    pub policy: Vec<PolicyEntry>,
}

impl RunManifest {
    pub fn new(problem: &Problem, config: &SolverConfig, report: SolveReport, space: &StateSpace) -> Self {
        let start_value = space
            .initial_state()
            .and_then(|id| space.get(id))
            .map(|s| s.value())
            .filter(|v| v.is_finite());

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            problem: problem.name.clone(),
            config: config.clone(),
            report,
            states: space.len(),
            start_value,
            policy: space.policy_table(),
        }
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ctp_core::solve;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ctp-io-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate_problem(8, 4, 2, 42);
        let b = generate_problem(8, 4, 2, 42);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());

        assert_eq!(a.graph.num_vertices(), 8);
        assert_eq!(a.graph.num_edges(), 11);
        assert_eq!(a.beliefs.len(), 2);
        assert!(a.graph.validate().is_ok());
        for entry in &a.beliefs {
            assert!((0.1..=0.9).contains(&entry.probability));
        }
    }

    #[test]
    fn test_problem_file_roundtrip() {
        let problem = generate_problem(5, 2, 1, 3);
        let path = scratch("problem.json");
        problem.save_to_file(&path).unwrap();
        let loaded = Problem::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            loaded.graph.neighbors(VertexId(0)).len(),
            problem.graph.neighbors(VertexId(0)).len()
        );
        assert_eq!(loaded.beliefs.len(), 1);
        assert!(loaded.build_space(&SolverConfig::default()).is_ok());
    }

    #[test]
    fn test_problem_from_json() {
        let json = r#"{
            "graph": {
                "vertices": [{"id": 0}, {"id": 1}, {"id": 2}],
                "edges": [{"u": 0, "v": 1, "w": 1.0}, {"u": 1, "v": 2, "w": 1.0}, {"u": 0, "v": 2, "w": 4.0}]
            },
            "beliefs": [{"edge": 1, "state": "unknown", "probability": 0.5}],
            "start": 0,
            "goal": 2
        }"#;
        let problem: Problem = serde_json::from_str(json).unwrap();

        let config = SolverConfig::default();
        let mut space = problem.build_space(&config).unwrap();
        let report = solve(&mut space, &problem.graph, &config).unwrap();
        assert!(report.converged);

        // at 1: 0.5 * -1 + 0.5 * -(1 + 4); from 0: -1 + that = -4 which ties
        // the direct road, so either way the start is worth -4.
        let manifest = RunManifest::new(&problem, &config, report, &space);
        assert_relative_eq!(manifest.start_value.unwrap(), -4.0, epsilon = 1e-12);
        assert_eq!(manifest.states, 9);
    }

    #[test]
    fn test_edge_budget_is_capped() {
        assert_eq!(edge_budget(4, 2), 5);
        assert_eq!(edge_budget(4, 100), 6);
        assert_eq!(edge_budget(usize::MAX, 5), usize::MAX / 2);
        assert_eq!(edge_budget(1 << 40, usize::MAX), usize::MAX / 2);
    }

    #[test]
    fn test_bad_probability_is_reported() {
        let mut problem = generate_problem(4, 0, 1, 1);
        problem.beliefs[0].probability = 2.0;
        assert!(problem.build_space(&SolverConfig::default()).is_err());
    }

    #[test]
    fn test_manifest_roundtrip() {
        let problem = generate_problem(4, 1, 1, 9);
        let config = SolverConfig::default();
        let mut space = problem.build_space(&config).unwrap();
        let report = solve(&mut space, &problem.graph, &config).unwrap();
        let manifest = RunManifest::new(&problem, &config, report, &space);

        let path = scratch("manifest.json");
        manifest.save_to_file(&path).unwrap();
        let loaded = RunManifest::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.run_id, manifest.run_id);
        assert_eq!(loaded.policy.len(), space.len());
        assert!(loaded.report.converged);
    }
}
