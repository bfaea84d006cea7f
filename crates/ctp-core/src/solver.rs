use crate::{Backup, Graph, Result, StateId, StateSpace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Configuration for value iteration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_sweeps: usize,        // Give up after this many sweeps
    pub use_parallel: bool,       // Double-buffered parallel sweeps
    pub max_unknown_edges: usize, // Builder refuses larger belief spaces
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_sweeps: 10_000,
            use_parallel: false,
            max_unknown_edges: 10, // 3^10 belief vectors per vertex
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub sweeps: usize,
    pub converged: bool,
    pub changes_per_sweep: Vec<usize>,
}

/// Sweep every non-terminal state until a sweep changes nothing.
///
/// Sequential sweeps update in place, so later states in the same sweep
/// already see the new values. Parallel sweeps compute all backups from the
/// values at the start of the sweep and write them back afterwards.
pub fn solve(space: &mut StateSpace, graph: &Graph, config: &SolverConfig) -> Result<SolveReport> {
    let active: Vec<StateId> = space.ids().filter(|&id| !space.is_terminal(id)).collect();
    let mut report = SolveReport::default();

    while report.sweeps < config.max_sweeps {
        let changed = if config.use_parallel {
            sweep_parallel(space, graph, &active)?
        } else {
            sweep(space, graph, &active)?
        };
        report.sweeps += 1;
        report.changes_per_sweep.push(changed);
        debug!(sweep = report.sweeps, changed, "sweep finished");

        if changed == 0 {
            report.converged = true;
            break;
        }
    }

    if report.converged {
        info!(sweeps = report.sweeps, states = space.len(), "value iteration converged");
    } else {
        warn!(max_sweeps = config.max_sweeps, "value iteration stopped before converging");
    }
    Ok(report)
}

/// One in-place pass over `ids`. Returns the number of states whose value
/// changed.
pub fn sweep(space: &mut StateSpace, graph: &Graph, ids: &[StateId]) -> Result<usize> {
    let mut changed = 0;
    for &id in ids {
        if space.update(id, graph)? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// One double-buffered pass over `ids`: backups read only the values from
/// before the pass.
pub fn sweep_parallel(space: &mut StateSpace, graph: &Graph, ids: &[StateId]) -> Result<usize> {
    let backups: Vec<(StateId, Option<Backup>)> = {
        let snapshot: &StateSpace = space;
        ids.par_iter()
            .map(|&id| snapshot.backup(id, graph).map(|b| (id, b)))
            .collect::<Result<_>>()?
    };

    let mut changed = 0;
    for (id, backup) in backups {
        if let Some(backup) = backup {
            if space.apply(id, backup)? {
                changed += 1;
            }
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeliefBuilder, ConnectionState, Edge, VertexId};
    use approx::assert_relative_eq;

    // Linear chain 0 - 1 - 2 - 3, goal at 3.
    fn chain() -> Graph {
        Graph::with_vertices(
            4,
            vec![Edge::new(0, 1, 1.0), Edge::new(1, 2, 2.0), Edge::new(2, 3, 3.0)],
        )
    }

    #[test]
    fn test_chain_converges_to_path_cost() {
        let g = chain();
        let beliefs = BeliefBuilder::new(&g).build().unwrap();
        let config = SolverConfig::default();
        let mut space = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &config).unwrap();

        let report = solve(&mut space, &g, &config).unwrap();
        assert!(report.converged);
        assert_eq!(report.changes_per_sweep.last(), Some(&0));

        let start = space.state(space.initial_state().unwrap()).unwrap();
        assert_relative_eq!(start.value(), -6.0);
        let next = space.state(start.best_next().unwrap()).unwrap();
        assert_eq!(next.location(), VertexId(1));
    }

    #[test]
    fn test_solves_graph_loaded_from_json() {
        let json = r#"{"vertices":[{"id":0},{"id":1}],"edges":[{"u":0,"v":1,"w":1.0}]}"#;
        let g: Graph = serde_json::from_str(json).unwrap();
        let beliefs = BeliefBuilder::new(&g).build().unwrap();
        let config = SolverConfig::default();
        let mut space = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(1), &config).unwrap();

        let start_id = space.initial_state().unwrap();
        assert_eq!(space.state(start_id).unwrap().neighbors().len(), 1);

        let report = solve(&mut space, &g, &config).unwrap();
        assert!(report.converged);
        assert_relative_eq!(space.state(start_id).unwrap().value(), -1.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let g = Graph::with_vertices(
            4,
            vec![
                Edge::new(0, 1, 1.0),
                Edge::new(1, 3, 1.0),
                Edge::new(0, 2, 2.0),
                Edge::new(2, 3, 2.0),
            ],
        );
        let beliefs = BeliefBuilder::new(&g).unknown(1, 0.4).build().unwrap();

        let seq_config = SolverConfig::default();
        let par_config = SolverConfig { use_parallel: true, ..SolverConfig::default() };
        let mut seq = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &seq_config).unwrap();
        let mut par = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &par_config).unwrap();

        assert!(solve(&mut seq, &g, &seq_config).unwrap().converged);
        assert!(solve(&mut par, &g, &par_config).unwrap().converged);

        for id in seq.ids() {
            let a = seq.state(id).unwrap().value();
            let b = par.state(id).unwrap().value();
            if a.is_finite() || b.is_finite() {
                assert_relative_eq!(a, b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_gamble_on_unknown_edge() {
        // 0 - 1 - 3 costs 2 when 1 - 3 is open; otherwise walk back and take
        // 0 - 2 - 3 for 4 more. The detour straight away costs 4.
        let g = Graph::with_vertices(
            4,
            vec![
                Edge::new(0, 1, 1.0),
                Edge::new(1, 3, 1.0),
                Edge::new(0, 2, 2.0),
                Edge::new(2, 3, 2.0),
            ],
        );
        let beliefs = BeliefBuilder::new(&g).unknown(1, 0.3).build().unwrap();
        let config = SolverConfig::default();
        let mut space = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &config).unwrap();
        assert!(solve(&mut space, &g, &config).unwrap().converged);

        // At 1, still unknown: 0.7 * -1 + 0.3 * -(1 + 4)
        let at_1 = space.lookup(VertexId(1), &beliefs).unwrap();
        assert_relative_eq!(space.state(at_1).unwrap().value(), -2.2, epsilon = 1e-12);

        // From 0 the gamble (-3.2) beats the sure detour (-4).
        let start = space.state(space.initial_state().unwrap()).unwrap();
        assert_relative_eq!(start.value(), -3.2, epsilon = 1e-12);
        assert_eq!(start.best_next(), Some(at_1));

        // Once the edge is known closed, the detour is the only way.
        let closed = beliefs.with_resolved(&[(1, ConnectionState::Closed)]).unwrap();
        let informed = space.lookup(VertexId(0), &closed).unwrap();
        assert_relative_eq!(space.state(informed).unwrap().value(), -4.0);
    }

    #[test]
    fn test_unreachable_goal_stays_unvalued() {
        let g = Graph::with_vertices(3, vec![Edge::new(0, 1, 1.0), Edge::new(1, 2, 1.0)]);
        let beliefs = BeliefBuilder::new(&g).closed(1).build().unwrap();
        let config = SolverConfig::default();
        let mut space = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(2), &config).unwrap();

        let report = solve(&mut space, &g, &config).unwrap();
        assert!(report.converged);
        assert_eq!(report.sweeps, 1);

        let start = space.state(space.initial_state().unwrap()).unwrap();
        assert_eq!(start.value(), f64::NEG_INFINITY);
        assert!(start.best_next().is_none());
    }

    #[test]
    fn test_sweep_limit_reports_not_converged() {
        let g = chain();
        let beliefs = BeliefBuilder::new(&g).build().unwrap();
        let config = SolverConfig { max_sweeps: 1, use_parallel: true, ..SolverConfig::default() };
        let mut space = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &config).unwrap();

        // A Jacobi sweep only moves values one edge, so one sweep is not enough.
        let report = solve(&mut space, &g, &config).unwrap();
        assert_eq!(report.sweeps, 1);
        assert!(!report.converged);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: SolverConfig = serde_json::from_str(r#"{"use_parallel": true}"#).unwrap();
        assert!(config.use_parallel);
        assert_eq!(config.max_sweeps, SolverConfig::default().max_sweeps);
    }
}
