//! Arena of augmented states and the builder that enumerates them.
//!
//! Every state lives in one `Vec` and refers to its neighbors by
//! [`StateId`], so the neighbor graph may contain cycles without any state
//! owning another.

use crate::{
    AugmentedState, BeliefVector, ConnectionState, CtpError, Graph, GraphInconsistency, Result,
    SolverConfig, StateId, VertexId, F,
};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Clone, Debug, Default)]
pub struct StateSpace {
    states: Vec<AugmentedState>,
    terminal: Vec<bool>,
    // (location, belief signature) -> candidates; exact comparison follows.
    index: FxHashMap<(VertexId, u64), Vec<StateId>>,
    initial: Option<StateId>,
}

impl StateSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len()).map(StateId)
    }

    pub fn states(&self) -> &[AugmentedState] {
        &self.states
    }

    pub fn get(&self, id: StateId) -> Option<&AugmentedState> {
        self.states.get(id.0)
    }

    pub fn state(&self, id: StateId) -> Result<&AugmentedState> {
        self.states
            .get(id.0)
            .ok_or(CtpError::GraphInconsistency(GraphInconsistency::UnknownState(id)))
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> Result<&mut AugmentedState> {
        self.states
            .get_mut(id.0)
            .ok_or(CtpError::GraphInconsistency(GraphInconsistency::UnknownState(id)))
    }

    /// Add a state. A second state with the same location and belief states
    /// is allowed but only the first one is returned by [`Self::lookup`].
    pub fn add_state(&mut self, location: VertexId, beliefs: BeliefVector) -> StateId {
        let id = StateId(self.states.len());
        self.index
            .entry((location, beliefs.signature()))
            .or_default()
            .push(id);
        self.states.push(AugmentedState::new(location, beliefs));
        self.terminal.push(false);
        id
    }

    /// Record a transition `from -> to`. Both kinds of transitions go through
    /// here; which kind it is follows from the two locations.
    pub fn connect(&mut self, from: StateId, to: StateId) -> Result<()> {
        self.state(to)?;
        self.state_mut(from)?.push_neighbor(to);
        Ok(())
    }

    /// Fix the value of a goal state. Terminal states are skipped by the
    /// solver and keep this value for the whole run.
    pub fn seed_terminal(&mut self, id: StateId, value: F) -> Result<()> {
        self.state_mut(id)?.set(value, None);
        self.terminal[id.0] = true;
        Ok(())
    }

    pub fn is_terminal(&self, id: StateId) -> bool {
        self.terminal.get(id.0).copied().unwrap_or(false)
    }

    pub fn lookup(&self, location: VertexId, beliefs: &BeliefVector) -> Option<StateId> {
        self.index
            .get(&(location, beliefs.signature()))?
            .iter()
            .copied()
            .find(|id| self.states[id.0].beliefs().same_states(beliefs))
    }

    pub fn set_initial(&mut self, id: StateId) -> Result<()> {
        self.state(id)?;
        self.initial = Some(id);
        Ok(())
    }

    /// State the navigator starts in, when the space was built from a start
    /// vertex.
    pub fn initial_state(&self) -> Option<StateId> {
        self.initial
    }

    /// Enumerate every belief vector reachable from `initial` and one state
    /// per (vertex, vector), then wire the transitions:
    ///
    /// - states at `goal` are terminal with value 0 and no neighbors;
    /// - undetermined states lead to one state per open/closed assignment of
    ///   their incident unknown edges, at the same location;
    /// - resolved states lead to the adjacent vertices over edges believed
    ///   open, keeping the belief vector.
    ///
    /// Each initially unknown edge is unknown, open or closed in a reachable
    /// vector, so the space holds `3^K * |V|` states for `K` unknown edges.
    pub fn build(
        graph: &Graph,
        initial: &BeliefVector,
        start: VertexId,
        goal: VertexId,
        config: &SolverConfig,
    ) -> Result<Self> {
        graph.validate()?;
        for v in [start, goal] {
            if !graph.contains(v) {
                return Err(CtpError::UnknownVertex(v));
            }
        }
        if initial.len() != graph.num_edges() {
            return Err(CtpError::InvalidGraph(format!(
                "{} beliefs for {} edges",
                initial.len(),
                graph.num_edges()
            )));
        }

        let unknown: Vec<usize> = initial
            .iter()
            .enumerate()
            .filter(|(_, b)| b.state == ConnectionState::Unknown)
            .map(|(i, _)| i)
            .collect();
        if unknown.len() > config.max_unknown_edges {
            return Err(CtpError::TooManyUnknowns {
                count: unknown.len(),
                limit: config.max_unknown_edges,
            });
        }

        let vectors = reachable_vectors(initial, &unknown)?;
        debug!(
            unknown = unknown.len(),
            vectors = vectors.len(),
            vertices = graph.num_vertices(),
            "enumerated belief vectors"
        );

        let mut space = Self::new();
        for beliefs in &vectors {
            for v in graph.vertex_ids() {
                space.add_state(v, beliefs.clone());
            }
        }

        let mut transitions = Vec::new();
        for from in space.ids() {
            let state = &space.states[from.0];
            let location = state.location();
            if location == goal {
                continue;
            }

            if state.is_undetermined() {
                let positions = state.beliefs().incident_unknown_positions(location);
                for mask in 0..(1usize << positions.len()) {
                    let updates: Vec<(usize, ConnectionState)> = positions
                        .iter()
                        .enumerate()
                        .map(|(bit, &pos)| {
                            let resolved = if mask & (1 << bit) == 0 {
                                ConnectionState::Open
                            } else {
                                ConnectionState::Closed
                            };
                            (pos, resolved)
                        })
                        .collect();
                    let refined = state.beliefs().with_resolved(&updates)?;
                    let to = space
                        .lookup(location, &refined)
                        .ok_or(GraphInconsistency::MissingSuccessor { location })?;
                    transitions.push((from, to));
                }
            } else {
                for &(next, edge, _) in graph.neighbors(location) {
                    if state.beliefs()[edge].state != ConnectionState::Open {
                        continue;
                    }
                    let to = space
                        .lookup(next, state.beliefs())
                        .ok_or(GraphInconsistency::MissingSuccessor { location: next })?;
                    transitions.push((from, to));
                }
            }
        }

        for (from, to) in transitions {
            space.connect(from, to)?;
        }

        let goals: Vec<StateId> = space
            .ids()
            .filter(|id| space.states[id.0].location() == goal)
            .collect();
        for id in goals {
            space.seed_terminal(id, 0.0)?;
        }

        let initial_id = space
            .lookup(start, initial)
            .ok_or(GraphInconsistency::MissingSuccessor { location: start })?;
        space.set_initial(initial_id)?;

        info!(states = space.len(), "built state space");
        Ok(space)
    }
}

/// All vectors obtained by leaving each listed position unknown or fixing it
/// to open or closed.
fn reachable_vectors(initial: &BeliefVector, unknown: &[usize]) -> Result<Vec<BeliefVector>> {
    const CHOICES: [ConnectionState; 3] = [
        ConnectionState::Unknown,
        ConnectionState::Open,
        ConnectionState::Closed,
    ];

    let total = 3usize.pow(unknown.len() as u32);
    let mut vectors = Vec::with_capacity(total);
    for mut code in 0..total {
        let mut updates = Vec::with_capacity(unknown.len());
        for &pos in unknown {
            let choice = CHOICES[code % 3];
            code /= 3;
            if choice != ConnectionState::Unknown {
                updates.push((pos, choice));
            }
        }
        vectors.push(initial.with_resolved(&updates)?);
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeliefBuilder, Edge};

    // 0 - 1 - 3 is cheap but 1 - 3 may be blocked; 0 - 2 - 3 is the detour.
    fn detour() -> Graph {
        Graph::with_vertices(
            4,
            vec![
                Edge::new(0, 1, 1.0),
                Edge::new(1, 3, 1.0),
                Edge::new(0, 2, 2.0),
                Edge::new(2, 3, 2.0),
            ],
        )
    }

    #[test]
    fn test_build_counts_states() {
        let g = detour();
        let beliefs = BeliefBuilder::new(&g).unknown(1, 0.5).build().unwrap();
        let space =
            StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &SolverConfig::default())
                .unwrap();

        // three vectors (unknown, open, closed) times four vertices
        assert_eq!(space.len(), 12);
        let start = space.state(space.initial_state().unwrap()).unwrap();
        assert_eq!(start.location(), VertexId(0));
        assert!(start.beliefs().same_states(&beliefs));
    }

    #[test]
    fn test_build_wires_transitions() {
        let g = detour();
        let beliefs = BeliefBuilder::new(&g).unknown(1, 0.5).build().unwrap();
        let space =
            StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &SolverConfig::default())
                .unwrap();

        // At 1 with edge 1 unknown: two resolution successors at 1.
        let at_1 = space.lookup(VertexId(1), &beliefs).unwrap();
        let state = space.state(at_1).unwrap();
        assert!(state.is_undetermined());
        assert_eq!(state.neighbors().len(), 2);
        for &n in state.neighbors() {
            let succ = space.state(n).unwrap();
            assert_eq!(succ.location(), VertexId(1));
            assert!(succ.is_resolved());
        }

        // Resolved closed: only the way back to 0.
        let closed = beliefs.with_resolved(&[(1, ConnectionState::Closed)]).unwrap();
        let blocked = space.state(space.lookup(VertexId(1), &closed).unwrap()).unwrap();
        let targets: Vec<VertexId> = blocked
            .neighbors()
            .iter()
            .map(|&n| space.state(n).unwrap().location())
            .collect();
        assert_eq!(targets, vec![VertexId(0)]);
    }

    #[test]
    fn test_goal_states_are_terminal() {
        let g = detour();
        let beliefs = BeliefBuilder::new(&g).unknown(1, 0.5).build().unwrap();
        let space =
            StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &SolverConfig::default())
                .unwrap();

        for id in space.ids() {
            let state = space.state(id).unwrap();
            if state.location() == VertexId(3) {
                assert!(space.is_terminal(id));
                assert_eq!(state.value(), 0.0);
                assert!(state.neighbors().is_empty());
            } else {
                assert!(!space.is_terminal(id));
                assert_eq!(state.value(), F::NEG_INFINITY);
            }
        }
    }

    #[test]
    fn test_build_rejects_too_many_unknowns() {
        let g = detour();
        let beliefs = BeliefBuilder::new(&g).unknown(0, 0.5).unknown(1, 0.5).build().unwrap();
        let config = SolverConfig { max_unknown_edges: 1, ..SolverConfig::default() };

        let err = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(3), &config).unwrap_err();
        assert_eq!(err, CtpError::TooManyUnknowns { count: 2, limit: 1 });
    }

    #[test]
    fn test_build_rejects_foreign_vertices() {
        let g = detour();
        let beliefs = BeliefBuilder::new(&g).build().unwrap();
        let err = StateSpace::build(&g, &beliefs, VertexId(0), VertexId(9), &SolverConfig::default())
            .unwrap_err();
        assert_eq!(err, CtpError::UnknownVertex(VertexId(9)));
    }

    #[test]
    fn test_connect_checks_handles() {
        let g = detour();
        let mut space = StateSpace::new();
        let a = space.add_state(VertexId(0), BeliefBuilder::new(&g).build().unwrap());

        let err = space.connect(a, StateId(5)).unwrap_err();
        assert_eq!(
            err,
            CtpError::GraphInconsistency(GraphInconsistency::UnknownState(StateId(5)))
        );
    }
}
