use crate::{ConnectionState, StateId, StateSpace, VertexId, F};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the policy does in one state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Move { from: VertexId, to: VertexId },
    /// Arriving here reveals these edges; the value is an expectation.
    Observe { edges: Vec<usize> },
    Goal,
    None,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move { from, to } => write!(f, "Move {} -> {}", from, to),
            Action::Observe { edges } => write!(f, "OBSERVE {} UNKNOWN EDGES", edges.len()),
            Action::Goal => f.write_str("GOAL"),
            Action::None => f.write_str("NO ACTION OR UNREACHABLE"),
        }
    }
}

/// One row of the policy table. `value` is `None` while the goal is
/// unreachable from this state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub state: StateId,
    pub location: VertexId,
    pub beliefs: Vec<ConnectionState>,
    pub value: Option<F>,
    pub action: Action,
}

impl StateSpace {
    pub fn action(&self, id: StateId) -> Action {
        let Some(state) = self.get(id) else {
            return Action::None;
        };
        if self.is_terminal(id) {
            return Action::Goal;
        }
        if state.is_undetermined() {
            return Action::Observe {
                edges: state.beliefs().incident_unknown_positions(state.location()),
            };
        }
        match state.best_next().and_then(|n| self.get(n)) {
            Some(next) => Action::Move { from: state.location(), to: next.location() },
            None => Action::None,
        }
    }

    pub fn policy_table(&self) -> Vec<PolicyEntry> {
        self.ids()
            .filter_map(|id| {
                let state = self.get(id)?;
                Some(PolicyEntry {
                    state: id,
                    location: state.location(),
                    beliefs: state.beliefs().states().collect(),
                    value: Some(state.value()).filter(|v| v.is_finite()),
                    action: self.action(id),
                })
            })
            .collect()
    }

    /// Read-only single-line dump of a state.
    pub fn display(&self, id: StateId) -> StateDisplay<'_> {
        StateDisplay { space: self, id }
    }
}

pub struct StateDisplay<'a> {
    space: &'a StateSpace,
    id: StateId,
}

impl fmt::Display for StateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(state) = self.space.get(self.id) else {
            return write!(f, "[{} missing]", self.id);
        };
        write!(
            f,
            "[V{} {{ {} }}]: value = {}, {}",
            state.location(),
            state.beliefs(),
            state.value(),
            self.space.action(self.id)
        )
    }
}
