use crate::{BeliefVector, ConnectionState, VertexId, F};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of an augmented state inside a [`crate::StateSpace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub usize);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// "I am at `location` and this is everything I believe about the roads."
///
/// Neighbors are handles into the owning space and mix two kinds of
/// transitions: physical moves (other location, same beliefs) and belief
/// resolutions (same location, incident unknowns fixed to open or closed).
#[derive(Clone, Debug)]
pub struct AugmentedState {
    location: VertexId,
    beliefs: BeliefVector,
    value: F,
    best_next: Option<StateId>,
    neighbors: Vec<StateId>,
    undetermined: bool,
}

impl AugmentedState {
    pub fn new(location: VertexId, beliefs: BeliefVector) -> Self {
        let undetermined = beliefs.is_incident_unknown(location);
        Self {
            location,
            beliefs,
            value: F::NEG_INFINITY,
            best_next: None,
            neighbors: Vec::new(),
            undetermined,
        }
    }

    pub fn location(&self) -> VertexId {
        self.location
    }

    pub fn beliefs(&self) -> &BeliefVector {
        &self.beliefs
    }

    /// Negated expected cost to the goal; `-inf` while unreachable.
    pub fn value(&self) -> F {
        self.value
    }

    pub fn best_next(&self) -> Option<StateId> {
        self.best_next
    }

    pub fn neighbors(&self) -> &[StateId] {
        &self.neighbors
    }

    /// Some edge at the current location is still unknown.
    pub fn is_undetermined(&self) -> bool {
        self.undetermined
    }

    pub fn is_resolved(&self) -> bool {
        !self.undetermined
    }

    /// Staying put is always possible. Any other target is refused as soon
    /// as one edge at the current location is believed closed; the edge to
    /// `target` itself is not singled out.
    pub fn can_go_to_vertex(&self, target: VertexId) -> bool {
        if target == self.location {
            return true;
        }

        !self
            .beliefs
            .iter()
            .any(|b| b.touches(self.location) && b.state == ConnectionState::Closed)
    }

    pub(crate) fn push_neighbor(&mut self, id: StateId) {
        if !self.neighbors.contains(&id) {
            self.neighbors.push(id);
        }
    }

    pub(crate) fn set(&mut self, value: F, best_next: Option<StateId>) {
        self.value = value;
        self.best_next = best_next;
    }
}
