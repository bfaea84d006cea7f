//! Per-state value update.
//!
//! Resolved states take the best one-step lookahead over physical moves:
//!
//! value = max_n (n.value - w(location, n.location))
//!
//! Undetermined states take the expectation over every open/closed outcome
//! of their incident unknown edges. Outcomes are enumerated exhaustively,
//! which costs `2^U` leaves for `U` incident unknowns; keep `U` small.
//!
//! Both rules only ever raise a value, so repeated sweeps reach a fixed point
//! once a sweep leaves every value unchanged.

use crate::beliefs::signature_of;
use crate::{
    AugmentedState, ConnectionState, CtpError, Graph, GraphInconsistency, Result, StateId,
    StateSpace, F,
};

/// Freshly computed value for one state, not yet written back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backup {
    pub value: F,
    pub best_next: Option<StateId>,
}

impl StateSpace {
    /// Recompute `id` from its neighbors and keep the result if it is strictly
    /// better than the stored value. Returns whether the value changed.
    pub fn update(&mut self, id: StateId, graph: &Graph) -> Result<bool> {
        match self.backup(id, graph)? {
            Some(backup) => self.apply(id, backup),
            None => Ok(false),
        }
    }

    /// Compute the backup of `id` without touching any state. `None` means no
    /// physical move is available at all.
    pub fn backup(&self, id: StateId, graph: &Graph) -> Result<Option<Backup>> {
        let state = self.state(id)?;
        if state.is_undetermined() {
            let value = self.expected_value(state)?;
            Ok(Some(Backup { value, best_next: None }))
        } else {
            self.best_move(state, graph)
        }
    }

    /// Write `backup` into `id` if it improves the stored value.
    pub fn apply(&mut self, id: StateId, backup: Backup) -> Result<bool> {
        let state = self.state_mut(id)?;
        if backup.value > state.value() {
            state.set(backup.value, backup.best_next);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn best_move(&self, state: &AugmentedState, graph: &Graph) -> Result<Option<Backup>> {
        let mut best: Option<Backup> = None;

        for &next in state.neighbors() {
            let neighbor = self.state(next)?;
            // Same location means a resolution edge, which resolved states
            // never take.
            if neighbor.location() == state.location() {
                continue;
            }

            let weight = graph
                .edge_weight(state.location(), neighbor.location())
                .ok_or(GraphInconsistency::MissingEdge {
                    from: state.location(),
                    to: neighbor.location(),
                })?;
            let candidate = neighbor.value() - weight;

            if best.map_or(true, |b| candidate > b.value) {
                best = Some(Backup { value: candidate, best_next: Some(next) });
            }
        }

        Ok(best)
    }

    fn expected_value(&self, state: &AugmentedState) -> Result<F> {
        let expected = state.beliefs().len();
        for &next in state.neighbors() {
            let found = self.state(next)?.beliefs().len();
            if found != expected {
                return Err(CtpError::GraphInconsistency(GraphInconsistency::LengthMismatch {
                    neighbor: next,
                    expected,
                    found,
                }));
            }
        }

        let mut carry = Vec::with_capacity(expected);
        Ok(self.enumerate(state, &mut carry, 1.0, 0))
    }

    /// Decide belief position `pos`, then the rest. `carry` holds the states
    /// decided so far, `probability` the weight of this partial outcome.
    fn enumerate(
        &self,
        state: &AugmentedState,
        carry: &mut Vec<ConnectionState>,
        probability: F,
        pos: usize,
    ) -> F {
        let beliefs = state.beliefs();
        if pos == beliefs.len() {
            return self.outcome_value(state, carry, probability);
        }

        let belief = &beliefs[pos];
        if belief.is_incident_unknown(state.location()) {
            let p = belief.probability;

            carry.push(ConnectionState::Open);
            let open = self.enumerate(state, carry, probability * (1.0 - p), pos + 1);
            carry.pop();

            carry.push(ConnectionState::Closed);
            let closed = self.enumerate(state, carry, probability * p, pos + 1);
            carry.pop();

            open + closed
        } else {
            carry.push(belief.state);
            let value = self.enumerate(state, carry, probability, pos + 1);
            carry.pop();
            value
        }
    }

    /// Weighted value of the neighbor matching a fully decided outcome.
    /// Outcomes without a matching neighbor, or with zero weight, add nothing.
    fn outcome_value(&self, state: &AugmentedState, carry: &[ConnectionState], probability: F) -> F {
        if probability == 0.0 {
            return 0.0;
        }

        let signature = signature_of(carry.iter().copied());
        state
            .neighbors()
            .iter()
            .map(|&next| &self.states()[next.0])
            .find(|n| {
                n.beliefs().signature() == signature
                    && n.beliefs().states().eq(carry.iter().copied())
            })
            .map_or(0.0, |n| n.value() * probability)
    }
}
