use crate::{CtpError, Graph, Result, VertexId, F};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// What the navigator currently knows about one edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Closed,
    Unknown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Open => "OPEN",
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Belief about the edge `v1 - v2`.
///
/// `probability` is only read while `state` is `Unknown`. During resolution
/// the CLOSED branch is weighted by `probability` and the OPEN branch by its
/// complement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectivityBelief {
    pub v1: VertexId,
    pub v2: VertexId,
    pub state: ConnectionState,
    #[serde(default)]
    pub probability: F,
}

impl ConnectivityBelief {
    pub fn new(v1: VertexId, v2: VertexId, state: ConnectionState, probability: F) -> Self {
        Self { v1, v2, state, probability }
    }

    pub fn touches(&self, location: VertexId) -> bool {
        self.v1 == location || self.v2 == location
    }

    pub fn is_incident_unknown(&self, location: VertexId) -> bool {
        self.state == ConnectionState::Unknown && self.touches(location)
    }

    /// Same edge and prior, with the state fixed to `state`.
    pub fn resolved(&self, state: ConnectionState) -> Self {
        Self { state, ..self.clone() }
    }
}

/// True if some belief touching `location` is still unknown.
pub fn is_incident_unknown(location: VertexId, beliefs: &[ConnectivityBelief]) -> bool {
    beliefs.iter().any(|b| b.is_incident_unknown(location))
}

/// Hash of a state sequence, used to skip exact comparisons that cannot match.
pub fn signature_of<I>(states: I) -> u64
where
    I: IntoIterator<Item = ConnectionState>,
{
    let mut hasher = FxHasher::default();
    let mut len = 0usize;
    for state in states {
        state.hash(&mut hasher);
        len += 1;
    }
    len.hash(&mut hasher);
    hasher.finish()
}

/// Immutable belief vector, one entry per graph edge in edge order.
///
/// Cloning shares the underlying slice, so many states can hold the same
/// vector.
#[derive(Clone, Debug)]
pub struct BeliefVector {
    beliefs: Arc<[ConnectivityBelief]>,
    signature: u64,
}

impl BeliefVector {
    pub fn new(beliefs: Vec<ConnectivityBelief>) -> Self {
        let signature = signature_of(beliefs.iter().map(|b| b.state));
        Self { beliefs: beliefs.into(), signature }
    }

    pub fn signature(&self) -> u64 {
        self.signature
    }

    pub fn states(&self) -> impl Iterator<Item = ConnectionState> + '_ {
        self.beliefs.iter().map(|b| b.state)
    }

    /// Compares states only; endpoints and probabilities are ignored.
    pub fn same_states(&self, other: &BeliefVector) -> bool {
        self.signature == other.signature
            && self.beliefs.len() == other.beliefs.len()
            && self.states().eq(other.states())
    }

    pub fn is_incident_unknown(&self, location: VertexId) -> bool {
        is_incident_unknown(location, &self.beliefs)
    }

    pub fn incident_unknown_positions(&self, location: VertexId) -> Vec<usize> {
        self.beliefs
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_incident_unknown(location))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn unknown_count(&self) -> usize {
        self.states().filter(|s| *s == ConnectionState::Unknown).count()
    }

    /// Copy with the listed positions set to new states.
    pub fn with_resolved(&self, updates: &[(usize, ConnectionState)]) -> Result<Self> {
        let mut beliefs = self.beliefs.to_vec();
        for &(pos, state) in updates {
            let slot = beliefs.get_mut(pos).ok_or(CtpError::UnknownEdge(pos))?;
            *slot = slot.resolved(state);
        }
        Ok(Self::new(beliefs))
    }
}

impl Deref for BeliefVector {
    type Target = [ConnectivityBelief];

    fn deref(&self) -> &Self::Target {
        &self.beliefs
    }
}

impl PartialEq for BeliefVector {
    fn eq(&self, other: &Self) -> bool {
        self.same_states(other)
    }
}

impl Eq for BeliefVector {}

impl Hash for BeliefVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
    }
}

impl fmt::Display for BeliefVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.beliefs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} - {} {}", b.v1, b.v2, b.state)?;
        }
        Ok(())
    }
}

/// One line of a belief description, as stored in problem files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeliefEntry {
    pub edge: usize,
    pub state: ConnectionState,
    #[serde(default)]
    pub probability: F,
}

/// Builds the initial belief vector for a graph. Edges not mentioned are open.
pub struct BeliefBuilder<'g> {
    graph: &'g Graph,
    entries: Vec<BeliefEntry>,
}

impl<'g> BeliefBuilder<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph, entries: Vec::new() }
    }

    pub fn open(self, edge: usize) -> Self {
        self.entry(edge, ConnectionState::Open, 0.0)
    }

    pub fn closed(self, edge: usize) -> Self {
        self.entry(edge, ConnectionState::Closed, 0.0)
    }

    /// Edge whose state is revealed on arrival; `probability` weights the
    /// closed outcome.
    pub fn unknown(self, edge: usize, probability: F) -> Self {
        self.entry(edge, ConnectionState::Unknown, probability)
    }

    pub fn with_entries(mut self, entries: &[BeliefEntry]) -> Self {
        self.entries.extend_from_slice(entries);
        self
    }

    fn entry(mut self, edge: usize, state: ConnectionState, probability: F) -> Self {
        self.entries.push(BeliefEntry { edge, state, probability });
        self
    }

    pub fn build(self) -> Result<BeliefVector> {
        let mut beliefs: Vec<ConnectivityBelief> = self
            .graph
            .edges()
            .iter()
            .map(|e| ConnectivityBelief::new(e.u, e.v, ConnectionState::Open, 0.0))
            .collect();

        for entry in &self.entries {
            let slot = beliefs
                .get_mut(entry.edge)
                .ok_or(CtpError::UnknownEdge(entry.edge))?;
            if entry.state == ConnectionState::Unknown
                && !(entry.probability.is_finite() && (0.0..=1.0).contains(&entry.probability))
            {
                return Err(CtpError::InvalidProbability {
                    edge: entry.edge,
                    probability: entry.probability,
                });
            }
            slot.state = entry.state;
            slot.probability = entry.probability;
        }

        Ok(BeliefVector::new(beliefs))
    }
}
