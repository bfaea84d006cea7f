//! Error types for state-space construction and value updates.

use crate::{StateId, VertexId};
use thiserror::Error;

/// The state space handed to the update operator contradicts itself.
///
/// These are construction bugs in whatever built the graph and the states,
/// never a legitimate outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphInconsistency {
    #[error("no edge between {from} and {to}")]
    MissingEdge { from: VertexId, to: VertexId },

    #[error("belief vector of state {neighbor} has length {found}, expected {expected}")]
    LengthMismatch {
        neighbor: StateId,
        expected: usize,
        found: usize,
    },

    #[error("state {0} is not part of this state space")]
    UnknownState(StateId),

    #[error("no state at {location} matches the expected belief vector")]
    MissingSuccessor { location: VertexId },
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CtpError {
    #[error("graph inconsistency: {0}")]
    GraphInconsistency(#[from] GraphInconsistency),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("invalid probability {probability} for edge {edge}")]
    InvalidProbability { edge: usize, probability: f64 },

    #[error("edge {0} does not exist")]
    UnknownEdge(usize),

    #[error("vertex {0} does not exist")]
    UnknownVertex(VertexId),

    #[error("{count} unknown edges exceed the limit of {limit}")]
    TooManyUnknowns { count: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, CtpError>;
