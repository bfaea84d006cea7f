pub mod beliefs;
pub mod error;
pub mod graph;
pub mod report;
pub mod solver;
pub mod space;
pub mod state;
pub mod update;

pub use beliefs::{BeliefBuilder, BeliefEntry, BeliefVector, ConnectionState, ConnectivityBelief};
pub use error::{CtpError, GraphInconsistency, Result};
pub use graph::{Edge, Graph, Vertex, VertexId};
pub use report::{Action, PolicyEntry, StateDisplay};
pub use solver::{solve, sweep, sweep_parallel, SolveReport, SolverConfig};
pub use space::StateSpace;
pub use state::{AugmentedState, StateId};
pub use update::Backup;

/// Core types
pub type F = f64;
