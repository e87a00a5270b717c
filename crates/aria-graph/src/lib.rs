//! The node-graph runtime: a registry of node handlers, a plain
//! state-machine executor with per-node retry and rollback, and the
//! diagnostic state-log sink.

pub mod error;
pub mod executor;
pub mod registry;
pub mod statelog;

pub use error::{GraphError, Result};
pub use executor::{GraphExecutor, MAX_NODE_RETRIES};
pub use registry::{NodeHandler, NodeRegistry, RegistryBuilder};
pub use statelog::StateLogSink;
