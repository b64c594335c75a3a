//! Rebuilds the execution of an interaction-net runtime from its flat
//! memory-operation trace, and replays it with simulated reference counting.

pub mod error;
pub mod location;
pub mod net;
pub mod refcount;
pub mod replay;
pub mod trace;

#[cfg(test)]
mod test;

pub use error::TraceError;
pub use net::{make_all, Graph};
pub use refcount::RefCounts;
pub use replay::{Replay, Step};

/// Decodes and reconstructs a whole trace.
pub fn reconstruct(source: &str) -> Result<Graph, TraceError> {
    make_all(trace::decode(source)?)
}
