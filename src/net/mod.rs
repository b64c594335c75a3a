//! The linked side of the pipeline: refs, nodes, redexes and interactions
//! rebuilt from decoded operations, all owned by one [`Graph`].

pub mod arena;
pub mod builder;
pub mod graph;
pub mod kind;
pub mod redex;
pub mod show;
pub mod snapshot;
pub mod stats;

pub use builder::{make_all, InteractionBuilder, Reconstructor, RefBuilder};
pub use graph::{
    ref_name, ExpandRef, Graph, Interaction, InteractionId, Node, NodeId, Op, OpId, Redex,
    RedexId, RefId, Side, Slot, SlotRef,
};
pub use kind::InteractionKind;
pub use redex::RedexMatcher;
pub use show::{Showable, Shower};
pub use snapshot::Snapshot;
pub use stats::Stats;
