//! The flat side of the pipeline: terms, decoded memory operations, and
//! the line decoder that produces them.
//!
//! A trace is one operation per line, comma-separated:
//!
//! ```text
//! counter,thread,interaction,op,level,<payload...>
//! ```
//!
//! where the payload depends on `op`: `STOR` carries `tag,loc,mem_loc`,
//! `LOAD`/`POP` carry `got_tag,got_loc,mem_loc`, and `EXCH` carries
//! `got_tag,got_loc,put_tag,put_loc,mem_loc`.

pub mod decoder;
pub mod memop;
pub mod term;

pub use decoder::{decode, Decoder};
pub use memop::{MemOp, OpKind, REDEX_STACK_BASE};
pub use term::{Tag, Term};
