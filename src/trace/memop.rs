use std::fmt::{self, Display};

use arcstr::ArcStr;
use serde::Serialize;

use super::term::{Tag, Term};

/// Interaction name used by the boot sequence.
pub const ROOT_INTERACTION: &str = "______";
/// Interaction name of a definition expansion.
pub const APPREF_INTERACTION: &str = "APPREF";
/// Locations at or above this belong to the ephemeral redex stack rather
/// than node memory.
pub const REDEX_STACK_BASE: u32 = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OpKind {
    Store,
    Load,
    Pop,
    Exchange,
}

impl OpKind {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "STOR" => Some(Self::Store),
            "LOAD" => Some(Self::Load),
            "POP" => Some(Self::Pop),
            "EXCH" => Some(Self::Exchange),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::Store => "STOR",
            Self::Load => "LOAD",
            Self::Pop => "POP",
            Self::Exchange => "EXCH",
        }
    }
}

/// One decoded line of the trace.
#[derive(Clone, Debug, PartialEq)]
pub struct MemOp {
    /// Position in the trace; authoritative for ordering.
    pub sequence: u64,
    /// 1-based source line, for diagnostics.
    pub line: usize,
    pub thread_id: u32,
    pub interaction_name: ArcStr,
    pub kind: OpKind,
    pub level: u32,
    pub location: u32,
    pub put: Option<Term>,
    pub got: Option<Term>,
}

impl MemOp {
    pub fn is_take(&self) -> bool {
        self.kind == OpKind::Exchange && self.put.is_some_and(|t| t.is_taken())
    }

    pub fn is_swap(&self) -> bool {
        self.kind == OpKind::Exchange && self.put.is_some_and(|t| !t.is_taken())
    }

    pub fn is_root_interaction(&self) -> bool {
        &*self.interaction_name == ROOT_INTERACTION
    }

    pub fn is_appref_interaction(&self) -> bool {
        &*self.interaction_name == APPREF_INTERACTION
    }

    /// `MAT` followed by a numeric tag, e.g. `MATU32`.
    pub fn is_matnum_interaction(&self) -> bool {
        let name = &*self.interaction_name;
        name.len() == 6
            && name.starts_with("MAT")
            && Tag::parse(&name[3..]).is_some_and(|t| t.is_numeric())
    }

    pub fn in_redex_stack(&self) -> bool {
        self.location >= REDEX_STACK_BASE
    }

    /// A store that writes the initial value of a root or expanded node.
    pub fn is_node_store(&self) -> bool {
        self.kind == OpKind::Store
            && !self.in_redex_stack()
            && (self.is_root_interaction() || self.is_appref_interaction())
    }

    pub fn is_push(&self) -> bool {
        self.kind == OpKind::Store && self.in_redex_stack()
    }
}

impl Display for MemOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind.token(), self.level)?;
        if let Some(got) = self.got {
            write!(f, ",{},{}", got.tag, got.location)?;
        }
        if let Some(put) = self.put {
            write!(f, ",{},{}", put.tag, put.location)?;
        }
        write!(f, ",{}", self.location)
    }
}
