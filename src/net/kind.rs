use std::fmt::Display;

use arcstr::ArcStr;
use serde::Serialize;

use super::graph::Side;
use crate::error::TraceError;

/// The closed set of interactions the trace can classify a popped redex as.
///
/// The name of a kind is the concatenation of the tags of the redex it
/// consumes, negative side first (`APP` ~ `REF` is `APPREF`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InteractionKind {
    /// Application of a definition reference; expands the definition.
    AppRef,
    AppLam,
    DupU32,
    OpxU32,
    OpyU32,
    /// Numeric match. Expands a fresh node when the number is non-zero.
    MatU32,
    MatRef,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 7] = [
        Self::AppRef,
        Self::AppLam,
        Self::DupU32,
        Self::OpxU32,
        Self::OpyU32,
        Self::MatU32,
        Self::MatRef,
    ];

    pub fn classify(name: &str) -> Result<Self, TraceError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| TraceError::UnknownInteractionKind {
                line: None,
                sequence: None,
                name: ArcStr::from(name),
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AppRef => "APPREF",
            Self::AppLam => "APPLAM",
            Self::DupU32 => "DUPU32",
            Self::OpxU32 => "OPXU32",
            Self::OpyU32 => "OPYU32",
            Self::MatU32 => "MATU32",
            Self::MatRef => "MATREF",
        }
    }

    /// Whether interactions of this kind can own nodes.
    pub fn expands(&self) -> bool {
        matches!(self, Self::AppRef | Self::MatU32)
    }

    pub fn is_numeric_match(&self) -> bool {
        matches!(self, Self::MatU32)
    }

    /// What a slot means to an interaction of this kind, given which side
    /// of its node the slot is.
    pub fn role(&self, side: Side) -> &'static str {
        match (self, side) {
            (Self::AppRef, Side::Neg) => "arg",
            (Self::AppRef, Side::Pos) => "ret",
            (Self::AppLam, Side::Neg) => "var",
            (Self::AppLam, Side::Pos) => "bod",
            (Self::DupU32, _) => "dup",
            (Self::OpxU32, _) => "opx",
            (Self::OpyU32, _) => "opy",
            (Self::MatU32, _) => "mat",
            (Self::MatRef, _) => "matref",
        }
    }
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
