use std::fmt::{self, Display};
use std::sync::Arc;

use arcstr::ArcStr;
use miette::LabeledSpan;

use crate::location::{line_span, FileName};
use crate::net::InteractionKind;
use crate::trace::term::Term;
use crate::trace::MemOp;

/// The interaction a reference-count failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InteractionSite {
    pub idx: usize,
    pub kind: InteractionKind,
}

impl Display for InteractionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.idx, self.kind)
    }
}

/// Every way reconstruction or replay can fail. None of these are
/// recoverable: once raised, the graph built so far is a prefix of the
/// trace and nothing after the failing operation was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceError {
    MalformedTrace {
        line: usize,
        reason: String,
    },
    TruncatedTrace {
        line: usize,
        sequence: u64,
        location: u32,
        interaction: ArcStr,
        expected: &'static str,
    },
    UnmatchedPop {
        line: usize,
        sequence: u64,
        location: u32,
        interaction: ArcStr,
        neg: Term,
        pos: Term,
    },
    UnresolvedLocation {
        line: usize,
        sequence: u64,
        location: u32,
        interaction: ArcStr,
    },
    UnknownInteractionKind {
        line: Option<usize>,
        sequence: Option<u64>,
        name: ArcStr,
    },
    RefcountUnderflow {
        location: u32,
        /// The op or redex whose release went below zero; `None` inside a
        /// free cascade.
        sequence: Option<u64>,
        interaction: Option<InteractionSite>,
    },
    DoubleFree {
        location: u32,
        /// The write that made the node a free candidate.
        sequence: Option<u64>,
        interaction: Option<InteractionSite>,
    },
    AlreadyBooted,
    ReplayMismatch {
        sequence: u64,
        location: u32,
        interaction: ArcStr,
        expected: Option<Term>,
        found: Term,
    },
}

impl TraceError {
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedTrace { line, .. }
            | Self::TruncatedTrace { line, .. }
            | Self::UnmatchedPop { line, .. }
            | Self::UnresolvedLocation { line, .. } => Some(*line),
            Self::UnknownInteractionKind { line, .. } => *line,
            Self::RefcountUnderflow { .. }
            | Self::DoubleFree { .. }
            | Self::AlreadyBooted
            | Self::ReplayMismatch { .. } => None,
        }
    }

    /// Attaches the position of the op that raised an error found
    /// without one.
    pub(crate) fn at(self, memop: &MemOp) -> Self {
        match self {
            Self::UnknownInteractionKind { name, .. } => Self::UnknownInteractionKind {
                line: Some(memop.line),
                sequence: Some(memop.sequence),
                name,
            },
            other => other,
        }
    }

    pub fn to_report(&self, file: &FileName, source_code: Arc<str>) -> miette::Report {
        let labels: Vec<LabeledSpan> = self
            .line()
            .and_then(|line| line_span(&source_code, line).byte_range())
            .map(|range| vec![LabeledSpan::at(range, "here")])
            .unwrap_or_default();
        miette::miette!(labels = labels, "{}", self)
            .with_source_code(miette::NamedSource::new(file.as_str(), source_code))
    }
}

impl Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedTrace { line, reason } => {
                write!(f, "Malformed trace at line {}: {}.", line, reason)
            }
            Self::TruncatedTrace {
                line,
                sequence,
                location,
                interaction,
                expected,
            } => write!(
                f,
                "Truncated trace at line {} (op #{} at {} in `{}`): expected a second {}.",
                line, sequence, location, interaction, expected
            ),
            Self::UnmatchedPop {
                line,
                sequence,
                location,
                interaction,
                neg,
                pos,
            } => write!(
                f,
                "Pop of `{}` ~ `{}` at {} in `{}` (line {}, op #{}) has no matching push.",
                neg, pos, location, interaction, line, sequence
            ),
            Self::UnresolvedLocation {
                line,
                sequence,
                location,
                interaction,
            } => write!(
                f,
                "Location {} at line {} (op #{} in `{}`) does not belong to any node.",
                location, line, sequence, interaction
            ),
            Self::UnknownInteractionKind { name, sequence, .. } => {
                write!(f, "Unknown interaction kind `{}`", name)?;
                if let Some(sequence) = sequence {
                    write!(f, " (op #{})", sequence)?;
                }
                write!(f, ".")
            }
            Self::RefcountUnderflow {
                location,
                sequence,
                interaction,
            } => {
                write!(f, "Reference count of location {} would go negative", location)?;
                write_cause(f, *sequence, *interaction)?;
                write!(f, ".")
            }
            Self::DoubleFree {
                location,
                sequence,
                interaction,
            } => {
                write!(f, "Node at location {} was freed twice", location)?;
                write_cause(f, *sequence, *interaction)?;
                write!(f, ".")
            }
            Self::AlreadyBooted => write!(f, "Reference counts were already booted."),
            Self::ReplayMismatch {
                sequence,
                location,
                interaction,
                expected,
                found,
            } => match expected {
                Some(expected) => write!(
                    f,
                    "Replay of op #{} in `{}` wrote `{}` to location {}, \
                     but its history expects `{}`.",
                    sequence, interaction, found, location, expected
                ),
                None => write!(
                    f,
                    "Replay of op #{} in `{}` wrote `{}` to location {} \
                     past the end of its history.",
                    sequence, interaction, found, location
                ),
            },
        }
    }
}

fn write_cause(
    f: &mut fmt::Formatter<'_>,
    sequence: Option<u64>,
    interaction: Option<InteractionSite>,
) -> fmt::Result {
    match (sequence, interaction) {
        (Some(sequence), Some(site)) => {
            write!(f, " (op #{} in interaction {})", sequence, site)
        }
        (Some(sequence), None) => write!(f, " (op #{})", sequence),
        (None, Some(site)) => write!(f, " (in interaction {})", site),
        (None, None) => Ok(()),
    }
}

impl std::error::Error for TraceError {}

pub fn set_miette_hook() {
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .context_lines(1)
                .build(),
        )
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_labels_offending_line() {
        let source: Arc<str> = Arc::from("0,0,______,STOR,0,REF,0,0\nbad line\n");
        let error = TraceError::MalformedTrace {
            line: 2,
            reason: "expected at least 7 fields, found 1".into(),
        };
        let report = error.to_report(&"t.trace".into(), source);
        let labels: Vec<_> = report.labels().into_iter().flatten().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 26);
        assert_eq!(labels[0].len(), "bad line".len());
    }

    #[test]
    fn unknown_kind_picks_up_position() {
        let memop = crate::trace::Decoder::new()
            .decode_line("7,0,ERAREF,POP,0,ERA,0,100000", 9)
            .unwrap();
        let error = TraceError::UnknownInteractionKind {
            line: None,
            sequence: None,
            name: ArcStr::from("ERAREF"),
        }
        .at(&memop);
        assert_eq!(error.line(), Some(9));
        assert_eq!(error.to_string(), "Unknown interaction kind `ERAREF` (op #0).");
    }

    #[test]
    fn refcount_errors_name_their_cause() {
        let site = Some(InteractionSite {
            idx: 3,
            kind: InteractionKind::MatRef,
        });
        let error = TraceError::DoubleFree {
            location: 8,
            sequence: Some(21),
            interaction: site,
        };
        assert_eq!(
            error.to_string(),
            "Node at location 8 was freed twice (op #21 in interaction #3 MATREF)."
        );
        let error = TraceError::RefcountUnderflow {
            location: 4,
            sequence: None,
            interaction: site,
        };
        assert_eq!(
            error.to_string(),
            "Reference count of location 4 would go negative (in interaction #3 MATREF)."
        );
    }
}
