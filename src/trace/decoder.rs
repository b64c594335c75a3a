use arcstr::ArcStr;
use indexmap::IndexSet;

use super::memop::{MemOp, OpKind};
use super::term::{Tag, Term};
use crate::error::TraceError;

/// Fields shared by every line: counter, thread, interaction, op, level,
/// plus at least two payload fields.
const MIN_FIELDS: usize = 7;

/// Turns trace lines into [`MemOp`]s.
///
/// Sequence numbers are assigned here, in line order; the producer's own
/// counter (field 0) is ignored. Interaction names are interned so every
/// op of the same interaction shares one allocation.
#[derive(Default)]
pub struct Decoder {
    names: IndexSet<ArcStr>,
    sequence: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, name: &str) -> ArcStr {
        if let Some(existing) = self.names.get(name) {
            return existing.clone();
        }
        let name = ArcStr::from(name);
        self.names.insert(name.clone());
        name
    }

    pub fn decode_line(&mut self, text: &str, line: usize) -> Result<MemOp, TraceError> {
        let fields = Fields {
            parts: text.split(',').collect(),
            line,
        };
        if fields.parts.len() < MIN_FIELDS {
            return Err(fields.malformed(format!(
                "expected at least {} fields, found {}",
                MIN_FIELDS,
                fields.parts.len()
            )));
        }

        let thread_id = fields.number(1, "thread id")?;
        let interaction_name = self.intern(fields.parts[2].trim());
        let kind = OpKind::parse(fields.parts[3]).ok_or_else(|| {
            fields.malformed(format!("unknown operation `{}`", fields.parts[3].trim()))
        })?;
        let level = fields.number(4, "level")?;

        let (got, put, location) = match kind {
            OpKind::Store => (None, Some(fields.term(5, "put")?), fields.number(7, "location")?),
            OpKind::Load | OpKind::Pop => {
                (Some(fields.term(5, "got")?), None, fields.number(7, "location")?)
            }
            OpKind::Exchange => (
                Some(fields.term(5, "got")?),
                Some(fields.term(7, "put")?),
                fields.number(9, "location")?,
            ),
        };

        let sequence = self.sequence;
        self.sequence += 1;
        Ok(MemOp {
            sequence,
            line,
            thread_id,
            interaction_name,
            kind,
            level,
            location,
            put,
            got,
        })
    }

    /// Decodes a whole trace. Blank lines are skipped but still count
    /// towards line numbers.
    pub fn decode(&mut self, source: &str) -> Result<Vec<MemOp>, TraceError> {
        let mut ops = Vec::new();
        for (index, text) in source.lines().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            ops.push(self.decode_line(text, index + 1)?);
        }
        tracing::debug!(
            "decoded {} memory operations across {} interaction names",
            ops.len(),
            self.names.len()
        );
        Ok(ops)
    }
}

struct Fields<'a> {
    parts: Vec<&'a str>,
    line: usize,
}

impl Fields<'_> {
    fn malformed(&self, reason: String) -> TraceError {
        TraceError::MalformedTrace {
            line: self.line,
            reason,
        }
    }

    fn get(&self, index: usize, what: &str) -> Result<&str, TraceError> {
        self.parts
            .get(index)
            .map(|s| s.trim())
            .ok_or_else(|| self.malformed(format!("missing {} (field {})", what, index)))
    }

    fn number(&self, index: usize, what: &str) -> Result<u32, TraceError> {
        let field = self.get(index, what)?;
        field
            .parse()
            .map_err(|_| self.malformed(format!("{} `{}` is not a number", what, field)))
    }

    /// A tag at `index` followed by its location at `index + 1`.
    fn term(&self, index: usize, what: &str) -> Result<Term, TraceError> {
        let tag = self.get(index, what)?;
        let tag = Tag::parse(tag)
            .ok_or_else(|| self.malformed(format!("{} tag `{}` is not a valid tag", what, tag)))?;
        let location = self.number(index + 1, what)?;
        Ok(Term::new(tag, 0, location))
    }
}

pub fn decode(source: &str) -> Result<Vec<MemOp>, TraceError> {
    Decoder::new().decode(source)
}
