use std::fmt::{self, Display};

use serde::Serialize;

/// A term tag, stored as its (at most) three ASCII characters.
///
/// Trace files spell tags with three characters, so tags compare and hash
/// as plain byte triples.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag([u8; 3]);

impl Tag {
    pub const VAR: Tag = Tag(*b"VAR");
    pub const SUB: Tag = Tag(*b"SUB");
    pub const ERA: Tag = Tag(*b"ERA");
    pub const LAM: Tag = Tag(*b"LAM");
    pub const APP: Tag = Tag(*b"APP");
    pub const SUP: Tag = Tag(*b"SUP");
    pub const DUP: Tag = Tag(*b"DUP");
    pub const OPX: Tag = Tag(*b"OPX");
    pub const OPY: Tag = Tag(*b"OPY");
    pub const MAT: Tag = Tag(*b"MAT");
    pub const REF: Tag = Tag(*b"REF");
    pub const U32: Tag = Tag(*b"U32");
    pub const I32: Tag = Tag(*b"I32");
    pub const F32: Tag = Tag(*b"F32");
    /// The slot was exclusively taken and awaits a future write.
    pub const TAKEN: Tag = Tag(*b"___");
    /// No value; only ever written by replay, never by a trace.
    pub const EMPTY: Tag = Tag(*b"EMP");

    /// Tags whose `location` field points at a node.
    const LOCATED: [Tag; 8] = [
        Tag::VAR,
        Tag::LAM,
        Tag::APP,
        Tag::SUP,
        Tag::DUP,
        Tag::OPX,
        Tag::OPY,
        Tag::MAT,
    ];
    const NUMERIC: [Tag; 3] = [Tag::U32, Tag::I32, Tag::F32];

    /// Parses a tag of one to three ASCII characters. Longer codes are
    /// truncated to their first three characters.
    pub fn parse(code: &str) -> Option<Tag> {
        let code = code.trim();
        if code.is_empty() || !code.is_ascii() {
            return None;
        }
        let mut bytes = [b' '; 3];
        for (dst, src) in bytes.iter_mut().zip(code.bytes()) {
            *dst = src;
        }
        Some(Tag(bytes))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???").trim_end()
    }

    pub fn has_location(&self) -> bool {
        Self::LOCATED.contains(self)
    }

    pub fn is_numeric(&self) -> bool {
        Self::NUMERIC.contains(self)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Tag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Term {
    pub tag: Tag,
    pub label: u32,
    pub location: u32,
}

impl Term {
    pub const EMPTY: Term = Term::new(Tag::EMPTY, 0, 0);
    pub const TAKEN: Term = Term::new(Tag::TAKEN, 0, 0);

    pub const fn new(tag: Tag, label: u32, location: u32) -> Self {
        Self {
            tag,
            label,
            location,
        }
    }

    /// The node location this term points at, if its tag carries one.
    pub fn located(&self) -> Option<u32> {
        self.tag.has_location().then_some(self.location)
    }

    pub fn is_taken(&self) -> bool {
        self.tag == Tag::TAKEN
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{:03},{:04}", self.tag, self.label, self.location)
    }
}
