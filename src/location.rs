use std::path::Path;

use arcstr::ArcStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    // 0-based
    pub offset: u32,
    // 0-based
    pub row: u32,
    // 0-based
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Span {
    #[default]
    None,
    At { start: Point, end: Point },
}

impl Span {
    pub fn len(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::At { start, end, .. } => end.offset - start.offset,
        }
    }

    pub fn points(&self) -> Option<(Point, Point)> {
        match self {
            Self::None => None,
            Self::At { start, end, .. } => Some((*start, *end)),
        }
    }

    /// Byte range suitable for a `miette` label.
    pub fn byte_range(&self) -> Option<std::ops::Range<usize>> {
        self.points()
            .map(|(s, e)| s.offset as usize..e.offset as usize)
    }
}

/// The span covering the given 1-based line of `source`, without its line terminator.
///
/// Returns `Span::None` if the source has fewer lines.
pub fn line_span(source: &str, line: usize) -> Span {
    let mut offset = 0usize;
    for (row, text) in source.split_inclusive('\n').enumerate() {
        if row + 1 == line {
            let content = text.trim_end_matches(['\n', '\r']);
            let start = Point {
                offset: offset as u32,
                row: row as u32,
                column: 0,
            };
            let end = Point {
                offset: (offset + content.len()) as u32,
                row: row as u32,
                column: content.chars().count() as u32,
            };
            return Span::At { start, end };
        }
        offset += text.len();
    }
    Span::None
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(pub ArcStr);

impl FileName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileName {
    fn from(path: &str) -> Self {
        FileName(path.into())
    }
}

impl From<&Path> for FileName {
    fn from(path: &Path) -> Self {
        (&*path.to_string_lossy()).into()
    }
}
