use std::sync::Arc;

use miette::{NamedSource, SourceSpan};

use crate::source::SourceFile;

/// Position relative to start of source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a source.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u32,
}

impl Span {
    pub fn new(start: Idx, len: u32) -> Self {
        Span { start, len }
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        let start = self.start.0 as usize;
        let end = start + self.len as usize;
        start..end
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new((value.start.0 as usize).into(), value.len as usize)
    }
}

/// A line that pulled another file in through `icl`.
#[derive(Clone, Debug)]
pub struct IncludeSite {
    pub file: Arc<SourceFile>,
    pub line: usize,
}

/// Where a statement came from. Never mutated after creation.
#[derive(Clone, Debug)]
pub struct Location {
    pub file: Arc<SourceFile>,
    /// 1-based
    pub line: usize,
    /// Including files, outermost first.
    pub included_from: Arc<[IncludeSite]>,
}

impl Location {
    pub fn new(file: Arc<SourceFile>, line: usize, included_from: Arc<[IncludeSite]>) -> Self {
        Location {
            file,
            line,
            included_from,
        }
    }

    /// Literal text of the line, without the line terminator.
    pub fn source(&self) -> &str {
        self.file.line(self.line)
    }

    /// Span of the line's non-blank text inside the whole file.
    pub fn span(&self) -> Span {
        self.file.line_span(self.line)
    }

    /// The file's text under its base name, ready to attach to a report.
    pub fn named_source(&self) -> NamedSource<Arc<str>> {
        NamedSource::new(self.file.name(), self.file.text())
    }

    /// "included from" chain, innermost first.
    pub fn include_chain(&self) -> impl Iterator<Item = &IncludeSite> {
        self.included_from.iter().rev()
    }
}
