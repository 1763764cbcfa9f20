use std::{fmt::Display, ops::Range};

use grader_syntax::lexer::LineMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Position in the rendered source.
/// Lines and columns start at 1, the offset is in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub position: Option<SourcePosition>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            position: None,
            source: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn in_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{source}:")?;
        }
        if let Some(pos) = &self.position {
            write!(f, "{}:{}:", pos.line, pos.column)?;
        }
        if self.source.is_some() || self.position.is_some() {
            write!(f, " ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Ordered collection of diagnostics produced by a single compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.severity == severity)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for d in &self.entries {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}

/// Collects diagnostics for one source text, translating spans to positions.
pub struct Reporter<'source> {
    lines: LineMap<'source>,
    source_name: String,
    diagnostics: Diagnostics,
}

impl<'source> Reporter<'source> {
    pub fn new(source: &'source str, source_name: impl Into<String>) -> Self {
        Self::with_lines(LineMap::of(source), source_name)
    }

    /// Reuses the lines found while parsing.
    pub fn with_lines(lines: LineMap<'source>, source_name: impl Into<String>) -> Self {
        Self {
            lines,
            source_name: source_name.into(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn position(&self, offset: usize) -> SourcePosition {
        let location = self.lines.location(offset);
        SourcePosition {
            line: location.line,
            column: location.column,
            offset,
        }
    }

    pub fn report(&mut self, severity: Severity, span: Range<usize>, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(severity, message)
            .at(self.position(span.start))
            .in_source(self.source_name.clone());
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, span: Range<usize>, message: impl Into<String>) {
        self.report(Severity::Error, span, message)
    }

    pub fn warning(&mut self, span: Range<usize>, message: impl Into<String>) {
        self.report(Severity::Warning, span, message)
    }

    /// Notes are not tied to a position.
    pub fn note(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(Severity::Note, message).in_source(self.source_name.clone());
        self.diagnostics.push(diagnostic);
    }

    pub fn line(&self, offset: usize) -> usize {
        self.lines.line(offset)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}
