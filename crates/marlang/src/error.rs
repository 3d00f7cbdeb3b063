use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The grammar failed to match, or a semantic action refused its input.
    Syntax,
    /// Invalid UTF-8 (or a byte order mark) in the source.
    Encoding,
    /// A record or union repeats a label.
    DuplicateField,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{filename}:{line}:{col} ({offset}): {rule}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub filename: String,
    pub line: u32,
    pub col: u32,
    pub offset: usize,
    pub rule: String,
    pub message: String,
}

/// The accumulated, deduplicated parse failures of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseErrors(Vec<ParseError>);

impl ParseErrors {
    pub fn new(mut errors: Vec<ParseError>) -> ParseErrors {
        let mut seen = std::collections::HashSet::new();
        errors.retain(|e| seen.insert(e.to_string()));
        ParseErrors(errors)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&ParseError> {
        self.0.first()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}
