use std::fmt;

use marlang::{Fetchable, ParseErrors};
use thiserror::Error;

/// A fetcher-level failure, before resolution policy is applied.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("environment variable {0} is not set")]
    EnvUnset(String),
    #[error("{0} escapes the import sandbox")]
    Sandbox(String),
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("import cycle: {0} is already being resolved")]
    Cycle(String),
    #[error("{0}")]
    Cors(String),
    #[error("integrity check failed: expected sha256:{want}, got sha256:{got}")]
    Integrity { want: String, got: String },
    #[error("imported expression has free variables")]
    UnboundImport,
    #[error("cannot resolve the missing import")]
    Missing,
    #[error("fetch failed: {0}")]
    Fetch(FetchError),
    #[error("fetch timed out")]
    Timeout,
    #[error("import resolution cancelled")]
    Cancelled,
    #[error("imported code failed to parse: {0}")]
    Parse(ParseErrors),
    #[error("import chain deeper than {0}")]
    TooDeep(usize),
}

impl From<FetchError> for ErrorKind {
    fn from(e: FetchError) -> ErrorKind {
        match e {
            FetchError::Timeout => ErrorKind::Timeout,
            other => ErrorKind::Fetch(other),
        }
    }
}

/// A resolution failure plus the chain of import targets that led to it,
/// innermost first.
#[derive(Debug)]
pub struct ResolveError {
    pub kind: ErrorKind,
    pub chain: Vec<String>,
}

impl ResolveError {
    pub fn new(kind: impl Into<ErrorKind>) -> ResolveError {
        ResolveError { kind: kind.into(), chain: Vec::new() }
    }

    pub(crate) fn in_import(mut self, target: &Fetchable) -> ResolveError {
        self.chain.push(target.to_string());
        self
    }

    /// Whether the import-alternative operator `?` may fall back to its
    /// right operand after this failure.
    pub fn recoverable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Cycle(_)
                | ErrorKind::Cors(_)
                | ErrorKind::Integrity { .. }
                | ErrorKind::Missing
                | ErrorKind::Fetch(_)
                | ErrorKind::Parse(_)
        )
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for target in &self.chain {
            write!(f, "\n  in {target}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
