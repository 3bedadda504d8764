//! Trusted SQL identifiers.
//!
//! Table and column names are spliced into query text, so they must come from
//! a closed set: the fund-column mapping, the configuration file, or rows the
//! warehouse itself returned during catalog introspection. [`TrustedIdent`]
//! is the only identifier type the query builder accepts, and its constructors
//! are crate-private, so a request string cannot become one by accident.
//! Request values travel as bound parameters instead (see [`crate::query`]).

use std::fmt;

use thiserror::Error;

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENT_LEN: usize = 63;

/// Identifier rejected by [`TrustedIdent`] validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    /// Empty string.
    #[error("identifier cannot be empty")]
    Empty,
    /// Longer than [`MAX_IDENT_LEN`] bytes.
    #[error("identifier {0:?} is longer than {MAX_IDENT_LEN} bytes")]
    TooLong(String),
    /// Contains characters outside `[A-Za-z0-9_]` or starts with a digit.
    #[error("identifier {0:?} must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidChars(String),
}

/// A table, schema or column name from a trusted source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrustedIdent(String);

impl TrustedIdent {
    /// Validates a name coming from a trusted source (mapping, config, introspection).
    pub(crate) fn new(raw: impl Into<String>) -> Result<Self, IdentError> {
        let raw = raw.into();
        validate(&raw)?;
        Ok(Self(raw))
    }

    /// Wraps a compile-time constant. Constants are covered by unit tests.
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(validate(name).is_ok(), "invalid identifier constant {name}");
        Self(name.to_string())
    }

    /// Unquoted name, as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for splicing into query text.
    pub fn quoted(&self) -> String {
        // validation already excludes '"', the replace keeps quoting total
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for TrustedIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate(raw: &str) -> Result<(), IdentError> {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return Err(IdentError::Empty);
    };
    if raw.len() > MAX_IDENT_LEN {
        return Err(IdentError::TooLong(raw.to_string()));
    }
    let head_ok = first.is_ascii_alphabetic() || first == '_';
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(IdentError::InvalidChars(raw.to_string()))
    }
}
