//! JSON-Pointer style paths into a configuration body.
//!
//! `/tags/Name` addresses the `Name` key of the `tags` attribute. Segments
//! use the RFC 6901 escapes: `~1` for `/` and `~0` for `~`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointerError {
    #[error("path is empty")]
    Empty,

    #[error("path '{input}' must start with '/'")]
    NotAbsolute { input: String },

    #[error("path '{input}' has no segments")]
    NoSegments { input: String },
}

/// One path segment, kept both as written and decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerToken {
    raw: String,
    decoded: String,
}

impl PointerToken {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            decoded: unescape_segment(raw),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn decoded(&self) -> &str {
        &self.decoded
    }
}

/// A parsed pointer with at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerPath {
    tokens: Vec<PointerToken>,
}

impl PointerPath {
    pub fn parse(input: &str) -> Result<Self, PointerError> {
        if input.is_empty() {
            return Err(PointerError::Empty);
        }
        let Some(rest) = input.strip_prefix('/') else {
            return Err(PointerError::NotAbsolute {
                input: input.to_string(),
            });
        };
        if rest.is_empty() {
            return Err(PointerError::NoSegments {
                input: input.to_string(),
            });
        }
        Ok(Self {
            tokens: rest.split('/').map(PointerToken::new).collect(),
        })
    }

    pub fn tokens(&self) -> &[PointerToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The final segment and the segments leading to it.
    pub fn split_last(&self) -> Option<(&PointerToken, &[PointerToken])> {
        self.tokens.split_last()
    }

    pub fn last(&self) -> Option<&PointerToken> {
        self.tokens.last()
    }

    /// Pointer text of the first `len` segments, for error messages.
    pub fn prefix(&self, len: usize) -> String {
        let mut out = String::new();
        for token in self.tokens.iter().take(len) {
            out.push('/');
            out.push_str(token.raw());
        }
        out
    }
}

impl fmt::Display for PointerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix(self.tokens.len()))
    }
}

impl FromStr for PointerPath {
    type Err = PointerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// Decode `~1` to `/` and `~0` to `~`. Other `~` sequences are left as is.
pub fn unescape_segment(segment: &str) -> String {
    if !segment.contains('~') {
        return segment.to_string();
    }
    segment.replace("~1", "/").replace("~0", "~")
}

pub fn escape_segment(segment: &str) -> String {
    if !segment.contains('/') && !segment.contains('~') {
        return segment.to_string();
    }
    segment.replace('~', "~0").replace('/', "~1")
}
