use super::schema::{Mode, ValueKind};
use crate::document::{ParseError, SourcePos};
use crate::pointer::PointerError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a single operation against a single resource body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("invalid target at {path}: cannot descend into a {found}")]
    InvalidTarget { path: String, found: &'static str },

    #[error("path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("illegal index at {path}: only -1 can add to a list")]
    IllegalIndex { path: String },

    #[error("{path} takes a {expected} value, got a {found}")]
    ValueKindMismatch {
        path: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{mode} {path} has no value")]
    MissingValue { mode: Mode, path: String },
}

/// Closest known name to a misspelled one, rendered as a trailing hint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Suggestion(pub Option<String>);

impl Suggestion {
    pub fn closest(input: &str, candidates: &[&str]) -> Self {
        let limit = (input.len() / 3).max(2);
        Self(
            candidates
                .iter()
                .map(|candidate| (strsim::levenshtein(input, candidate), *candidate))
                .filter(|(distance, _)| *distance <= limit)
                .min_by_key(|(distance, _)| *distance)
                .map(|(_, candidate)| candidate.to_string()),
        )
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, " (did you mean '{name}'?)"),
            None => Ok(()),
        }
    }
}

/// A spec file that parses as HCL but does not describe patches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecParseError {
    #[error("{pos}: unexpected attribute '{name}' in {context}{hint}")]
    UnexpectedAttribute {
        pos: SourcePos,
        name: String,
        context: String,
        hint: Suggestion,
    },

    #[error("{pos}: unexpected block '{name}' in {context}{hint}")]
    UnexpectedBlock {
        pos: SourcePos,
        name: String,
        context: String,
        hint: Suggestion,
    },

    #[error("{pos}: unknown operation '{name}'{hint}")]
    UnknownMode {
        pos: SourcePos,
        name: String,
        hint: Suggestion,
    },

    #[error("{pos}: {keyword} block expects {expected} label(s), found {found}")]
    WrongLabelCount {
        pos: SourcePos,
        keyword: String,
        expected: usize,
        found: usize,
    },

    #[error("{pos}: {context} requires a '{name}' attribute")]
    MissingAttribute {
        pos: SourcePos,
        context: String,
        name: &'static str,
    },

    #[error("{pos}: attribute '{name}' must be {expected}")]
    InvalidAttributeType {
        pos: SourcePos,
        name: String,
        expected: &'static str,
    },

    #[error("{pos}: unknown path syntax '{value}'{hint}")]
    UnknownPathSyntax {
        pos: SourcePos,
        value: String,
        hint: Suggestion,
    },

    #[error("{pos}: invalid path: {source}")]
    InvalidPath {
        pos: SourcePos,
        #[source]
        source: PointerError,
    },

    #[error("{pos}: {mode} block requires either a value attribute or a value block")]
    MissingValue { pos: SourcePos, mode: Mode },

    #[error("{pos}: {mode} block must have exactly one value, found {found}")]
    AmbiguousValue {
        pos: SourcePos,
        mode: Mode,
        found: usize,
    },

    #[error("{pos}: {selector} block requires at least one operation block")]
    EmptySelector { pos: SourcePos, selector: String },
}

#[derive(Debug)]
pub enum SpecLoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        source: ParseError,
    },
    Spec {
        path: Option<PathBuf>,
        source: SpecParseError,
    },
}

impl SpecLoadError {
    pub(crate) fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            SpecLoadError::Io { .. } => self,
            SpecLoadError::Parse { path: None, source } => SpecLoadError::Parse {
                path: Some(path),
                source,
            },
            SpecLoadError::Spec { path: None, source } => SpecLoadError::Spec {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for SpecLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecLoadError::Io { path, source } => {
                write!(f, "failed to read tap config from {}: {}", path.display(), source)
            }
            SpecLoadError::Parse { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse tap config ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse tap config: {}", source),
            },
            SpecLoadError::Spec { path, source } => match path {
                Some(path) => write!(f, "invalid tap config ({}): {}", path.display(), source),
                None => write!(f, "invalid tap config: {}", source),
            },
        }
    }
}

impl std::error::Error for SpecLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpecLoadError::Io { source, .. } => Some(source),
            SpecLoadError::Parse { source, .. } => Some(source),
            SpecLoadError::Spec { source, .. } => Some(source),
        }
    }
}

impl From<SpecParseError> for SpecLoadError {
    fn from(source: SpecParseError) -> Self {
        SpecLoadError::Spec { path: None, source }
    }
}

impl From<ParseError> for SpecLoadError {
    fn from(source: ParseError) -> Self {
        SpecLoadError::Parse { path: None, source }
    }
}
