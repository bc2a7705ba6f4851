use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{file}: {message}")]
    Syntax { file: String, message: String },

    #[error("{file}:{line}: attribute '{name}' was already defined at line {first_line}")]
    DuplicateAttribute {
        file: String,
        line: usize,
        name: String,
        first_line: usize,
    },
}

impl ParseError {
    pub(crate) fn syntax(file: &str, error: impl ToString) -> Self {
        ParseError::Syntax {
            file: file.to_string(),
            message: error.to_string(),
        }
    }

    pub fn file(&self) -> &str {
        match self {
            ParseError::Syntax { file, .. } | ParseError::DuplicateAttribute { file, .. } => file,
        }
    }
}

/// A tree that cannot be written as HCL text.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Format(#[from] hcl::Error),
}
