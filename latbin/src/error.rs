use thiserror::Error;

/// Malformed line inside a single text record.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Failures while opening, reading or writing a keyed archive. All of these
/// are fatal for a run.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed archive {path}, {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error("invalid specifier '{spec}': {message}")]
    Specifier { spec: String, message: String },
    #[error("unsupported archive format in '{spec}': {message}")]
    UnsupportedFormat { spec: String, message: String },
    #[error("invalid key '{0}': keys must be non-empty and contain no whitespace")]
    InvalidKey(String),
}

impl TableError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<String>, source: ParseError) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn specifier(spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Specifier {
            spec: spec.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            spec: spec.into(),
            message: message.into(),
        }
    }
}
