//! Error types for the snippet engine.
//!
//! Most failure paths in the engine are recovered locally (see the
//! individual modules); the variants here are what escapes to callers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A snippet declaration could not be turned into a rule.
    #[error("invalid snippet `{snippet}`: {reason}")]
    InvalidRule { snippet: String, reason: String },

    #[error("invalid regex `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid glob `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The syntax oracle could not answer (process gone, disabled, timed out).
    #[error("syntax oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("failed to watch manifests: {0}")]
    Watch(#[from] notify::Error),

    /// A special command was dispatched under a name the engine does not know.
    #[error("unknown snippets command `{0}`")]
    UnknownCommand(String),

    #[error("document {0} is not open")]
    DocumentNotOpen(String),

    #[error("no {kind} snippet named `{name}`")]
    UnknownSnippet { kind: &'static str, name: String },
}

impl EngineError {
    pub(crate) fn invalid_rule(snippet: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            snippet: snippet.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
