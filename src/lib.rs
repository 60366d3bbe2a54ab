pub mod candidates;
pub mod commands;
pub mod compile;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;
pub mod matching;
pub mod oracle;
pub mod rules;

pub use candidates::{Candidate, CandidateSet};
pub use commands::SpecialCommand;
pub use compile::{DiagnosticsEvent, EditPlan, ImportReport};
pub use config::Settings;
pub use document::{RopeDocument, TextDocument};
pub use engine::SnippetEngine;
pub use error::{EngineError, Result};
pub use host::EditorHost;
pub use oracle::{CodeFix, DisabledOracle, SyntaxKind, SyntaxOracle};
