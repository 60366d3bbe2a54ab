//! Syntax oracle abstraction.
//!
//! The engine asks an external language service what kind of syntax sits at a
//! position and which code fixes exist for a range. Answers are optional
//! enrichment: every caller degrades to a permissive default when the oracle
//! is disabled or failing.

use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{Range, TextEdit, Url};
use tracing::{debug, warn};

use crate::document::TextDocument;
use crate::error::{EngineError, Result};

/// Kind of syntax node enclosing an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxKind {
    String,
    Comment,
    Type,
    Other,
}

/// A fix offered for an unresolved identifier.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeFix {
    pub identifier: String,
    /// Module the fix imports from.
    pub module: String,
    /// Empty when the service only names the module.
    pub edits: Vec<TextEdit>,
}

/// Common interface for syntax services.
#[async_trait::async_trait]
pub trait SyntaxOracle: Send + Sync {
    /// Classify the char `offset` of the file at `path`; `line` is the offset's line.
    async fn classify(&self, path: &Path, line: u32, offset: usize) -> Result<SyntaxKind>;

    /// Fixes available for the diagnostic covering `range`.
    async fn code_fixes(&self, path: &Path, range: Range) -> Result<Vec<CodeFix>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Oracle used when syntax queries are turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledOracle;

#[async_trait::async_trait]
impl SyntaxOracle for DisabledOracle {
    async fn classify(&self, _path: &Path, _line: u32, _offset: usize) -> Result<SyntaxKind> {
        Err(EngineError::OracleUnavailable("syntax oracle disabled".into()))
    }

    async fn code_fixes(&self, _path: &Path, _range: Range) -> Result<Vec<CodeFix>> {
        Err(EngineError::OracleUnavailable("syntax oracle disabled".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OracleKey {
    uri: Url,
    version: i32,
    offset: usize,
}

/// Single-slot memo of the last successful classification.
#[derive(Debug, Default)]
pub struct OracleMemo {
    slot: Mutex<Option<(OracleKey, SyntaxKind)>>,
}

impl OracleMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    fn get(&self, key: &OracleKey) -> Option<SyntaxKind> {
        match &*self.slot.lock() {
            Some((cached, kind)) if cached == key => Some(*kind),
            _ => None,
        }
    }

    fn store(&self, key: OracleKey, kind: SyntaxKind) {
        *self.slot.lock() = Some((key, kind));
    }
}

/// Classify `offset` in `document`, reusing the memo when the key matches.
///
/// `None` means the oracle could not answer; failures are not memoized.
pub async fn classify_memoized(
    oracle: &dyn SyntaxOracle,
    memo: &OracleMemo,
    document: &dyn TextDocument,
    line: u32,
    offset: usize,
) -> Option<SyntaxKind> {
    let key = OracleKey {
        uri: document.uri().clone(),
        version: document.version(),
        offset,
    };
    if let Some(kind) = memo.get(&key) {
        debug!("Oracle memo hit for {} @ {}", key.uri, offset);
        return Some(kind);
    }

    let Some(path) = document.path() else {
        debug!("No file path for {}, skipping {} oracle", key.uri, oracle.name());
        return None;
    };
    match oracle.classify(&path, line, offset).await {
        Ok(kind) => {
            memo.store(key, kind);
            Some(kind)
        }
        Err(EngineError::OracleUnavailable(reason)) => {
            debug!("{} oracle unavailable: {}", oracle.name(), reason);
            None
        }
        Err(e) => {
            warn!("{} oracle failed to classify {:?}: {}", oracle.name(), path, e);
            None
        }
    }
}
