#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tower_lsp::lsp_types::{Diagnostic, Position, Range, TextEdit, Url};

use context_snippets::rules::SideEffectCommand;
use context_snippets::{
    CodeFix, EditorHost, Result, RopeDocument, Settings, SnippetEngine, SyntaxKind, SyntaxOracle, TextDocument,
};

/// Oracle answering with a fixed syntax kind and fixed code fixes.
pub struct FakeOracle {
    pub kind: SyntaxKind,
    pub fixes: Vec<CodeFix>,
    pub classify_calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new(kind: SyntaxKind) -> Self {
        Self {
            kind,
            fixes: Vec::new(),
            classify_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fix(mut self, identifier: &str, module: &str) -> Self {
        self.fixes.push(CodeFix {
            identifier: identifier.to_string(),
            module: module.to_string(),
            edits: Vec::new(),
        });
        self
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SyntaxOracle for FakeOracle {
    async fn classify(&self, _path: &Path, _line: u32, _offset: usize) -> Result<SyntaxKind> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.kind)
    }

    async fn code_fixes(&self, _path: &Path, _range: Range) -> Result<Vec<CodeFix>> {
        Ok(self.fixes.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Host editing a single in-memory document.
///
/// When `unresolved` names identifiers, the first edit publishes one
/// diagnostic per occurrence through the engine, the way a language service
/// reports missing imports after a snippet lands.
pub struct MemoryHost {
    pub document: Mutex<RopeDocument>,
    pub commands: Mutex<Vec<SideEffectCommand>>,
    pub warnings: Mutex<Vec<String>>,
    engine: Option<SnippetEngine>,
    unresolved: Mutex<Vec<String>>,
}

impl MemoryHost {
    pub fn new(document: RopeDocument) -> Self {
        Self {
            document: Mutex::new(document),
            commands: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            engine: None,
            unresolved: Mutex::new(Vec::new()),
        }
    }

    pub fn reporting_unresolved(mut self, engine: &SnippetEngine, identifiers: &[&str]) -> Self {
        self.engine = Some(engine.clone());
        *self.unresolved.lock() = identifiers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn snapshot(&self) -> Arc<dyn TextDocument> {
        Arc::new(self.document.lock().clone())
    }

    pub fn text(&self) -> String {
        self.document.lock().text()
    }

    pub fn uri(&self) -> Url {
        self.document.lock().uri().clone()
    }

    fn publish_unresolved(&self) {
        let identifiers = std::mem::take(&mut *self.unresolved.lock());
        let Some(engine) = &self.engine else { return };
        if identifiers.is_empty() {
            return;
        }
        let document = self.document.lock().clone();
        let mut diagnostics = Vec::new();
        for line_no in 0..document.line_count() {
            let Some(line) = document.line(line_no) else { continue };
            for identifier in &identifiers {
                if let Some(byte) = line.find(identifier.as_str()) {
                    let start = line[..byte].chars().count() as u32;
                    let end = start + identifier.chars().count() as u32;
                    diagnostics.push(Diagnostic {
                        range: Range::new(
                            Position::new(line_no as u32, start),
                            Position::new(line_no as u32, end),
                        ),
                        message: format!("Cannot find name '{}'.", identifier),
                        ..Default::default()
                    });
                }
            }
        }
        engine.publish_diagnostics(document.uri().clone(), diagnostics);
    }
}

#[async_trait::async_trait]
impl EditorHost for MemoryHost {
    fn document(&self, uri: &Url) -> Option<Arc<dyn TextDocument>> {
        let snapshot = self.snapshot();
        (snapshot.uri() == uri).then_some(snapshot)
    }

    async fn apply_edits(&self, _uri: &Url, edits: Vec<TextEdit>) -> Result<()> {
        self.document.lock().apply_edits(&edits);
        self.publish_unresolved();
        Ok(())
    }

    async fn execute_command(&self, command: &SideEffectCommand) -> Result<()> {
        self.commands.lock().push(command.clone());
        Ok(())
    }

    fn show_warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}

pub fn ts_document(path: &str, text: &str) -> RopeDocument {
    RopeDocument::new(
        Url::parse(&format!("file://{}", path)).unwrap(),
        "typescript",
        1,
        text,
    )
}

/// Settings from a partial JSON object; missing keys keep their defaults.
pub fn settings(value: Value) -> Settings {
    Settings::from_value(value).unwrap()
}

pub fn engine(value: Value, oracle: Arc<dyn SyntaxOracle>) -> SnippetEngine {
    SnippetEngine::new(settings(value), oracle)
}
