//! Document access for the engine.
//!
//! The engine reads documents through [`TextDocument`]; [`RopeDocument`] is
//! the in-process implementation used by the CLI host and the tests. Columns
//! are counted in chars.

use std::path::{Path, PathBuf};

use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range, TextEdit, Url};

/// Read access to a document snapshot.
pub trait TextDocument: Send + Sync {
    fn uri(&self) -> &Url;

    fn language_id(&self) -> &str;

    /// Monotonic version; part of every cache key derived from this document.
    fn version(&self) -> i32;

    fn line_count(&self) -> usize;

    /// Text of `line` without its line terminator.
    fn line(&self, line: usize) -> Option<String>;

    fn text(&self) -> String;

    fn path(&self) -> Option<PathBuf> {
        self.uri().to_file_path().ok()
    }

    /// Char offset of `position`, clamped to the document.
    fn offset_at(&self, position: Position) -> usize {
        let mut offset = 0;
        let target = (position.line as usize).min(self.line_count().saturating_sub(1));
        for line in 0..target {
            offset += self.line(line).map(|l| l.chars().count()).unwrap_or(0) + 1;
        }
        let width = self.line(target).map(|l| l.chars().count()).unwrap_or(0);
        offset + (position.character as usize).min(width)
    }

    /// Text covered by `range`, joined with `\n`.
    fn text_in_range(&self, range: Range) -> String {
        let mut out = String::new();
        for line_no in range.start.line..=range.end.line {
            let Some(line) = self.line(line_no as usize) else { break };
            let start = if line_no == range.start.line { range.start.character as usize } else { 0 };
            let end = if line_no == range.end.line {
                range.end.character as usize
            } else {
                usize::MAX
            };
            if line_no != range.start.line {
                out.push('\n');
            }
            out.extend(line.chars().skip(start).take(end.saturating_sub(start)));
        }
        out
    }
}

/// Rope-backed document.
#[derive(Debug, Clone)]
pub struct RopeDocument {
    uri: Url,
    language_id: String,
    version: i32,
    text: Rope,
}

impl RopeDocument {
    pub fn new(uri: Url, language_id: impl Into<String>, version: i32, text: &str) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
            text: Rope::from_str(text),
        }
    }

    /// Open a file from disk, inferring the language from its extension.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let absolute = std::path::absolute(path)?;
        let uri = Url::from_file_path(&absolute).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot build a file URI for {:?}", absolute),
            )
        })?;
        Ok(Self::new(uri, language_id_for_path(path), 0, &text))
    }

    fn char_offset(&self, position: &Position) -> usize {
        let last_line = self.text.len_lines().saturating_sub(1);
        let line = (position.line as usize).min(last_line);
        let line_start = self.text.line_to_char(line);
        let width = line_width(self.text.line(line));
        line_start + (position.character as usize).min(width)
    }

    /// Applies LSP text edits against the current text and bumps the version.
    ///
    /// Edits are applied back to front so earlier ranges stay valid.
    pub fn apply_edits(&mut self, edits: &[TextEdit]) {
        let mut ordered: Vec<&TextEdit> = edits.iter().collect();
        ordered.sort_by(|a, b| {
            (b.range.start.line, b.range.start.character)
                .cmp(&(a.range.start.line, a.range.start.character))
        });
        for edit in ordered {
            let start = self.char_offset(&edit.range.start);
            let end = self.char_offset(&edit.range.end).max(start);
            self.text.remove(start..end);
            self.text.insert(start, &edit.new_text);
        }
        self.version += 1;
    }
}

fn line_width(line: ropey::RopeSlice<'_>) -> usize {
    let mut width = line.len_chars();
    if width > 0 && line.char(width - 1) == '\n' {
        width -= 1;
        if width > 0 && line.char(width - 1) == '\r' {
            width -= 1;
        }
    }
    width
}

impl TextDocument for RopeDocument {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn language_id(&self) -> &str {
        &self.language_id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn line_count(&self) -> usize {
        self.text.len_lines()
    }

    fn line(&self, line: usize) -> Option<String> {
        if line >= self.text.len_lines() {
            return None;
        }
        let slice = self.text.line(line);
        let width = line_width(slice);
        Some(slice.slice(..width).to_string())
    }

    fn text(&self) -> String {
        self.text.to_string()
    }

    fn offset_at(&self, position: Position) -> usize {
        self.char_offset(&position)
    }
}

/// Best-effort language id for a file path, following editor conventions.
pub fn language_id_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "json" => "json",
        "md" => "markdown",
        "rs" => "rust",
        "py" => "python",
        "html" => "html",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "plaintext",
    }
}
