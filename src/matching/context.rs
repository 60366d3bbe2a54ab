//! Per-request match context.

use std::collections::HashMap;
use std::sync::Arc;

use tower_lsp::lsp_types::Position;

use super::locations::{full_tags, is_lexically_in_code, lexical_tags};
use crate::document::TextDocument;
use crate::rules::{RuleId, TagSet};

/// Named regex captures recorded for one rule while it was being matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleCaptures {
    pub groups: HashMap<String, String>,
    /// Column where the `when.lineRegex` match began, when there was one.
    pub match_start: Option<u32>,
}

impl RuleCaptures {
    pub fn extend(&mut self, groups: impl IntoIterator<Item = (String, String)>) {
        self.groups.extend(groups);
    }
}

/// Everything matching needs to know about one completion request.
pub struct MatchContext {
    pub document: Arc<dyn TextDocument>,
    pub position: Position,
    /// Full text of the cursor line.
    pub line_text: String,
    /// Cursor line text up to the cursor.
    pub prefix: String,
    /// Text the start-of-line checks compare against: `prefix` in strict mode, else `line_text`.
    pub basis: String,
    pub lexical_in_code: bool,
    /// Tags resolved through the syntax oracle, once phase 2 ran.
    pub syntax_tags: Option<TagSet>,
    captures: HashMap<RuleId, RuleCaptures>,
}

impl MatchContext {
    pub fn new(document: Arc<dyn TextDocument>, position: Position, strict: bool) -> Self {
        let line_text = document.line(position.line as usize).unwrap_or_default();
        let prefix: String = line_text.chars().take(position.character as usize).collect();
        let position = Position::new(position.line, prefix.chars().count() as u32);
        let basis = if strict { prefix.clone() } else { line_text.clone() };
        let lexical_in_code = is_lexically_in_code(&prefix);
        Self {
            document,
            position,
            line_text,
            prefix,
            basis,
            lexical_in_code,
            syntax_tags: None,
            captures: HashMap::new(),
        }
    }

    /// Tags valid at the cursor for a rule triggered by `trigger`.
    ///
    /// Syntax-dependent tags are only present once phase 2 resolved them.
    pub fn valid_tags(&self, trigger: &str) -> TagSet {
        let lexical = lexical_tags(trigger, &self.basis, self.position.line, self.lexical_in_code);
        match &self.syntax_tags {
            Some(syntax) => full_tags(&lexical, syntax),
            None => lexical,
        }
    }

    pub fn captures(&self, id: RuleId) -> Option<&RuleCaptures> {
        self.captures.get(&id)
    }

    pub(crate) fn record_captures(&mut self, id: RuleId, captures: RuleCaptures) {
        if captures != RuleCaptures::default() {
            self.captures.insert(id, captures);
        }
    }

    pub(crate) fn forget_captures(&mut self, id: RuleId) {
        self.captures.remove(&id);
    }
}

impl std::fmt::Debug for MatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchContext")
            .field("uri", &self.document.uri().as_str())
            .field("position", &self.position)
            .field("prefix", &self.prefix)
            .field("lexical_in_code", &self.lexical_in_code)
            .field("syntax_tags", &self.syntax_tags)
            .finish()
    }
}
