//! Edit compilation: turns an accepted rule into concrete edits.

pub mod imports;
pub mod snippet;
pub mod variables;

use std::collections::BTreeMap;
use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Range, TextEdit};

pub use imports::{DiagnosticsEvent, ImportReport, ImportRequest, es_import_edit, resolve_imports};
pub use variables::DocumentVariables;

use crate::document::TextDocument;
use crate::matching::MatchContext;
use crate::rules::{ImportSpec, Rule, RuleId, RuleKind, SideEffectCommand};

/// What accepting a rule does to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct EditPlan {
    pub id: RuleId,
    pub rule: Arc<Rule>,
    /// Snippet-syntax text; `None` for rules that insert nothing.
    pub insert_text: Option<String>,
    /// Range `insert_text` replaces.
    pub replace_range: Range,
    pub additional_edits: Vec<TextEdit>,
    pub command: Option<SideEffectCommand>,
    pub imports: BTreeMap<String, ImportSpec>,
}

impl EditPlan {
    pub fn inserts_text(&self) -> bool {
        self.insert_text.is_some()
    }

    /// Insertion as plain text edits, for hosts without snippet support.
    pub fn text_edits(&self) -> Vec<TextEdit> {
        let Some(text) = &self.insert_text else {
            return Vec::new();
        };
        let mut edits = vec![TextEdit {
            range: self.replace_range,
            new_text: snippet::render_plain(text),
        }];
        edits.extend(self.additional_edits.iter().cloned());
        edits
    }

    /// Range the inserted text occupies once the edits are applied.
    pub fn inserted_range(&self) -> Option<Range> {
        let text = snippet::render_plain(self.insert_text.as_deref()?);
        // replaceMatch deletions on the same line shift the insertion left
        let deleted: u32 = self
            .additional_edits
            .iter()
            .filter(|edit| {
                edit.range.start.line == self.replace_range.start.line
                    && edit.range.end.line == edit.range.start.line
                    && edit.range.end.character <= self.replace_range.start.character
            })
            .map(|edit| edit.range.end.character - edit.range.start.character)
            .sum();
        let start = Position::new(
            self.replace_range.start.line,
            self.replace_range.start.character.saturating_sub(deleted),
        );
        let mut lines = text.split('\n');
        let first = lines.next().unwrap_or_default();
        let rest: Vec<&str> = lines.collect();
        let end = match rest.last() {
            Some(last) => Position::new(start.line + rest.len() as u32, last.chars().count() as u32),
            None => Position::new(start.line, start.character + first.chars().count() as u32),
        };
        Some(Range { start, end })
    }

    /// Resolve `$TM_*` variables against `document`, keeping tab stops intact.
    pub fn resolve_variables(&self, document: &dyn TextDocument) -> EditPlan {
        let vars = DocumentVariables::new(document, self.replace_range.end);
        EditPlan {
            insert_text: self
                .insert_text
                .as_deref()
                .map(|text| snippet::expand_variables(text, |name| vars.resolve(name))),
            ..self.clone()
        }
    }
}

/// Longest suffix of `prefix` that `trigger` starts with, in chars.
fn typed_trigger_len(prefix: &str, trigger: &str) -> usize {
    prefix
        .char_indices()
        .map(|(i, _)| &prefix[i..])
        .find(|suffix| trigger.starts_with(suffix))
        .map_or(0, |suffix| suffix.chars().count())
}

/// Compile `rule` for the cursor in `ctx`.
pub fn compile(id: RuleId, rule: &Arc<Rule>, ctx: &MatchContext) -> EditPlan {
    let base = rule.base();
    let cursor = ctx.position;
    let captures = ctx.captures(id);

    let replaced = match rule.kind() {
        RuleKind::Named => typed_trigger_len(&ctx.prefix, rule.trigger()),
        RuleKind::Sequence if ctx.prefix.ends_with(rule.trigger()) => rule.trigger().chars().count(),
        RuleKind::Sequence => 0,
    };
    let replace_range = Range {
        start: Position::new(cursor.line, cursor.character - replaced as u32),
        end: cursor,
    };

    let insert_text = base.body.text().map(|text| {
        snippet::substitute_captures(&text, |name| {
            captures.and_then(|c| c.groups.get(name).cloned())
        })
    });

    let mut additional_edits = Vec::new();
    if insert_text.is_some() && base.replace_match {
        if let Some(start) = captures.and_then(|c| c.match_start) {
            if start < replace_range.start.character {
                additional_edits.push(TextEdit {
                    range: Range {
                        start: Position::new(cursor.line, start),
                        end: replace_range.start,
                    },
                    new_text: String::new(),
                });
            }
        }
    }

    EditPlan {
        id,
        rule: rule.clone(),
        replace_range: if insert_text.is_some() { replace_range } else { Range::new(cursor, cursor) },
        insert_text,
        additional_edits,
        command: base.execute_command.clone(),
        imports: base.resolve_imports.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageSupersets;
    use crate::document::RopeDocument;
    use crate::rules::{ExtendsGroups, RuleTable, normalize};
    use serde_json::{Value, json};
    use tower_lsp::lsp_types::Url;

    fn rule(kind: RuleKind, value: Value) -> Arc<Rule> {
        Arc::new(normalize(kind, &value, &json!({}), &ExtendsGroups::new()).unwrap())
    }

    fn ctx(text: &str, line: u32, character: u32) -> MatchContext {
        let doc: Arc<dyn TextDocument> = Arc::new(RopeDocument::new(
            Url::parse("file:///work/src/store.ts").unwrap(),
            "typescript",
            3,
            text,
        ));
        MatchContext::new(doc, Position::new(line, character), true)
    }

    #[test]
    fn test_named_rule_replaces_typed_prefix() {
        let rule = rule(RuleKind::Named, json!({ "name": "codeblock", "body": ["```$1", "```"] }));
        let plan = compile(RuleId(0), &rule, &ctx("  cod", 0, 5));
        assert_eq!(plan.insert_text.as_deref(), Some("```$1\n```"));
        assert_eq!(plan.replace_range, Range::new(Position::new(0, 2), Position::new(0, 5)));
        assert_eq!(plan.text_edits()[0].new_text, "```\n```");
    }

    #[test]
    fn test_sequence_rule_replaces_sequence() {
        let rule = rule(RuleKind::Sequence, json!({ "sequence": "cl ", "body": "console.log($1)" }));
        let plan = compile(RuleId(0), &rule, &ctx("x cl ", 0, 5));
        assert_eq!(plan.replace_range, Range::new(Position::new(0, 2), Position::new(0, 5)));
    }

    #[test]
    fn test_no_insertion_body_has_no_edits() {
        let rule = rule(
            RuleKind::Sequence,
            json!({ "sequence": "!!", "body": false, "executeCommand": "editor.action.format" }),
        );
        let plan = compile(RuleId(0), &rule, &ctx("a !!", 0, 4));
        assert!(plan.text_edits().is_empty());
        assert_eq!(plan.inserted_range(), None);
        assert_eq!(plan.command.map(|c| c.command).as_deref(), Some("editor.action.format"));
    }

    #[test]
    fn test_replace_match_deletes_regex_match() {
        let table = RuleTable::from_rules(
            vec![
                normalize(
                    RuleKind::Named,
                    &json!({
                        "name": "log",
                        "body": "console.log($<expr>)",
                        "replaceMatch": true,
                        "when": { "lineRegex": "(?P<expr>[\\w.]+)\\.lo?g?$" }
                    }),
                    &json!({}),
                    &ExtendsGroups::new(),
                )
                .unwrap(),
            ],
            &LanguageSupersets::builtin(),
            1,
        );
        let mut ctx = ctx("  user.name.lo", 0, 14);
        let found = crate::candidates::phase_one(&table, RuleKind::Named, &mut ctx);
        assert_eq!(found.len(), 1);

        let plan = compile(found[0].id, &found[0].rule, &ctx);
        assert_eq!(plan.insert_text.as_deref(), Some("console.log(user.name)"));
        assert_eq!(plan.replace_range.start, Position::new(0, 12));
        assert_eq!(
            plan.additional_edits[0].range,
            Range::new(Position::new(0, 2), Position::new(0, 12))
        );

        let mut doc = RopeDocument::new(Url::parse("file:///a.ts").unwrap(), "typescript", 1, "  user.name.lo");
        doc.apply_edits(&plan.text_edits());
        assert_eq!(doc.text(), "  console.log(user.name)");
        assert_eq!(
            plan.inserted_range(),
            Some(Range::new(Position::new(0, 2), Position::new(0, 24)))
        );
    }

    #[test]
    fn test_resolve_variables() {
        let rule = rule(RuleKind::Named, json!({ "name": "cls", "body": "class ${1:$TM_FILENAME_BASE} {}" }));
        let plan = compile(RuleId(0), &rule, &ctx("cls", 0, 3)).resolve_variables(&*ctx("cls", 0, 3).document);
        assert_eq!(plan.insert_text.as_deref(), Some("class ${1:store} {}"));
        assert_eq!(plan.text_edits()[0].new_text, "class store {}");
    }

    #[test]
    fn test_typed_trigger_len() {
        assert_eq!(typed_trigger_len("foo.cons", "console"), 4);
        assert_eq!(typed_trigger_len("x", "y"), 0);
        assert_eq!(typed_trigger_len("", "y"), 0);
    }
}
