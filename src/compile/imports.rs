//! Import resolution after a snippet was inserted.
//!
//! For a bounded window the engine watches diagnostics published for the
//! document. Each diagnostic that intersects the inserted text and covers
//! an identifier from the rule's import table is fixed through the syntax
//! oracle; identifiers with no suitable fix produce a warning.

use std::collections::BTreeMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::broadcast;
use tower_lsp::lsp_types::{Diagnostic, Position, Range, TextEdit, Url};
use tracing::{debug, info, warn};

use crate::document::TextDocument;
use crate::host::EditorHost;
use crate::oracle::{CodeFix, SyntaxOracle};
use crate::rules::ImportSpec;

static NAMED_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^import\s*\{([^}]*)\}\s*from\s*(["'])([^"']+)["']\s*;?\s*$"#).unwrap()
});

/// Diagnostics published for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsEvent {
    pub uri: Url,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Identifier and the module it was imported from.
    pub resolved: Vec<(String, String)>,
    /// Identifiers no suitable fix existed for.
    pub failed: Vec<String>,
    /// Identifiers still pending when the window closed.
    pub unobserved: Vec<String>,
}

/// Everything the observation window needs besides the host and the oracle.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub uri: Url,
    /// Range the inserted text occupies.
    pub inserted: Range,
    pub table: BTreeMap<String, ImportSpec>,
    pub window: Duration,
}

fn before(a: Position, b: Position) -> bool {
    (a.line, a.character) < (b.line, b.character)
}

pub(crate) fn ranges_intersect(a: &Range, b: &Range) -> bool {
    !before(a.end, b.start) && !before(b.end, a.start)
}

/// Line shift `edits` cause for text starting at `start`; edits ending exactly at `start` count.
fn line_delta(edits: &[TextEdit], start: Position) -> i64 {
    edits
        .iter()
        .filter(|edit| !before(start, edit.range.end))
        .map(|edit| {
            let added = edit.new_text.matches('\n').count() as i64;
            let removed = (edit.range.end.line - edit.range.start.line) as i64;
            added - removed
        })
        .sum()
}

fn shift(range: Range, delta: i64) -> Range {
    let line = |l: u32| (l as i64 + delta).max(0) as u32;
    Range {
        start: Position::new(line(range.start.line), range.start.character),
        end: Position::new(line(range.end.line), range.end.character),
    }
}

fn pick_fix<'a>(fixes: &'a [CodeFix], spec: &ImportSpec) -> Option<&'a CodeFix> {
    match &spec.package {
        Some(package) => fixes.iter().find(|fix| &fix.module == package),
        None => fixes.first(),
    }
}

/// ES import edit bringing `identifier` in from `module`.
///
/// Merges into an existing `import { … } from "module";` line when there is
/// one; otherwise inserts a new line after the leading import block, or at
/// the top of the file. `None` when the identifier is already imported.
pub fn es_import_edit(document: &dyn TextDocument, identifier: &str, module: &str) -> Option<TextEdit> {
    let mut last_import = None;
    let mut in_header = true;
    for index in 0..document.line_count() {
        let Some(line) = document.line(index) else { break };
        let trimmed = line.trim();

        if let Some(found) = NAMED_IMPORT.captures(trimmed) {
            if &found[3] == module {
                let mut names: Vec<&str> = found[1]
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect();
                if names.contains(&identifier) {
                    return None;
                }
                names.push(identifier);
                let quote = &found[2];
                return Some(TextEdit {
                    range: Range {
                        start: Position::new(index as u32, 0),
                        end: Position::new(index as u32, line.chars().count() as u32),
                    },
                    new_text: format!("import {{ {} }} from {}{}{};", names.join(", "), quote, module, quote),
                });
            }
        }

        if in_header {
            if trimmed.starts_with("import ") || trimmed.starts_with("import{") {
                last_import = Some(index);
            } else if !(trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')) {
                in_header = false;
            }
        }
    }

    let line = last_import.map_or(0, |index| index as u32 + 1);
    Some(TextEdit {
        range: Range {
            start: Position::new(line, 0),
            end: Position::new(line, 0),
        },
        new_text: format!("import {{ {} }} from \"{}\";\n", identifier, module),
    })
}

/// Observe diagnostics for `request.window` and fix the identifiers of the import table.
pub async fn resolve_imports(
    host: &dyn EditorHost,
    oracle: &dyn SyntaxOracle,
    request: ImportRequest,
    mut diagnostics: broadcast::Receiver<DiagnosticsEvent>,
) -> ImportReport {
    let mut report = ImportReport::default();
    let mut pending = request.table;
    let mut inserted = request.inserted;
    let deadline = tokio::time::Instant::now() + request.window;

    while !pending.is_empty() {
        let event = match tokio::time::timeout_at(deadline, diagnostics.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                debug!("Import window skipped {} diagnostics events", skipped);
                continue;
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => {
                debug!("Import window for {} timed out", request.uri);
                break;
            }
        };
        if event.uri != request.uri {
            continue;
        }
        let Some(mut document) = host.document(&request.uri) else {
            warn!("Document {} closed during import resolution", request.uri);
            break;
        };
        let Some(path) = document.path() else { break };

        // Edits applied while handling this event move the ranges of later diagnostics
        let mut event_delta = 0;
        for diagnostic in &event.diagnostics {
            let range = shift(diagnostic.range, event_delta);
            if !ranges_intersect(&range, &inserted) {
                continue;
            }
            let identifier = document.text_in_range(range);
            let Some(spec) = pending.remove(&identifier) else { continue };

            let fixes = oracle.code_fixes(&path, range).await.unwrap_or_else(|e| {
                warn!("No code fixes for `{}`: {}", identifier, e);
                Vec::new()
            });
            let Some(fix) = pick_fix(&fixes, &spec) else {
                let package = spec.package.as_deref().unwrap_or("any package");
                host.show_warning(&format!(
                    "Could not resolve import of `{}` from {}",
                    identifier, package
                ));
                report.failed.push(identifier);
                continue;
            };

            let edits = if fix.edits.is_empty() {
                es_import_edit(document.as_ref(), &identifier, &fix.module).into_iter().collect()
            } else {
                fix.edits.clone()
            };
            if !edits.is_empty() {
                let delta = line_delta(&edits, inserted.start);
                if let Err(e) = host.apply_edits(&request.uri, edits).await {
                    warn!("Failed to apply import of `{}`: {}", identifier, e);
                    report.failed.push(identifier);
                    continue;
                }
                inserted = shift(inserted, delta);
                event_delta += delta;
                match host.document(&request.uri) {
                    Some(updated) => document = updated,
                    None => break,
                }
            }
            info!("Imported `{}` from {}", identifier, fix.module);
            report.resolved.push((identifier, fix.module.clone()));
        }
    }

    report.unobserved = pending.into_keys().collect();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RopeDocument;

    fn doc(text: &str) -> RopeDocument {
        RopeDocument::new(Url::parse("file:///work/a.ts").unwrap(), "typescript", 1, text)
    }

    fn apply(text: &str, edit: Option<TextEdit>) -> String {
        let mut document = doc(text);
        document.apply_edits(&edit.into_iter().collect::<Vec<_>>());
        document.text()
    }

    #[test]
    fn test_import_into_empty_file() {
        let out = apply("readFileSync", es_import_edit(&doc("readFileSync"), "readFileSync", "node:fs"));
        assert_eq!(out, "import { readFileSync } from \"node:fs\";\nreadFileSync");
    }

    #[test]
    fn test_merges_into_existing_named_import() {
        let text = "import { readFile } from 'node:fs';\n\nreadFileSync";
        let out = apply(text, es_import_edit(&doc(text), "readFileSync", "node:fs"));
        assert_eq!(out, "import { readFile, readFileSync } from 'node:fs';\n\nreadFileSync");
        assert!(es_import_edit(&doc("import { a } from \"m\";"), "a", "m").is_none());
    }

    #[test]
    fn test_new_import_goes_after_import_block() {
        let text = "// header\nimport x from \"x\";\nimport { y } from \"y\";\n\nconst z = 1;\nimport late from \"late\";";
        let edit = es_import_edit(&doc(text), "join", "node:path").unwrap();
        assert_eq!(edit.range.start, Position::new(3, 0));
    }

    #[test]
    fn test_line_delta_only_counts_edits_above() {
        let above = TextEdit {
            range: Range::default(),
            new_text: "import a from \"a\";\n".into(),
        };
        let merge = TextEdit {
            range: Range {
                start: Position::new(0, 0),
                end: Position::new(0, 10),
            },
            new_text: "import { a, b } from \"a\";".into(),
        };
        let below = TextEdit {
            range: Range {
                start: Position::new(3, 0),
                end: Position::new(3, 0),
            },
            new_text: "import a from \"a\";\n".into(),
        };
        assert_eq!(line_delta(&[above.clone()], Position::new(2, 0)), 1);
        assert_eq!(line_delta(&[merge], Position::new(2, 0)), 0);
        assert_eq!(line_delta(&[below], Position::new(2, 0)), 0);
    }

    #[test]
    fn test_line_delta_counts_insertion_at_text_start() {
        let at_top = TextEdit {
            range: Range::default(),
            new_text: "import { a } from \"a\";\n".into(),
        };
        assert_eq!(line_delta(&[at_top.clone()], Position::new(0, 0)), 1);
        assert_eq!(line_delta(&[at_top], Position::new(0, 4)), 1);
    }

    #[test]
    fn test_ranges_intersect_inclusive() {
        let a = Range {
            start: Position::new(1, 0),
            end: Position::new(1, 5),
        };
        let touching = Range {
            start: Position::new(1, 5),
            end: Position::new(1, 9),
        };
        let after = Range {
            start: Position::new(2, 0),
            end: Position::new(2, 1),
        };
        assert!(ranges_intersect(&a, &touching));
        assert!(!ranges_intersect(&a, &after));
    }
}
