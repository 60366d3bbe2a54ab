//! `when.otherLines` matching against neighbouring lines.
//!
//! Relative-line matchers look at a fixed offset from the cursor line.
//! Indentation matchers walk upward; every strictly shallower non-blank line
//! lowers the current level by one. A `Level(n)` matcher is decided on the
//! line where the level reaches `n`. An `Up` matcher takes the first shallower
//! line that passes its test, independently of the others.

use super::context::RuleCaptures;
use crate::document::TextDocument;
use crate::rules::{IndentTarget, IndentationMatcher, LineTest, OtherLinesMatcher, RelativeLineMatcher};

impl LineTest {
    /// Runs every configured check against `text`; `Some` carries named regex captures.
    pub fn evaluate(&self, text: &str) -> Option<Vec<(String, String)>> {
        if let Some(prefix) = &self.starts_with {
            if !text.starts_with(prefix.as_str()) {
                return None;
            }
        }
        if let Some(needle) = &self.includes {
            if !text.contains(needle.as_str()) {
                return None;
            }
        }
        if let Some(suffix) = &self.ends_with {
            if !text.ends_with(suffix.as_str()) {
                return None;
            }
        }
        match &self.test_regex {
            Some(pattern) => {
                let captures = pattern.captures(text)?;
                Some(pattern.named_groups(&captures))
            }
            None => Some(Vec::new()),
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn indentation(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).count()
}

/// All matchers must pass. Captures of passing regex tests are added to `captures`.
pub fn other_lines_match(
    document: &dyn TextDocument,
    line: usize,
    matchers: &[OtherLinesMatcher],
    captures: &mut RuleCaptures,
) -> bool {
    let mut indentation_matchers = Vec::new();
    for matcher in matchers {
        match matcher {
            OtherLinesMatcher::Relative(relative) => {
                if !relative_line_match(document, line, relative, captures) {
                    return false;
                }
            }
            OtherLinesMatcher::Indentation(indent) => indentation_matchers.push(indent),
        }
    }
    indentation_match(document, line, &indentation_matchers, captures)
}

fn relative_line_match(
    document: &dyn TextDocument,
    line: usize,
    matcher: &RelativeLineMatcher,
    captures: &mut RuleCaptures,
) -> bool {
    let step = matcher.line.signum() as i64;
    let line_count = document.line_count() as i64;
    let mut target = line as i64 + matcher.line as i64;

    loop {
        if target < 0 || target >= line_count {
            return matcher.pass_if_missing;
        }
        let Some(text) = document.line(target as usize) else {
            return matcher.pass_if_missing;
        };
        if matcher.skip_empty_lines && step != 0 && is_blank(&text) {
            target += step;
            continue;
        }
        return match matcher.test.evaluate(text.trim_start()) {
            Some(groups) => {
                captures.extend(groups);
                true
            }
            None => false,
        };
    }
}

fn indentation_match(
    document: &dyn TextDocument,
    line: usize,
    matchers: &[&IndentationMatcher],
    captures: &mut RuleCaptures,
) -> bool {
    let current = document.line(line).unwrap_or_default();
    let mut pending = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        if matcher.indent == IndentTarget::Level(0) {
            match matcher.test.evaluate(current.trim_start()) {
                Some(groups) => captures.extend(groups),
                None => return false,
            }
        } else {
            pending.push(*matcher);
        }
    }
    if pending.is_empty() {
        return true;
    }

    let mut indent = indentation(&current);
    let mut level = 0;
    for above in (0..line).rev() {
        if indent == 0 {
            break;
        }
        let Some(text) = document.line(above) else { continue };
        if is_blank(&text) {
            continue;
        }
        let depth = indentation(&text);
        if depth >= indent {
            continue;
        }
        indent = depth;
        level -= 1;

        let trimmed = text.trim_start();
        let mut rejected = false;
        pending.retain(|matcher| match matcher.indent {
            IndentTarget::Up => match matcher.test.evaluate(trimmed) {
                Some(groups) => {
                    captures.extend(groups);
                    false
                }
                None => true,
            },
            IndentTarget::Level(target) if target == level => {
                match matcher.test.evaluate(trimmed) {
                    Some(groups) => captures.extend(groups),
                    None => rejected = true,
                }
                false
            }
            IndentTarget::Level(_) => true,
        });
        if rejected {
            return false;
        }
        if pending.is_empty() {
            return true;
        }
    }
    pending.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RopeDocument;
    use indoc::indoc;
    use serde_json::json;
    use tower_lsp::lsp_types::Url;

    fn doc(text: &str) -> RopeDocument {
        RopeDocument::new(Url::parse("file:///spec.ts").unwrap(), "typescript", 1, text)
    }

    fn matchers(value: serde_json::Value) -> Vec<OtherLinesMatcher> {
        serde_json::from_value(value).unwrap()
    }

    fn run(text: &str, line: usize, value: serde_json::Value) -> bool {
        other_lines_match(&doc(text), line, &matchers(value), &mut RuleCaptures::default())
    }

    const NESTED: &str = indoc! {"
        describe('suite', () => {
          it('works', () => {

            x
          })
        })
    "};

    #[test]
    fn test_level_minus_one_crosses_exactly_one_level() {
        assert!(run(NESTED, 3, json!([{ "indent": -1, "startsWith": "it(" }])));
        assert!(!run(NESTED, 3, json!([{ "indent": -1, "startsWith": "describe(" }])));
        assert!(run(NESTED, 3, json!([{ "indent": -2, "startsWith": "describe(" }])));
    }

    #[test]
    fn test_failing_shallower_line_rejects_without_further_scan() {
        let text = indoc! {"
            describe('suite', () => {
              const setup = 1
                x
        "};
        // The first shallower line fails the test; the describe line is never considered
        assert!(!run(text, 2, json!([{ "indent": -1, "startsWith": "describe(" }])));
    }

    #[test]
    fn test_up_takes_first_passing_shallower_line() {
        assert!(run(NESTED, 3, json!([{ "indent": "up", "startsWith": "describe(" }])));
        assert!(!run(NESTED, 3, json!([{ "indent": "up", "startsWith": "test(" }])));
    }

    #[test]
    fn test_up_matchers_resolve_independently() {
        assert!(run(
            NESTED,
            3,
            json!([
                { "indent": "up", "startsWith": "describe(" },
                { "indent": "up", "startsWith": "it(" }
            ])
        ));
    }

    #[test]
    fn test_unindented_line_cannot_satisfy_pending_matchers() {
        assert!(!run("describe()\nx", 1, json!([{ "indent": "up", "startsWith": "describe(" }])));
    }

    #[test]
    fn test_relative_line_skips_blank_lines() {
        assert!(!run(NESTED, 3, json!([{ "line": -1, "startsWith": "it(" }])));
        assert!(run(
            NESTED,
            3,
            json!([{ "line": -1, "skipEmptyLines": true, "startsWith": "it(" }])
        ));
    }

    #[test]
    fn test_missing_relative_line() {
        assert!(!run("x", 0, json!([{ "line": -1, "includes": "a" }])));
        assert!(run("x", 0, json!([{ "line": -1, "includes": "a", "passIfMissing": true }])));
    }

    #[test]
    fn test_regex_captures_are_recorded() {
        let mut captures = RuleCaptures::default();
        let ok = other_lines_match(
            &doc("class Store {\n  \n"),
            1,
            &matchers(json!([{ "indent": -1, "testRegex": "^class (?P<className>\\w+)" }])),
            &mut captures,
        );
        assert!(ok);
        assert_eq!(captures.groups.get("className").map(String::as_str), Some("Store"));
    }
}
