//! Location classification and the location matcher.
//!
//! Start-of-line tags and the lexical `in-code` check come straight from the
//! line text. `in-string`, `in-comment`, `type-position` and the refined
//! `in-code` need the syntax oracle and are resolved in phase 2 only.

use crate::oracle::SyntaxKind;
use crate::rules::{LocationSpec, LocationTag, TagSet};

/// Tags phase 1 decides from text alone.
pub const LEXICAL_UNIVERSE: [LocationTag; 4] = [
    LocationTag::FileStart,
    LocationTag::TopLineStart,
    LocationTag::LineStart,
    LocationTag::InCode,
];

/// Declaring any of these makes phase 2 consult the syntax oracle.
pub const SYNTAX_RELATED: [LocationTag; 4] = [
    LocationTag::InCode,
    LocationTag::InString,
    LocationTag::InComment,
    LocationTag::TypePosition,
];

/// Reported when the oracle cannot answer.
pub const ORACLE_FALLBACK: [LocationTag; 2] = [LocationTag::InComment, LocationTag::InCode];

/// `[A-Za-z0-9_$]`
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Not in a member-access position: no `.` right before the cursor or before
/// the word the cursor sits in.
pub fn is_lexically_in_code(prefix: &str) -> bool {
    let chars: Vec<char> = prefix.chars().collect();
    let Some(&before_cursor) = chars.last() else {
        return true;
    };
    if before_cursor == '.' {
        return false;
    }
    let word_start = chars
        .iter()
        .rposition(|&c| !is_word_char(c))
        .map(|i| i + 1)
        .unwrap_or(0);
    if word_start == chars.len() {
        return true;
    }
    word_start == 0 || chars[word_start - 1] != '.'
}

/// Lexical tags for a rule whose trigger text is `trigger`.
pub fn lexical_tags(trigger: &str, basis: &str, line: u32, lexical_in_code: bool) -> TagSet {
    let mut tags = TagSet::new();
    if trigger.starts_with(basis) {
        tags.insert(LocationTag::TopLineStart);
        if line == 0 {
            tags.insert(LocationTag::FileStart);
        }
    }
    if trigger.starts_with(basis.trim_start()) {
        tags.insert(LocationTag::LineStart);
    }
    if lexical_in_code {
        tags.insert(LocationTag::InCode);
    }
    tags
}

/// Syntax-dependent tags from an oracle answer; `None` means the oracle was unavailable.
pub fn syntax_tags(kind: Option<SyntaxKind>, lexical_in_code: bool) -> TagSet {
    let mut tags = TagSet::new();
    match kind {
        None => tags.extend(ORACLE_FALLBACK),
        Some(SyntaxKind::String) => {
            tags.insert(LocationTag::InString);
        }
        Some(SyntaxKind::Comment) => {
            tags.insert(LocationTag::InComment);
        }
        Some(SyntaxKind::Type) => {
            tags.insert(LocationTag::TypePosition);
            if lexical_in_code {
                tags.insert(LocationTag::InCode);
            }
        }
        Some(SyntaxKind::Other) => {
            if lexical_in_code {
                tags.insert(LocationTag::InCode);
            }
        }
    }
    tags
}

/// Lexical tags with the oracle's view of `in-code` and the syntax tags merged in.
pub fn full_tags(lexical: &TagSet, syntax: &TagSet) -> TagSet {
    lexical
        .iter()
        .copied()
        .filter(|tag| *tag != LocationTag::InCode)
        .chain(syntax.iter().copied())
        .collect()
}

/// Location matcher over `universe`: declared tags outside it are not checked.
pub fn location_match(declared: &[LocationSpec], valid: &TagSet, universe: &[LocationTag]) -> bool {
    declared
        .iter()
        .filter(|spec| universe.contains(&spec.tag))
        .all(|spec| valid.contains(&spec.tag) != spec.negated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    #[test]
    fn test_in_code_member_access() {
        assert!(is_lexically_in_code(""));
        assert!(is_lexically_in_code("const a = "));
        assert!(is_lexically_in_code("foo"));
        assert!(!is_lexically_in_code("foo."));
        assert!(!is_lexically_in_code("foo.ba"));
        assert!(is_lexically_in_code("foo(ba"));
        assert!(is_lexically_in_code("  $el"));
    }

    #[test]
    fn test_word_chars_are_ascii() {
        assert!(is_word_char('$'));
        assert!(is_word_char('_'));
        assert!(!is_word_char('é'));
        assert!(is_lexically_in_code("a.é"));
    }

    #[test]
    fn test_start_tags() {
        let tags = lexical_tags("codeblock", "cod", 1, true);
        assert!(tags.contains(&LocationTag::TopLineStart));
        assert!(tags.contains(&LocationTag::LineStart));
        assert!(!tags.contains(&LocationTag::FileStart));

        let indented = lexical_tags("codeblock", "  cod", 0, true);
        assert!(!indented.contains(&LocationTag::TopLineStart));
        assert!(!indented.contains(&LocationTag::FileStart));
        assert!(indented.contains(&LocationTag::LineStart));

        let first_line = lexical_tags("codeblock", "", 0, true);
        assert!(first_line.contains(&LocationTag::FileStart));
    }

    #[test]
    fn test_oracle_tags() {
        let fallback = syntax_tags(None, false);
        assert!(fallback.contains(&LocationTag::InComment));
        assert!(fallback.contains(&LocationTag::InCode));

        let string = syntax_tags(Some(SyntaxKind::String), true);
        assert_eq!(string.into_iter().collect::<Vec<_>>(), vec![LocationTag::InString]);

        let lexical = lexical_tags("x", "", 3, true);
        let merged = full_tags(&lexical, &syntax_tags(Some(SyntaxKind::Comment), true));
        assert!(!merged.contains(&LocationTag::InCode));
        assert!(merged.contains(&LocationTag::InComment));
        assert!(merged.contains(&LocationTag::LineStart));
    }

    #[test]
    fn test_universe_restricts_checked_tags() {
        let declared = vec![
            LocationSpec::positive(LocationTag::LineStart),
            LocationSpec::positive(LocationTag::InString),
        ];
        let valid: TagSet = [LocationTag::LineStart].into_iter().collect();
        assert!(location_match(&declared, &valid, &LEXICAL_UNIVERSE));
        assert!(!location_match(&declared, &valid, &LocationTag::ALL));
    }

    fn tag(n: u8) -> LocationTag {
        LocationTag::ALL[n as usize % LocationTag::ALL.len()]
    }

    #[test]
    fn prop_no_declared_locations_accepts() {
        fn prop(valid: Vec<u8>, universe: Vec<u8>) -> bool {
            let valid: TagSet = valid.into_iter().map(tag).collect();
            let universe: Vec<LocationTag> = universe.into_iter().map(tag).collect();
            location_match(&[], &valid, &universe)
        }
        QuickCheck::new().quickcheck(prop as fn(Vec<u8>, Vec<u8>) -> bool);
    }

    #[test]
    fn prop_valid_negated_tag_rejects() {
        fn prop(negated: u8, positives: Vec<u8>, valid: Vec<u8>) -> TestResult {
            let negated = tag(negated);
            let mut valid: TagSet = valid.into_iter().map(tag).collect();
            valid.insert(negated);
            let mut declared: Vec<LocationSpec> = positives
                .into_iter()
                .map(tag)
                .filter(|t| *t != negated)
                .map(LocationSpec::positive)
                .collect();
            // Make every positive tag valid so only the negation can reject
            valid.extend(declared.iter().map(|spec| spec.tag));
            declared.push(LocationSpec::negative(negated));
            TestResult::from_bool(!location_match(&declared, &valid, &LocationTag::ALL))
        }
        QuickCheck::new().quickcheck(prop as fn(u8, Vec<u8>, Vec<u8>) -> TestResult);
    }
}
