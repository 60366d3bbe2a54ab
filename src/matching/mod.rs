//! Context matchers evaluated against a [`MatchContext`].

pub mod context;
pub mod locations;
pub mod npm;
pub mod other_lines;

use std::path::Path;

pub use context::{MatchContext, RuleCaptures};
pub use locations::{
    LEXICAL_UNIVERSE, ORACLE_FALLBACK, SYNTAX_RELATED, full_tags, is_lexically_in_code,
    lexical_tags, location_match, syntax_tags,
};
pub use npm::{ManifestCache, ManifestDependencies, requirements_satisfied};
pub use other_lines::other_lines_match;

use crate::rules::WhenClause;

/// `pathRegex` against the full path and `fileGlob` against the file name.
///
/// A document without a filesystem path fails any rule declaring either.
pub fn path_match(when: &WhenClause, path: Option<&Path>) -> bool {
    if when.path_regex.is_none() && when.file_glob.is_none() {
        return true;
    }
    let Some(path) = path else {
        return false;
    };
    if let Some(pattern) = &when.path_regex {
        if !pattern.is_match(&path.to_string_lossy()) {
            return false;
        }
    }
    if let Some(glob) = &when.file_glob {
        let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if !glob.is_match(&file_name) {
            return false;
        }
    }
    true
}

/// `lineRegex` against the line basis; records named groups and the match start column.
pub fn line_regex_match(when: &WhenClause, basis: &str, captures: &mut RuleCaptures) -> bool {
    let Some(pattern) = &when.line_regex else {
        return true;
    };
    let Some(found) = pattern.captures(basis) else {
        return false;
    };
    if let Some(whole) = found.get(0) {
        captures.match_start = Some(basis[..whole.start()].chars().count() as u32);
    }
    captures.extend(pattern.named_groups(&found));
    true
}
