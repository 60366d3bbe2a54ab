//! Resolved rule model.
//!
//! A [`Rule`] is what the normalizer produces from a snippet declaration.
//! It is either a named completion snippet or a typed-sequence snippet; both
//! share a [`RuleBase`] carrying the body, the `when` clause and metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::pattern::{GlobPattern, Pattern};

/// Structural classification of a cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationTag {
    FileStart,
    LineStart,
    TopLineStart,
    InCode,
    InString,
    InComment,
    TypePosition,
}

impl LocationTag {
    pub const ALL: [LocationTag; 7] = [
        LocationTag::FileStart,
        LocationTag::LineStart,
        LocationTag::TopLineStart,
        LocationTag::InCode,
        LocationTag::InString,
        LocationTag::InComment,
        LocationTag::TypePosition,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LocationTag::FileStart => "file-start",
            LocationTag::LineStart => "line-start",
            LocationTag::TopLineStart => "top-line-start",
            LocationTag::InCode => "in-code",
            LocationTag::InString => "in-string",
            LocationTag::InComment => "in-comment",
            LocationTag::TypePosition => "type-position",
        }
    }
}

impl fmt::Display for LocationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocationTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| format!("unknown location `{}`", s))
    }
}

pub type TagSet = BTreeSet<LocationTag>;

/// One entry of `when.locations`: a tag, optionally negated with a `!` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationSpec {
    pub tag: LocationTag,
    pub negated: bool,
}

impl LocationSpec {
    pub fn positive(tag: LocationTag) -> Self {
        Self { tag, negated: false }
    }

    pub fn negative(tag: LocationTag) -> Self {
        Self { tag, negated: true }
    }
}

impl FromStr for LocationSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('!') {
            Some(rest) => Ok(Self::negative(rest.parse()?)),
            None => Ok(Self::positive(s.parse()?)),
        }
    }
}

impl fmt::Display for LocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.tag)
        } else {
            write!(f, "{}", self.tag)
        }
    }
}

impl Serialize for LocationSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Snippet body: lines of snippet text, or `false` for "insert nothing".
#[derive(Debug, Clone, PartialEq)]
pub enum SnippetBody {
    Lines(Vec<String>),
    NoInsertion,
}

impl SnippetBody {
    /// Body lines joined with `\n`, or `None` for [`SnippetBody::NoInsertion`].
    pub fn text(&self) -> Option<String> {
        match self {
            SnippetBody::Lines(lines) => Some(lines.join("\n")),
            SnippetBody::NoInsertion => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBody {
    Flag(bool),
    Line(String),
    Lines(Vec<String>),
}

impl<'de> Deserialize<'de> for SnippetBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawBody::deserialize(deserializer)? {
            RawBody::Flag(false) => Ok(SnippetBody::NoInsertion),
            RawBody::Flag(true) => Err(D::Error::custom(
                "body must be a string, an array of lines or `false`",
            )),
            RawBody::Line(line) => Ok(SnippetBody::Lines(
                line.split('\n').map(str::to_string).collect(),
            )),
            RawBody::Lines(lines) => Ok(SnippetBody::Lines(lines)),
        }
    }
}

impl Serialize for SnippetBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SnippetBody::Lines(lines) => lines.serialize(serializer),
            SnippetBody::NoInsertion => serializer.serialize_bool(false),
        }
    }
}

/// Text test applied to a neighbouring line (leading whitespace removed).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_regex: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_with: Option<String>,
}

/// Indentation target of an indentation matcher: a non-positive level or `"up"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentTarget {
    Level(i32),
    Up,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIndent {
    Level(i32),
    Keyword(String),
}

impl<'de> Deserialize<'de> for IndentTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawIndent::deserialize(deserializer)? {
            RawIndent::Level(level) if level <= 0 => Ok(IndentTarget::Level(level)),
            RawIndent::Level(level) => Err(D::Error::custom(format!(
                "indent level must be zero or negative, got {}",
                level
            ))),
            RawIndent::Keyword(word) if word == "up" => Ok(IndentTarget::Up),
            RawIndent::Keyword(word) => Err(D::Error::custom(format!(
                "indent must be a number or \"up\", got \"{}\"",
                word
            ))),
        }
    }
}

impl Serialize for IndentTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IndentTarget::Level(level) => serializer.serialize_i32(*level),
            IndentTarget::Up => serializer.serialize_str("up"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeLineMatcher {
    /// Offset from the cursor line; negative values look upward.
    pub line: i32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_empty_lines: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pass_if_missing: bool,
    #[serde(flatten)]
    pub test: LineTest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndentationMatcher {
    pub indent: IndentTarget,
    #[serde(flatten)]
    pub test: LineTest,
}

/// Neighbouring-line test, told apart by its `line` or `indent` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OtherLinesMatcher {
    Relative(RelativeLineMatcher),
    Indentation(IndentationMatcher),
}

impl<'de> Deserialize<'de> for OtherLinesMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Some(object) = value.as_object() else {
            return Err(D::Error::custom("otherLines matcher must be an object"));
        };
        match (object.contains_key("line"), object.contains_key("indent")) {
            (true, false) => serde_json::from_value(value)
                .map(OtherLinesMatcher::Relative)
                .map_err(D::Error::custom),
            (false, true) => serde_json::from_value(value)
                .map(OtherLinesMatcher::Indentation)
                .map_err(D::Error::custom),
            (true, true) => Err(D::Error::custom(
                "otherLines matcher takes either `line` or `indent`, not both",
            )),
            (false, false) => Err(D::Error::custom(
                "otherLines matcher needs a `line` or an `indent` key",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyBucket {
    Prod,
    Dev,
}

/// A package that must be declared by the enclosing manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRequirement {
    /// Satisfied by either bucket.
    Any(String),
    Bucket {
        #[serde(rename = "type")]
        bucket: DependencyBucket,
        dep: String,
    },
}

impl DependencyRequirement {
    pub fn name(&self) -> &str {
        match self {
            DependencyRequirement::Any(name) => name,
            DependencyRequirement::Bucket { dep, .. } => dep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhenClause {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<LocationSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_regex: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_lines: Option<Vec<OtherLinesMatcher>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub npm_dependencies: Vec<DependencyRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_regex: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_glob: Option<GlobPattern>,
}

impl WhenClause {
    pub fn declares_any(&self, tags: &[LocationTag]) -> bool {
        self.locations.iter().any(|spec| tags.contains(&spec.tag))
    }
}

/// Module an identifier is imported from; `None` accepts the first fix offered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

/// Editor command fired when a snippet is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCommand")]
pub struct SideEffectCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Name(String),
    Full {
        command: String,
        #[serde(default, alias = "arguments")]
        args: Vec<Value>,
    },
}

impl From<RawCommand> for SideEffectCommand {
    fn from(raw: RawCommand) -> Self {
        match raw {
            RawCommand::Name(command) => Self {
                command,
                args: Vec::new(),
            },
            RawCommand::Full { command, args } => Self { command, args },
        }
    }
}

/// Fields shared by both rule kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBase {
    pub body: SnippetBody,
    #[serde(default)]
    pub when: WhenClause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resolve_imports: BTreeMap<String, ImportSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_command: Option<SideEffectCommand>,
    /// Replace the text matched by `when.lineRegex` instead of inserting at the cursor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace_match: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Named,
    Sequence,
}

impl RuleKind {
    /// Configuration field holding the trigger text.
    pub fn trigger_field(self) -> &'static str {
        match self {
            RuleKind::Named => "name",
            RuleKind::Sequence => "sequence",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RuleKind::Named => "custom",
            RuleKind::Sequence => "typing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedRule {
    pub name: String,
    pub base: RuleBase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRule {
    pub sequence: String,
    pub base: RuleBase,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Named(NamedRule),
    Sequence(SequenceRule),
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Named(_) => RuleKind::Named,
            Rule::Sequence(_) => RuleKind::Sequence,
        }
    }

    /// The text the user types to reach this rule: its name or its sequence.
    pub fn trigger(&self) -> &str {
        match self {
            Rule::Named(rule) => &rule.name,
            Rule::Sequence(rule) => &rule.sequence,
        }
    }

    pub fn base(&self) -> &RuleBase {
        match self {
            Rule::Named(rule) => &rule.base,
            Rule::Sequence(rule) => &rule.base,
        }
    }

    pub fn when(&self) -> &WhenClause {
        &self.base().when
    }

    pub fn declares_npm_dependencies(&self) -> bool {
        !self.when().npm_dependencies.is_empty()
    }

    /// Configuration object equivalent to this rule, with no `extends`.
    pub fn to_unresolved(&self) -> Value {
        let mut value = serde_json::to_value(self.base()).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert(
                self.kind().trigger_field().to_string(),
                Value::String(self.trigger().to_string()),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_location_spec_parsing() {
        let spec: LocationSpec = "!in-comment".parse().unwrap();
        assert_eq!(spec, LocationSpec::negative(LocationTag::InComment));
        assert_eq!(spec.to_string(), "!in-comment");
        assert!("code".parse::<LocationSpec>().is_err());
    }

    #[test]
    fn test_body_forms() {
        let single: SnippetBody = serde_json::from_value(json!("a\nb")).unwrap();
        assert_eq!(single, SnippetBody::Lines(vec!["a".into(), "b".into()]));
        let none: SnippetBody = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(none.text(), None);
        assert!(serde_json::from_value::<SnippetBody>(json!(true)).is_err());
        assert_eq!(serde_json::to_value(&none).unwrap(), json!(false));
    }

    #[test]
    fn test_other_lines_variants() {
        let matchers: Vec<OtherLinesMatcher> = serde_json::from_value(json!([
            { "line": -1, "skipEmptyLines": true, "startsWith": "describe(" },
            { "indent": "up", "testRegex": "^class " },
            { "indent": -1, "endsWith": "{" }
        ]))
        .unwrap();
        assert!(matches!(
            &matchers[0],
            OtherLinesMatcher::Relative(m) if m.line == -1 && m.skip_empty_lines
        ));
        assert!(matches!(
            &matchers[1],
            OtherLinesMatcher::Indentation(m) if m.indent == IndentTarget::Up
        ));
        assert!(matches!(
            &matchers[2],
            OtherLinesMatcher::Indentation(m) if m.indent == IndentTarget::Level(-1)
        ));
        assert!(serde_json::from_value::<OtherLinesMatcher>(json!({ "indent": 2 })).is_err());
    }

    #[test]
    fn test_other_lines_error_names_the_cause() {
        let err = serde_json::from_value::<OtherLinesMatcher>(json!({ "line": -1, "testRegex": "(" }))
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid regex `(`"), "{}", err);
        assert!(!err.contains("did not match any variant"), "{}", err);

        let err = serde_json::from_value::<OtherLinesMatcher>(json!({ "indent": 3 }))
            .unwrap_err()
            .to_string();
        assert!(err.contains("indent level must be zero or negative"), "{}", err);

        assert!(serde_json::from_value::<OtherLinesMatcher>(json!({ "startsWith": "x" })).is_err());
    }

    #[test]
    fn test_dependency_requirement_forms() {
        let reqs: Vec<DependencyRequirement> =
            serde_json::from_value(json!(["react", { "type": "dev", "dep": "vitest" }])).unwrap();
        assert_eq!(reqs[0], DependencyRequirement::Any("react".into()));
        assert_eq!(
            reqs[1],
            DependencyRequirement::Bucket {
                bucket: DependencyBucket::Dev,
                dep: "vitest".into()
            }
        );
    }

    #[test]
    fn test_command_shorthand() {
        let cmd: SideEffectCommand = serde_json::from_value(json!("editor.action.format")).unwrap();
        assert_eq!(cmd.command, "editor.action.format");
        let full: SideEffectCommand =
            serde_json::from_value(json!({ "command": "x", "arguments": [1] })).unwrap();
        assert_eq!(full.args, vec![json!(1)]);
    }
}
