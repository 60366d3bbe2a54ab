//! Snippet rules: model, normalization and the resolved rule table.

pub mod contributions;
pub mod model;
pub mod normalize;
pub mod pattern;
pub mod table;

pub use contributions::{Contribution, ContributionRegistry};
pub use model::{
    DependencyBucket, DependencyRequirement, ImportSpec, IndentTarget, IndentationMatcher,
    LineTest, LocationSpec, LocationTag, NamedRule, OtherLinesMatcher, RelativeLineMatcher, Rule,
    RuleBase, RuleKind, SequenceRule, SideEffectCommand, SnippetBody, TagSet, WhenClause,
};
pub use normalize::{ExtendsGroups, normalize};
pub use pattern::{GlobPattern, Pattern};
pub use table::{RuleId, RuleTable};
