//! Candidate filtering.
//!
//! Phase 1 is synchronous and cheap: language, path, lexical locations, line
//! regex and other lines. Phase 2 runs on the survivors only and may suspend
//! on manifest reads and the syntax oracle.

use std::sync::Arc;

use tracing::debug;

use crate::matching::{
    LEXICAL_UNIVERSE, ManifestCache, MatchContext, RuleCaptures, SYNTAX_RELATED, line_regex_match,
    location_match, other_lines_match, path_match, requirements_satisfied, syntax_tags,
};
use crate::oracle::{OracleMemo, SyntaxOracle, classify_memoized};
use crate::rules::{LocationTag, Rule, RuleId, RuleKind, RuleTable};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: RuleId,
    pub rule: Arc<Rule>,
}

impl Candidate {
    pub fn label(&self) -> &str {
        self.rule.trigger()
    }

    /// Display ordering key: explicit `sortText` or the label.
    pub fn sort_text(&self) -> &str {
        self.rule.base().sort_text.as_deref().unwrap_or_else(|| self.label())
    }
}

/// Filter result together with the context it was computed in.
#[derive(Debug)]
pub struct CandidateSet {
    pub context: MatchContext,
    pub candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.candidates.iter().map(Candidate::label).collect()
    }

    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.candidates.iter().map(|c| c.rule.clone()).collect()
    }
}

pub(crate) fn phase_one(table: &RuleTable, kind: RuleKind, ctx: &mut MatchContext) -> Vec<Candidate> {
    let language = ctx.document.language_id().to_string();
    let path = ctx.document.path();
    let line = ctx.position.line as usize;

    let mut survivors = Vec::new();
    for (id, rule) in table.rules_for(&language, kind) {
        let when = rule.when();
        if !path_match(when, path.as_deref()) {
            continue;
        }
        if !location_match(&when.locations, &ctx.valid_tags(rule.trigger()), &LEXICAL_UNIVERSE) {
            continue;
        }
        let mut captures = RuleCaptures::default();
        if !line_regex_match(when, &ctx.basis, &mut captures) {
            continue;
        }
        if let Some(matchers) = &when.other_lines {
            if !other_lines_match(ctx.document.as_ref(), line, matchers, &mut captures) {
                continue;
            }
        }
        ctx.record_captures(id, captures);
        survivors.push(Candidate { id, rule });
    }
    debug!(
        "Phase 1 kept {} {} rules for {} at {}:{}",
        survivors.len(),
        kind.label(),
        language,
        ctx.position.line,
        ctx.position.character
    );
    survivors
}

pub(crate) async fn phase_two(
    candidates: Vec<Candidate>,
    ctx: &mut MatchContext,
    manifests: &ManifestCache,
    oracle: &dyn SyntaxOracle,
    memo: &OracleMemo,
) -> Vec<Candidate> {
    let mut survivors = candidates;

    if survivors.iter().any(|c| c.rule.declares_npm_dependencies()) {
        let deps = match ctx.document.path() {
            Some(path) => Some(manifests.dependencies_for(&path).await),
            None => None,
        };
        survivors.retain(|c| {
            let requirements = &c.rule.when().npm_dependencies;
            let keep = requirements.is_empty()
                || deps.as_ref().is_some_and(|deps| requirements_satisfied(requirements, deps));
            if !keep {
                ctx.forget_captures(c.id);
            }
            keep
        });
    }

    if survivors.iter().any(|c| c.rule.when().declares_any(&SYNTAX_RELATED)) {
        let document = ctx.document.clone();
        let offset = document.offset_at(ctx.position);
        let kind = classify_memoized(oracle, memo, document.as_ref(), ctx.position.line, offset).await;
        debug!("Syntax at {}:{} resolved to {:?}", ctx.position.line, ctx.position.character, kind);
        ctx.syntax_tags = Some(syntax_tags(kind, ctx.lexical_in_code));

        survivors.retain(|c| {
            let keep = location_match(
                &c.rule.when().locations,
                &ctx.valid_tags(c.rule.trigger()),
                &LocationTag::ALL,
            );
            if !keep {
                ctx.forget_captures(c.id);
            }
            keep
        });
    }

    survivors
}

/// Orders candidates for display: `sortText` first, declaration order breaking ties.
pub fn display_order(candidates: &[Candidate]) -> Vec<&Candidate> {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.sort_text().cmp(b.sort_text()).then(a.id.cmp(&b.id)));
    ordered
}
