//! Resolved rule table.
//!
//! Built once per configuration change. Rules are stored in declaration
//! order (user named snippets, user typing snippets, then contributions in
//! registration order) and indexed by concrete language id after superset
//! expansion.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::contributions::Contribution;
use super::model::{Rule, RuleKind};
use super::normalize::{ExtendsGroups, normalize};
use crate::config::{LanguageSupersets, Settings};

const ANY_LANGUAGE: &str = "*";

/// Position of a rule in its table. Only meaningful for the table that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub usize);

#[derive(Debug, Default)]
pub struct RuleTable {
    generation: u64,
    rules: Vec<Arc<Rule>>,
    by_language: HashMap<String, Vec<usize>>,
    any_language: Vec<usize>,
    /// Declarations that failed to normalize, as human readable messages.
    rejected: Vec<String>,
}

impl RuleTable {
    pub fn build(
        settings: &Settings,
        contributions: &[(String, Arc<Contribution>)],
        generation: u64,
    ) -> Self {
        let mut groups = ExtendsGroups::new();
        for (_, contribution) in contributions {
            for (name, group) in &contribution.extends_groups {
                groups.insert(name.clone(), group.clone());
            }
        }
        // User groups win over contributed ones of the same name
        for (name, group) in &settings.extends_groups {
            groups.insert(name.clone(), group.clone());
        }

        let mut sources: Vec<(RuleKind, &Value)> = Vec::new();
        sources.extend(settings.custom_snippets.iter().map(|s| (RuleKind::Named, s)));
        sources.extend(settings.typing_snippets.iter().map(|s| (RuleKind::Sequence, s)));
        for (_, contribution) in contributions {
            sources.extend(contribution.custom_snippets.iter().map(|s| (RuleKind::Named, s)));
            sources.extend(contribution.typing_snippets.iter().map(|s| (RuleKind::Sequence, s)));
        }

        let mut rules = Vec::with_capacity(sources.len());
        let mut rejected = Vec::new();
        for (kind, unresolved) in sources {
            let defaults = match kind {
                RuleKind::Named => &settings.custom_snippet_defaults,
                RuleKind::Sequence => &settings.typing_snippet_defaults,
            };
            match normalize(kind, unresolved, defaults, &groups) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    warn!("Skipping {} snippet: {}", kind.label(), e);
                    rejected.push(e.to_string());
                }
            }
        }

        let table = Self::from_rules(rules, &settings.language_supersets(), generation);
        info!(
            "Built rule table generation {}: {} rules, {} rejected",
            generation,
            table.len(),
            rejected.len()
        );
        Self { rejected, ..table }
    }

    pub fn from_rules(rules: Vec<Rule>, supersets: &LanguageSupersets, generation: u64) -> Self {
        let mut by_language: HashMap<String, Vec<usize>> = HashMap::new();
        let mut any_language = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            let languages = &rule.when().languages;
            if languages.is_empty() || languages.iter().any(|l| l == ANY_LANGUAGE) {
                any_language.push(index);
                continue;
            }
            for entry in languages {
                for language in supersets.expand(entry) {
                    let ids = by_language.entry(language.to_string()).or_default();
                    if ids.last() != Some(&index) {
                        ids.push(index);
                    }
                }
            }
        }

        Self {
            generation,
            rules: rules.into_iter().map(Arc::new).collect(),
            by_language,
            any_language,
            rejected: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Arc<Rule>)> {
        self.rules.iter().enumerate().map(|(i, rule)| (RuleId(i), rule))
    }

    /// Rules active for `language_id` of the given kind, in declaration order.
    pub fn rules_for(&self, language_id: &str, kind: RuleKind) -> Vec<(RuleId, Arc<Rule>)> {
        let mut ids: Vec<usize> = self
            .by_language
            .get(language_id)
            .map(|ids| ids.iter().copied().chain(self.any_language.iter().copied()).collect())
            .unwrap_or_else(|| self.any_language.clone());
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .filter(|&i| self.rules[i].kind() == kind)
            .map(|i| (RuleId(i), self.rules[i].clone()))
            .collect()
    }

    /// First rule of `kind` whose trigger is `trigger`.
    pub fn find(&self, kind: RuleKind, trigger: &str) -> Option<(RuleId, Arc<Rule>)> {
        self.iter()
            .find(|(_, rule)| rule.kind() == kind && rule.trigger() == trigger)
            .map(|(id, rule)| (id, rule.clone()))
    }

    pub fn declares_npm_dependencies(&self) -> bool {
        self.rules.iter().any(|rule| rule.declares_npm_dependencies())
    }
}
