//! Snippet declaration normalization.
//!
//! Resolution layers, later layers overriding earlier ones through a
//! recursive object merge (arrays and scalars are replaced wholesale):
//!
//! 1. kind defaults (`customSnippetDefaults` / `typingSnippetDefaults`)
//! 2. the extends group named by `extends`, with `$VAR` placeholders
//!    substituted from the snippet's `$`-prefixed keys
//! 3. the snippet's own fields
//!
//! A group may use `nameOrSequence`, which fills both `name` and `sequence`
//! so the same group serves named and typed snippets.

use serde_json::{Map, Value};
use tracing::debug;

use super::model::{NamedRule, Rule, RuleBase, RuleKind, SequenceRule};
use crate::error::{EngineError, Result};

const EXTENDS_KEY: &str = "extends";
const NAME_OR_SEQUENCE_KEY: &str = "nameOrSequence";

pub type ExtendsGroups = Map<String, Value>;

/// Resolve one snippet declaration into a [`Rule`].
pub fn normalize(
    kind: RuleKind,
    unresolved: &Value,
    defaults: &Value,
    groups: &ExtendsGroups,
) -> Result<Rule> {
    let own = unresolved.as_object().ok_or_else(|| {
        EngineError::invalid_rule(unresolved.to_string(), "snippet must be an object")
    })?;

    let variables = template_variables(own);
    let mut group = match own.get(EXTENDS_KEY).and_then(Value::as_str) {
        Some(name) => match groups.get(name) {
            Some(group) => group.clone(),
            None => {
                debug!("Extends group '{}' not found, using empty overrides", name);
                Value::Object(Map::new())
            }
        },
        None => Value::Object(Map::new()),
    };
    substitute_variables(&mut group, &variables);
    expand_name_or_sequence(&mut group);

    let mut own_value = Value::Object(
        own.iter()
            .filter(|(key, _)| !key.starts_with('$') && key.as_str() != EXTENDS_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    );
    expand_name_or_sequence(&mut own_value);

    let mut merged = match defaults {
        Value::Object(_) => defaults.clone(),
        _ => Value::Object(Map::new()),
    };
    deep_merge(&mut merged, group);
    deep_merge(&mut merged, own_value);

    let trigger = merged
        .get(kind.trigger_field())
        .and_then(Value::as_str)
        .filter(|trigger| !trigger.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::invalid_rule(
                describe(own),
                format!("{} snippet needs a non-empty `{}`", kind.label(), kind.trigger_field()),
            )
        })?;

    let base: RuleBase = serde_json::from_value(merged)
        .map_err(|err| EngineError::invalid_rule(trigger.clone(), err.to_string()))?;

    Ok(match kind {
        RuleKind::Named => Rule::Named(NamedRule { name: trigger, base }),
        RuleKind::Sequence => Rule::Sequence(SequenceRule {
            sequence: trigger,
            base,
        }),
    })
}

/// `$`-prefixed keys of the snippet, longest first so `$NAME_FULL` wins over `$NAME`.
fn template_variables(own: &Map<String, Value>) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = own
        .iter()
        .filter(|(key, _)| key.starts_with('$') && key.len() > 1)
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    vars
}

fn substitute_variables(value: &mut Value, vars: &[(String, String)]) {
    if vars.is_empty() {
        return;
    }
    match value {
        Value::String(text) => {
            for (name, replacement) in vars {
                if text.contains(name.as_str()) {
                    *text = text.replace(name.as_str(), replacement);
                }
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| substitute_variables(item, vars)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| substitute_variables(item, vars)),
        _ => {}
    }
}

fn expand_name_or_sequence(value: &mut Value) {
    if let Value::Object(map) = value {
        if let Some(trigger) = map.remove(NAME_OR_SEQUENCE_KEY) {
            for field in [RuleKind::Named.trigger_field(), RuleKind::Sequence.trigger_field()] {
                map.entry(field.to_string()).or_insert_with(|| trigger.clone());
            }
        }
    }
}

/// Merge `overlay` into `target`: objects merge key by key, everything else replaces.
pub(crate) fn deep_merge(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match target_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, overlay) => *target = overlay,
    }
}

fn describe(own: &Map<String, Value>) -> String {
    for key in ["name", "sequence", NAME_OR_SEQUENCE_KEY, EXTENDS_KEY] {
        if let Some(text) = own.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    "<unnamed>".to_string()
}
