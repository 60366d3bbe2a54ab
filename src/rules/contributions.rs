//! Snippets and extends groups contributed at runtime by other extensions.
//!
//! Each contributor registers under an id; registering again under the same id
//! replaces everything that contributor provided.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contribution {
    pub custom_snippets: Vec<Value>,
    pub typing_snippets: Vec<Value>,
    pub extends_groups: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct ContributionRegistry {
    /// Registration order is kept so contributed snippets list deterministically.
    entries: RwLock<Vec<(String, Arc<Contribution>)>>,
}

impl ContributionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the contribution for `id`.
    pub fn register(&self, id: &str, contribution: Contribution) {
        let contribution = Arc::new(contribution);
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(existing, _)| existing == id) {
            Some(entry) => entry.1 = contribution,
            None => entries.push((id.to_string(), contribution)),
        }
        info!("Registered snippet contribution '{}'", id);
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| existing != id);
        before != entries.len()
    }

    pub fn snapshot(&self) -> Vec<(String, Arc<Contribution>)> {
        self.entries.read().clone()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_registration_wins_wholesale() {
        let registry = ContributionRegistry::new();
        registry.register(
            "ext.a",
            Contribution {
                custom_snippets: vec![json!({ "name": "one", "body": "1" })],
                extends_groups: json!({ "g": {} }).as_object().cloned().unwrap(),
                ..Default::default()
            },
        );
        registry.register("ext.b", Contribution::default());
        registry.register(
            "ext.a",
            Contribution {
                typing_snippets: vec![json!({ "sequence": "ll", "body": "2" })],
                ..Default::default()
            },
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, "ext.a");
        assert!(snapshot[0].1.custom_snippets.is_empty());
        assert!(snapshot[0].1.extends_groups.is_empty());
        assert_eq!(snapshot[0].1.typing_snippets.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = ContributionRegistry::new();
        registry.register("ext.a", Contribution::default());
        assert!(registry.unregister("ext.a"));
        assert!(!registry.unregister("ext.a"));
        assert!(registry.snapshot().is_empty());
    }
}
