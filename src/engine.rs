//! Snippet engine: owns the rule table and every cache, and answers requests.
//!
//! The engine is cheap to clone; clones share state. Configuration changes go
//! through [`SnippetEngine::reload`] and contribution registration, each of
//! which publishes a new [`RuleTable`] generation to subscribers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tower_lsp::lsp_types::{Diagnostic, Position, Range, Url};
use tracing::{debug, info, warn};

use crate::candidates::{Candidate, CandidateSet, phase_one, phase_two};
use crate::compile::{DiagnosticsEvent, EditPlan, ImportReport, ImportRequest, compile, resolve_imports};
use crate::config::Settings;
use crate::document::TextDocument;
use crate::error::Result;
use crate::host::EditorHost;
use crate::matching::{ManifestCache, MatchContext, syntax_tags};
use crate::oracle::{DisabledOracle, OracleMemo, SyntaxOracle, classify_memoized};
use crate::rules::{Contribution, ContributionRegistry, ImportSpec, RuleKind, RuleTable, TagSet};

struct EngineState {
    settings: RwLock<Settings>,
    rules: watch::Sender<Arc<RuleTable>>,
    contributions: ContributionRegistry,
    manifests: Arc<ManifestCache>,
    oracle: Arc<dyn SyntaxOracle>,
    disabled_oracle: Arc<dyn SyntaxOracle>,
    memo: OracleMemo,
    workspace_roots: RwLock<Vec<PathBuf>>,
    generation: AtomicU64,
    diagnostics: broadcast::Sender<DiagnosticsEvent>,
}

#[derive(Clone)]
pub struct SnippetEngine {
    state: Arc<EngineState>,
}

impl std::fmt::Debug for SnippetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnippetEngine")
            .field("generation", &self.state.generation.load(Ordering::SeqCst))
            .field("rules", &self.rules().len())
            .field("oracle", &self.state.oracle.name())
            .field("manifests", &self.state.manifests)
            .finish()
    }
}

impl SnippetEngine {
    pub fn new(settings: Settings, oracle: Arc<dyn SyntaxOracle>) -> Self {
        let table = RuleTable::build(&settings, &[], 1);
        let (rules, _) = watch::channel(Arc::new(table));
        let (diagnostics, _) = broadcast::channel(64);
        info!("Snippet engine created with {} oracle", oracle.name());
        Self {
            state: Arc::new(EngineState {
                manifests: Arc::new(ManifestCache::new(settings.npm_scan_limit)),
                settings: RwLock::new(settings),
                rules,
                contributions: ContributionRegistry::new(),
                oracle,
                disabled_oracle: Arc::new(DisabledOracle),
                memo: OracleMemo::new(),
                workspace_roots: RwLock::new(Vec::new()),
                generation: AtomicU64::new(1),
                diagnostics,
            }),
        }
    }

    pub fn settings(&self) -> Settings {
        self.state.settings.read().clone()
    }

    /// Current rule table.
    pub fn rules(&self) -> Arc<RuleTable> {
        self.state.rules.borrow().clone()
    }

    pub fn subscribe_rules(&self) -> watch::Receiver<Arc<RuleTable>> {
        self.state.rules.subscribe()
    }

    /// Directories whose `package.json` changed while the watcher was alive.
    pub fn subscribe_manifests(&self) -> broadcast::Receiver<PathBuf> {
        self.state.manifests.subscribe()
    }

    pub fn manifests(&self) -> &ManifestCache {
        &self.state.manifests
    }

    fn oracle(&self) -> Arc<dyn SyntaxOracle> {
        if self.state.settings.read().enable_syntax_oracle {
            self.state.oracle.clone()
        } else {
            self.state.disabled_oracle.clone()
        }
    }

    /// Replace the settings and rebuild the rule table.
    pub fn reload(&self, settings: Settings) -> Arc<RuleTable> {
        *self.state.settings.write() = settings;
        self.state.memo.clear();
        self.rebuild()
    }

    /// Rebuild the rule table from the current settings and contributions.
    pub fn rebuild(&self) -> Arc<RuleTable> {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let table = {
            let settings = self.state.settings.read();
            Arc::new(RuleTable::build(&settings, &self.state.contributions.snapshot(), generation))
        };
        self.state.rules.send_replace(table.clone());
        self.refresh_manifest_watcher(&table);
        table
    }

    /// Register (or wholesale replace) the snippets contributed under `id`.
    pub fn register_contribution(&self, id: &str, contribution: Contribution) -> Arc<RuleTable> {
        self.state.contributions.register(id, contribution);
        self.rebuild()
    }

    pub fn unregister_contribution(&self, id: &str) -> bool {
        let removed = self.state.contributions.unregister(id);
        if removed {
            self.rebuild();
        }
        removed
    }

    /// Set the workspace roots and seed the manifest cache when rules need it.
    pub async fn set_workspace_roots(&self, roots: Vec<PathBuf>) {
        *self.state.workspace_roots.write() = roots.clone();
        let table = self.rules();
        if table.declares_npm_dependencies() {
            for root in &roots {
                self.state.manifests.scan_workspace(root).await;
            }
        }
        self.refresh_manifest_watcher(&table);
    }

    fn refresh_manifest_watcher(&self, table: &RuleTable) {
        let needed = table.declares_npm_dependencies();
        if needed && tokio::runtime::Handle::try_current().is_err() {
            debug!("No runtime available, manifest watcher not started");
            return;
        }
        let roots = self.state.workspace_roots.read().clone();
        if let Err(e) = self.state.manifests.set_watching(&roots, needed) {
            warn!("Failed to update manifest watcher: {}", e);
        }
    }

    /// Feed diagnostics from the host; import resolution listens to these.
    pub fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        let _ = self.state.diagnostics.send(DiagnosticsEvent { uri, diagnostics });
    }

    pub fn clear_caches(&self) {
        self.state.manifests.clear();
        self.state.memo.clear();
        info!("Cleared manifest cache and oracle memo");
    }

    pub fn context(&self, document: Arc<dyn TextDocument>, position: Position) -> MatchContext {
        let strict = self.state.settings.read().strict_position_locations;
        MatchContext::new(document, position, strict)
    }

    /// Named-snippet candidates from the synchronous phase only.
    pub fn candidates(&self, document: Arc<dyn TextDocument>, position: Position) -> CandidateSet {
        let mut context = self.context(document, position);
        let candidates = phase_one(&self.rules(), RuleKind::Named, &mut context);
        CandidateSet { context, candidates }
    }

    /// Named-snippet candidates after both phases.
    pub async fn candidates_async(&self, document: Arc<dyn TextDocument>, position: Position) -> CandidateSet {
        let mut context = self.context(document, position);
        let first = phase_one(&self.rules(), RuleKind::Named, &mut context);
        let oracle = self.oracle();
        let candidates = phase_two(
            first,
            &mut context,
            &self.state.manifests,
            oracle.as_ref(),
            &self.state.memo,
        )
        .await;
        CandidateSet { context, candidates }
    }

    /// Every location tag valid at `position` for a rule triggered by `trigger`.
    pub async fn classify(&self, document: Arc<dyn TextDocument>, position: Position, trigger: &str) -> TagSet {
        let mut context = self.context(document.clone(), position);
        let offset = document.offset_at(context.position);
        let oracle = self.oracle();
        let kind = classify_memoized(
            oracle.as_ref(),
            &self.state.memo,
            document.as_ref(),
            context.position.line,
            offset,
        )
        .await;
        context.syntax_tags = Some(syntax_tags(kind, context.lexical_in_code));
        context.valid_tags(trigger)
    }

    pub fn compile(&self, candidate: &Candidate, context: &MatchContext) -> EditPlan {
        compile(candidate.id, &candidate.rule, context)
    }

    /// Typing snippet whose sequence was just completed at `position`, if any.
    pub async fn on_typed(&self, document: Arc<dyn TextDocument>, position: Position) -> Option<EditPlan> {
        let mut context = self.context(document, position);
        let mut first = phase_one(&self.rules(), RuleKind::Sequence, &mut context);
        first.retain(|c| context.prefix.ends_with(c.rule.trigger()));
        if first.is_empty() {
            return None;
        }
        let oracle = self.oracle();
        let survivors = phase_two(
            first,
            &mut context,
            &self.state.manifests,
            oracle.as_ref(),
            &self.state.memo,
        )
        .await;
        let chosen = survivors.first()?;
        debug!("Typed sequence {:?} triggers a snippet", chosen.rule.trigger());
        Some(compile(chosen.id, &chosen.rule, &context))
    }

    /// Apply `plan` through `host`: insert text, fire the command once, resolve imports.
    pub async fn accept(&self, host: &dyn EditorHost, uri: &Url, plan: &EditPlan) -> Result<Option<ImportReport>> {
        let diagnostics = self.state.diagnostics.subscribe();

        if let Some(text) = &plan.insert_text {
            host.insert_snippet(uri, plan.replace_range, text, plan.additional_edits.clone())
                .await?;
        }
        if let Some(command) = &plan.command {
            debug!("Executing snippet command {}", command.command);
            host.execute_command(command).await?;
        }

        match plan.inserted_range() {
            Some(inserted) if !plan.imports.is_empty() => {
                let report = self
                    .resolve_imports(host, uri, inserted, plan.imports.clone(), diagnostics)
                    .await;
                Ok(Some(report))
            }
            _ => Ok(None),
        }
    }

    /// Run an import observation window over `range` of `uri`.
    pub async fn resolve_imports(
        &self,
        host: &dyn EditorHost,
        uri: &Url,
        range: Range,
        table: BTreeMap<String, ImportSpec>,
        diagnostics: broadcast::Receiver<DiagnosticsEvent>,
    ) -> ImportReport {
        let window = self.state.settings.read().import_timeout();
        let request = ImportRequest {
            uri: uri.clone(),
            inserted: range,
            table,
            window,
        };
        let oracle = self.oracle();
        resolve_imports(host, oracle.as_ref(), request, diagnostics).await
    }

    pub(crate) fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticsEvent> {
        self.state.diagnostics.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RopeDocument;
    use serde_json::json;

    fn engine(settings: Settings) -> SnippetEngine {
        SnippetEngine::new(settings, Arc::new(DisabledOracle))
    }

    fn doc(text: &str) -> Arc<dyn TextDocument> {
        Arc::new(RopeDocument::new(Url::parse("file:///w/a.ts").unwrap(), "typescript", 1, text))
    }

    #[test]
    fn test_contribution_replaces_wholesale() {
        let engine = engine(Settings::default());
        let mut rx = engine.subscribe_rules();

        let first = Contribution {
            custom_snippets: vec![json!({ "name": "a", "body": "" }), json!({ "name": "b", "body": "" })],
            ..Default::default()
        };
        engine.register_contribution("ext", first);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 2);

        let second = Contribution {
            custom_snippets: vec![json!({ "name": "c", "body": "" })],
            ..Default::default()
        };
        let table = engine.register_contribution("ext", second);
        assert_eq!(table.len(), 1);
        assert!(table.find(RuleKind::Named, "c").is_some());

        assert!(engine.unregister_contribution("ext"));
        assert!(!engine.unregister_contribution("ext"));
        assert!(engine.rules().is_empty());
    }

    #[test]
    fn test_generations_increase() {
        let engine = engine(Settings::default());
        let g1 = engine.rules().generation();
        let g2 = engine.reload(Settings::default()).generation();
        assert!(g2 > g1);
    }

    #[tokio::test]
    async fn test_on_typed_requires_sequence_at_cursor() {
        let settings = Settings {
            typing_snippets: vec![json!({ "sequence": "cl ", "body": "console.log($1)", "when": { "languages": [] } })],
            ..Settings::default()
        };
        let engine = engine(settings);
        assert!(engine.on_typed(doc("cl x"), Position::new(0, 4)).await.is_none());
        let plan = engine.on_typed(doc("cl "), Position::new(0, 3)).await.unwrap();
        assert_eq!(plan.insert_text.as_deref(), Some("console.log($1)"));
    }

    #[tokio::test]
    async fn test_classify_without_oracle_is_permissive() {
        use crate::rules::LocationTag;

        let engine = engine(Settings::default());
        let tags = engine.classify(doc("foo"), Position::new(0, 3), "foo").await;
        assert!(tags.contains(&LocationTag::InComment));
        assert!(tags.contains(&LocationTag::InCode));
        assert!(tags.contains(&LocationTag::FileStart));
    }
}
