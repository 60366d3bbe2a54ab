//! `when.npmDependencies` matching backed by a `package.json` cache.
//!
//! # Cache
//!
//! - **Key**: directory containing the manifest (directories without one cache an empty entry)
//! - **Value**: dependency names split into prod and dev buckets
//! - **Lookup**: union over the document's directory and all of its ancestors
//! - **Invalidation**: filesystem watcher, alive only while some rule needs it
//!
//! Unreadable or malformed manifests count as declaring nothing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::rules::{DependencyBucket, DependencyRequirement};

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDependencies {
    pub dependencies: BTreeSet<String>,
    pub dev_dependencies: BTreeSet<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PackageManifest {
    dependencies: Map<String, Value>,
    peer_dependencies: Map<String, Value>,
    optional_dependencies: Map<String, Value>,
    dev_dependencies: Map<String, Value>,
}

impl ManifestDependencies {
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: PackageManifest = serde_json::from_str(text)?;
        Ok(Self {
            dependencies: manifest
                .dependencies
                .into_iter()
                .chain(manifest.peer_dependencies)
                .chain(manifest.optional_dependencies)
                .map(|(name, _)| name)
                .collect(),
            dev_dependencies: manifest.dev_dependencies.into_iter().map(|(name, _)| name).collect(),
        })
    }

    pub fn merge(&mut self, other: &ManifestDependencies) {
        self.dependencies.extend(other.dependencies.iter().cloned());
        self.dev_dependencies.extend(other.dev_dependencies.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.dev_dependencies.is_empty()
    }

    pub fn satisfies(&self, requirement: &DependencyRequirement) -> bool {
        match requirement {
            DependencyRequirement::Any(name) => {
                self.dependencies.contains(name) || self.dev_dependencies.contains(name)
            }
            DependencyRequirement::Bucket {
                bucket: DependencyBucket::Prod,
                dep,
            } => self.dependencies.contains(dep),
            DependencyRequirement::Bucket {
                bucket: DependencyBucket::Dev,
                dep,
            } => self.dev_dependencies.contains(dep),
        }
    }
}

pub fn requirements_satisfied(requirements: &[DependencyRequirement], deps: &ManifestDependencies) -> bool {
    requirements.iter().all(|requirement| deps.satisfies(requirement))
}

struct ManifestWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    roots: Vec<PathBuf>,
}

impl Drop for ManifestWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ManifestCache {
    entries: DashMap<PathBuf, Arc<ManifestDependencies>>,
    watcher: Mutex<Option<ManifestWatcher>>,
    changes: broadcast::Sender<PathBuf>,
    scan_limit: usize,
}

impl std::fmt::Debug for ManifestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestCache")
            .field("entries", &self.entries.len())
            .field("watching", &self.is_watching())
            .field("scan_limit", &self.scan_limit)
            .finish()
    }
}

impl ManifestCache {
    pub fn new(scan_limit: usize) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: DashMap::new(),
            watcher: Mutex::new(None),
            changes,
            scan_limit,
        }
    }

    /// Directories whose manifest changed on disk.
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Union of the dependencies declared for `file`'s directory and its ancestors.
    pub async fn dependencies_for(&self, file: &Path) -> ManifestDependencies {
        let mut merged = ManifestDependencies::default();
        let Some(dir) = file.parent() else {
            return merged;
        };
        for ancestor in dir.ancestors() {
            let cached = self.entries.get(ancestor).map(|entry| entry.value().clone());
            let deps = match cached {
                Some(deps) => deps,
                None => self.load(ancestor).await,
            };
            merged.merge(&deps);
        }
        merged
    }

    /// Read (or re-read) the manifest of `dir` into the cache.
    pub async fn load(&self, dir: &Path) -> Arc<ManifestDependencies> {
        let deps = Arc::new(read_manifest(&dir.join(MANIFEST_FILE)).await);
        self.entries.insert(dir.to_path_buf(), deps.clone());
        deps
    }

    pub fn invalidate(&self, dir: &Path) {
        self.entries.remove(dir);
    }

    /// Seed the cache from the manifests under `root`, up to the scan limit.
    pub async fn scan_workspace(&self, root: &Path) -> usize {
        let root = root.to_path_buf();
        let limit = self.scan_limit;
        let manifests = tokio::task::spawn_blocking(move || find_manifests(&root, limit))
            .await
            .unwrap_or_else(|e| {
                warn!("Manifest scan task failed: {}", e);
                Vec::new()
            });

        let loads = manifests.iter().filter_map(|path| path.parent()).map(|dir| self.load(dir));
        let loaded = futures::future::join_all(loads).await.len();
        info!("Seeded manifest cache with {} package.json files", loaded);
        loaded
    }

    /// Start or stop watching `roots`. Must be called inside a tokio runtime when `needed`.
    pub fn set_watching(self: &Arc<Self>, roots: &[PathBuf], needed: bool) -> Result<()> {
        let mut slot = self.watcher.lock();
        if !needed || roots.is_empty() {
            if slot.take().is_some() {
                info!("No rule declares npm dependencies, stopped manifest watcher");
            }
            return Ok(());
        }
        if slot.as_ref().is_some_and(|w| w.roots == roots) {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        for root in roots {
            if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
                warn!("Failed to watch {:?} for manifest changes: {}", root, e);
            }
        }

        let cache = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Manifest watcher error: {}", e);
                        continue;
                    }
                };
                let Some(cache) = cache.upgrade() else { break };
                for path in event.paths {
                    if path.file_name().is_some_and(|name| name == MANIFEST_FILE) {
                        if let Some(dir) = path.parent() {
                            debug!("Manifest changed: {:?}", path);
                            cache.load(dir).await;
                            let _ = cache.changes.send(dir.to_path_buf());
                        }
                    }
                }
            }
            debug!("Manifest watcher task terminated");
        });

        info!("Watching {} workspace root(s) for package.json changes", roots.len());
        *slot = Some(ManifestWatcher {
            _watcher: watcher,
            task,
            roots: roots.to_vec(),
        });
        Ok(())
    }
}

async fn read_manifest(path: &Path) -> ManifestDependencies {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ManifestDependencies::default(),
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            return ManifestDependencies::default();
        }
    };
    ManifestDependencies::parse(&text).unwrap_or_else(|e| {
        warn!("Failed to parse {:?}: {}", path, e);
        ManifestDependencies::default()
    })
}

fn find_manifests(root: &Path, limit: usize) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != "node_modules" && entry.file_name() != ".git")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
        .map(|entry| entry.into_path())
        .take(limit)
        .collect()
}
