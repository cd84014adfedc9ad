//! File watching for configuration documents.
//!
//! Two consumers sit on the debounced event stream:
//! - schema sync: after every settled edit to a sample document, its schema
//!   artifact is cleared and regenerated;
//! - live config: the resolved configuration is re-loaded and atomically
//!   swapped so readers always see a complete value.
//!
//! Rapid successive changes are coalesced by the debouncer, so regeneration
//! runs at most once per settled edit.

use crate::error::{ConfigError, SourceError};
use crate::load::{LoadOptions, load_config};
use crate::node::FilledConfig;
use crate::schema::regenerate_schema;
use arc_swap::ArcSwap;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Events emitted when watched documents change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeEvent {
    /// One document changed.
    Modified(PathBuf),
    /// Multiple documents changed in quick succession.
    BatchChange(Vec<PathBuf>),
    /// Watcher encountered an error.
    Error(String),
}

impl ConfigChangeEvent {
    /// Returns true if this event requires reloading derived state.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, ConfigChangeEvent::Error(_))
    }

    /// Get the affected paths for this event.
    pub fn affected_paths(&self) -> Vec<&Path> {
        match self {
            ConfigChangeEvent::Modified(p) => vec![p.as_path()],
            ConfigChangeEvent::BatchChange(paths) => paths.iter().map(|p| p.as_path()).collect(),
            ConfigChangeEvent::Error(_) => vec![],
        }
    }
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Handle to the running watcher.
pub struct WatcherHandle {
    /// Receiver for change events. Cloning allows multiple consumers.
    pub events: watch::Receiver<Option<ConfigChangeEvent>>,
    /// Handle to the watcher task (dropping this will stop the watcher).
    _task_handle: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    /// Wait for the next change event.
    pub async fn wait_for_change(&mut self) -> Option<ConfigChangeEvent> {
        // Skip the initial None value
        loop {
            if self.events.changed().await.is_err() {
                return None; // Sender dropped
            }
            let event = self.events.borrow().clone();
            if event.is_some() {
                return event;
            }
        }
    }
}

/// Start watching the given paths with debounced coalescing.
pub fn start_watcher(
    paths: Vec<PathBuf>,
    config: WatcherConfig,
) -> Result<WatcherHandle, notify::Error> {
    let (event_tx, event_rx) = watch::channel(None);
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(config.debounce_duration, notify_tx)?;
    let watcher = debouncer.watcher();

    for path in &paths {
        if path.exists() {
            info!("watching {}", path.display());
            watcher.watch(path, notify::RecursiveMode::NonRecursive)?;
        } else {
            warn!("path does not exist, skipping watch: {}", path.display());
        }
    }

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx);
    });

    Ok(WatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

/// Forward debounced notify batches as coalesced change events.
fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    tx: watch::Sender<Option<ConfigChangeEvent>>,
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                if let Some(event) = coalesce(events) {
                    debug!("config change detected: {:?}", event);
                    if tx.send(Some(event)).is_err() {
                        info!("watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("file watcher error: {}", e);
                let _ = tx.send(Some(ConfigChangeEvent::Error(e.to_string())));
            }
            Err(_) => {
                info!("watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Collapse one debounced batch into a single change event.
fn coalesce(events: Vec<DebouncedEvent>) -> Option<ConfigChangeEvent> {
    let mut changed: Vec<PathBuf> = Vec::new();
    for event in events {
        if !matches!(
            event.kind,
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
        ) {
            continue;
        }
        if !changed.contains(&event.path) {
            changed.push(event.path);
        }
    }
    match changed.len() {
        0 => None,
        1 => Some(ConfigChangeEvent::Modified(changed.remove(0))),
        _ => Some(ConfigChangeEvent::BatchChange(changed)),
    }
}

/// A sample document whose schema artifact is kept in sync.
#[derive(Debug, Clone)]
pub struct SchemaTarget {
    /// Document to watch and re-infer from.
    pub sample_path: PathBuf,
    /// Name recorded in the artifact header.
    pub name: String,
    /// Artifact to clear and regenerate.
    pub artifact_path: PathBuf,
}

impl SchemaTarget {
    fn matches(&self, changed: &Path) -> bool {
        same_file(&self.sample_path, changed)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canon_a = std::fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let canon_b = std::fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    canon_a == canon_b
}

/// Regenerate the artifact for one target from its current sample content.
pub fn regenerate_target(target: &SchemaTarget) -> Result<(), ConfigError> {
    let location = target.sample_path.display().to_string();
    let text = std::fs::read_to_string(&target.sample_path)
        .map_err(|e| SourceError::transport(&location, e))?;
    let sample: Value = if location.ends_with(".json") {
        serde_json::from_str(&text).map_err(|e| SourceError::malformed(&location, e))?
    } else {
        serde_yaml::from_str(&text).map_err(|e| SourceError::malformed(&location, e))?
    };
    regenerate_schema(&sample, &target.name, &target.artifact_path)?;
    Ok(())
}

/// Loop on change events, regenerating each affected target's artifact.
///
/// A failing target is logged and skipped; the loop keeps serving the rest.
pub async fn run_schema_sync(mut handle: WatcherHandle, targets: Vec<SchemaTarget>) {
    while let Some(event) = handle.wait_for_change().await {
        if !event.requires_reload() {
            continue;
        }
        for changed in event.affected_paths() {
            let Some(target) = targets.iter().find(|t| t.matches(changed)) else {
                continue;
            };
            match regenerate_target(target) {
                Ok(()) => info!(
                    "schema for {} regenerated at {}",
                    target.sample_path.display(),
                    target.artifact_path.display()
                ),
                Err(e) => error!(
                    "schema regeneration failed for {}: {}",
                    target.sample_path.display(),
                    e
                ),
            }
        }
    }
}

/// A live-tracked configuration: the latest successfully resolved value,
/// atomically swapped on change so readers never see a partial merge.
pub struct LiveConfig {
    current: Arc<ArcSwap<FilledConfig>>,
    _task: tokio::task::JoinHandle<()>,
}

impl LiveConfig {
    /// Resolve once, then keep re-resolving whenever the configuration
    /// directory changes. The merged node's `watch` interval, when present,
    /// supplies the debounce window.
    pub async fn start(options: LoadOptions) -> Result<Self, ConfigError> {
        let initial = load_config(options.clone()).await?;
        let debounce = initial
            .watch
            .map(Duration::from_millis)
            .unwrap_or_else(|| WatcherConfig::default().debounce_duration);

        let dir = options.effective_dir();
        let handle = start_watcher(
            vec![dir.clone()],
            WatcherConfig {
                debounce_duration: debounce,
            },
        )
        .map_err(|e| SourceError::transport(dir.display().to_string(), e))?;

        let current = Arc::new(ArcSwap::from_pointee(initial));
        let task = tokio::spawn({
            let current = Arc::clone(&current);
            let mut handle = handle;
            async move {
                while let Some(event) = handle.wait_for_change().await {
                    if !event.requires_reload() {
                        continue;
                    }
                    match load_config(options.clone()).await {
                        Ok(filled) => {
                            current.store(Arc::new(filled));
                            info!("live configuration reloaded");
                        }
                        Err(e) => error!("live configuration reload failed: {}", e),
                    }
                }
            }
        });

        Ok(Self {
            current,
            _task: task,
        })
    }

    /// The latest resolved configuration.
    pub fn current(&self) -> Arc<FilledConfig> {
        self.current.load_full()
    }
}
