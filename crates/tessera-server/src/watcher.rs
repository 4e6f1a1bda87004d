//! The watch loop: batches of file events in, builds and browser reloads out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tessera_build::{
    make_static_path_relative, pick_changed_path, BuildOrchestrator, BuildSession, ChangeEvent,
    ChangeSet, Op,
};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::batcher::{BatchStreams, Batcher};
use crate::classify::{classify, Classification, Registrations, SKIPPED_DIRS};
use crate::debounce::Debouncer;
use crate::discovery::discover;
use crate::error::WatchError;
use crate::symlinks::SymlinkRegistry;

/// Batches larger than this are treated as a mass edit.
pub const STORM_THRESHOLD: usize = 50;

/// Timing of the watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// How long events are collected before a batch is handed over
    pub batch_interval: Duration,
    /// Quiet period before a full rebuild after an event storm
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_secs(1),
            debounce: Duration::from_secs(2),
        }
    }
}

/// What the watch loop asks of the build side. All methods block.
pub trait BuildActions: Send + Sync + 'static {
    /// Paths the classifier needs, read fresh for every batch
    fn registrations(&self) -> Registrations;

    fn full_rebuild(&self);

    fn static_changes(&self, events: Vec<ChangeEvent>);

    fn dynamic_changes(&self, events: Vec<ChangeEvent>);
}

/// Decision for one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPlan {
    /// Only noise
    Idle,
    Storm,
    ConfigChanged,
    Dispatch {
        changes: ChangeSet,
        /// Directories created in this batch, to be added to the watch set
        new_dirs: Vec<PathBuf>,
    },
}

/// Decide what to do with a batch of raw events.
pub fn plan_batch(
    events: &[ChangeEvent],
    symlinks: &SymlinkRegistry,
    registrations: &Registrations,
) -> BatchPlan {
    if events.len() > STORM_THRESHOLD {
        return BatchPlan::Storm;
    }

    let mut changes = ChangeSet::default();
    let mut new_dirs = Vec::new();

    for event in events.iter().flat_map(|raw| symlinks.rewrite(raw)) {
        let class = classify(&event, registrations);
        match class {
            Classification::Noise => continue,
            Classification::Config => return BatchPlan::ConfigChanged,
            Classification::Static | Classification::Dynamic => {}
        }

        // `mkdir -p` only reports the top directory
        if event.op.contains(Op::CREATE) && event.path.is_dir() {
            walk_created_dir(&event.path, registrations, &mut new_dirs, &mut changes);
        }

        if class == Classification::Static {
            changes.static_changes.push(event);
        } else {
            changes.dynamic_changes.push(event);
        }
    }

    if changes.is_empty() && new_dirs.is_empty() {
        BatchPlan::Idle
    } else {
        BatchPlan::Dispatch { changes, new_dirs }
    }
}

fn walk_created_dir(
    dir: &Path,
    registrations: &Registrations,
    new_dirs: &mut Vec<PathBuf>,
    changes: &mut ChangeSet,
) {
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !SKIPPED_DIRS.iter().any(|skip| e.file_name() == *skip));

    for entry in walker.filter_map(Result::ok) {
        let path = entry.path();
        if entry.file_type().is_dir() {
            new_dirs.push(path.to_path_buf());
        } else if !registrations.is_static(path) {
            changes
                .dynamic_changes
                .push(ChangeEvent::new(path, Op::CREATE));
        }
    }
}

struct WatchLoop {
    actions: Arc<dyn BuildActions>,
    batcher: Batcher,
    symlinks: SymlinkRegistry,
    debouncer: Debouncer,
}

impl WatchLoop {
    async fn run(mut self, mut streams: BatchStreams) {
        loop {
            tokio::select! {
                batch = streams.events.recv() => match batch {
                    Some(batch) => self.handle_batch(batch).await,
                    None => break,
                },
                Some(err) = streams.errors.recv() => {
                    tracing::error!("Watch error: {}", err);
                }
            }
        }
        self.debouncer.cancel();
        tracing::debug!("Watch loop stopped");
    }

    async fn handle_batch(&mut self, batch: Vec<ChangeEvent>) {
        tracing::debug!("Received {} file event(s)", batch.len());
        // Reading them may wait for a running build to release the session
        let actions = Arc::clone(&self.actions);
        let registrations =
            match tokio::task::spawn_blocking(move || actions.registrations()).await {
                Ok(registrations) => registrations,
                Err(e) => {
                    tracing::error!("Failed to read watch registrations: {}", e);
                    return;
                }
            };

        match plan_batch(&batch, &self.symlinks, &registrations) {
            BatchPlan::Idle => {}
            BatchPlan::Storm => {
                tracing::info!(
                    "{} file events at once, scheduling a full rebuild",
                    batch.len()
                );
                let actions = Arc::clone(&self.actions);
                self.debouncer.trigger(move || actions.full_rebuild());
            }
            BatchPlan::ConfigChanged => {
                self.blocking(|actions| actions.full_rebuild()).await;
            }
            BatchPlan::Dispatch { changes, new_dirs } => {
                for dir in &new_dirs {
                    match self.batcher.add(dir) {
                        Ok(()) => tracing::info!("Adding created directory to watchlist {}", dir.display()),
                        Err(e) => tracing::warn!("{}", e),
                    }
                }

                let ChangeSet {
                    static_changes,
                    dynamic_changes,
                    ..
                } = changes;
                if !static_changes.is_empty() {
                    self.blocking(move |actions| actions.static_changes(static_changes))
                        .await;
                }
                if !dynamic_changes.is_empty() {
                    self.blocking(move |actions| actions.dynamic_changes(dynamic_changes))
                        .await;
                }
            }
        }
    }

    async fn blocking<F>(&self, f: F)
    where
        F: FnOnce(&dyn BuildActions) + Send + 'static,
    {
        let actions = Arc::clone(&self.actions);
        if let Err(e) = tokio::task::spawn_blocking(move || f(actions.as_ref())).await {
            tracing::error!("Build task failed: {}", e);
        }
    }
}

/// A running watch loop.
pub struct Watcher {
    batcher: Batcher,
    task: JoinHandle<()>,
}

impl Watcher {
    /// Watch every directory under `roots` plus the registered config files.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        actions: Arc<dyn BuildActions>,
        roots: &[PathBuf],
        options: WatchOptions,
    ) -> Result<Self, WatchError> {
        let (batcher, streams) = Batcher::new(options.batch_interval)?;

        let found = discover(roots);
        for dir in &found.dirs {
            batcher.add(dir)?;
        }
        for file in actions.registrations().config_files {
            if file.exists() {
                tracing::info!("Watching for config changes in {}", file.display());
                batcher.add(&file)?;
            }
        }
        tracing::debug!(
            "Watching {} director(ies), {} symlink(s)",
            found.dirs.len(),
            found.symlinks.len()
        );

        let watch_loop = WatchLoop {
            actions,
            batcher: batcher.clone(),
            symlinks: found.symlinks,
            debouncer: Debouncer::new(options.debounce),
        };
        let task = tokio::spawn(watch_loop.run(streams));

        Ok(Self { batcher, task })
    }

    /// Release the OS watch handle and stop the loop.
    pub fn close(self) {
        self.batcher.close();
        self.task.abort();
    }
}

/// [`BuildActions`] backed by a shared session.
pub struct SessionActions {
    session: Arc<Mutex<BuildSession>>,
    orchestrator: Arc<BuildOrchestrator>,
}

impl SessionActions {
    pub fn new(session: Arc<Mutex<BuildSession>>, orchestrator: Arc<BuildOrchestrator>) -> Self {
        Self {
            session,
            orchestrator,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BuildSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BuildActions for SessionActions {
    fn registrations(&self) -> Registrations {
        Registrations::from_config(&self.lock().config)
    }

    fn full_rebuild(&self) {
        let mut session = self.lock();
        if let Err(e) = self.orchestrator.full_rebuild_from_config(&mut session) {
            tracing::error!("Full rebuild failed: {}", e);
        }
    }

    fn static_changes(&self, events: Vec<ChangeEvent>) {
        let session = self.lock();
        tracing::info!("Static file changes detected");

        if let Err(e) = self.orchestrator.sync_static_changes(&session, &events) {
            tracing::error!("{}", e);
            return;
        }
        if session.live_reload_port().is_none() {
            return;
        }

        let dirs = session.config.abs_static_dirs();
        let base_path = session.config.base_path();
        let paths: Vec<String> = events
            .iter()
            .filter_map(|e| make_static_path_relative(&dirs, &e.path))
            .map(|rel| format!("{base_path}{}", rel.to_string_lossy().replace('\\', "/")))
            .collect();

        let reload = self.orchestrator.reload();
        if paths.is_empty() {
            reload.force_refresh();
        }
        for path in &paths {
            reload.refresh_path(path);
        }
    }

    fn dynamic_changes(&self, events: Vec<ChangeEvent>) {
        let mut session = self.lock();
        tracing::info!("Change detected, rebuilding site");

        let changed = pick_changed_path(&events).map(Path::to_path_buf);
        if let Err(e) = self.orchestrator.rebuild_from_changes(&mut session, &events) {
            tracing::error!("Failed to rebuild site: {}", e);
        }

        let Some(mode) = session.server.clone().filter(|m| m.live_reload) else {
            return;
        };
        let target = changed
            .filter(|_| mode.navigate_to_changed)
            .and_then(|path| self.orchestrator.permalink_for_source(&session, &path));

        let reload = self.orchestrator.reload();
        match target {
            Some(permalink) => reload.navigate_to(&permalink, mode.port),
            None => reload.force_refresh(),
        }
    }
}
