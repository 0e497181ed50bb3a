//! Change watcher that turns definition edits into reload cycles.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, select, unbounded};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::handle::WatcherHandle;
use super::paths::{WatchPaths, resolve_unit};
use crate::reload::ReloadCoordinator;

const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Watches unit definition files and asks the coordinator to reload the units
/// they belong to.
///
/// One `notify::RecommendedWatcher` feeds a dedicated thread. Reload cycles
/// run on that thread, one unit at a time, in the order changes arrived.
pub struct ChangeWatcher {
    coordinator: Arc<ReloadCoordinator>,
    extensions: Vec<String>,
    debouncer: Debouncer,
    paths: WatchPaths,
    tick: Duration,
}

impl ChangeWatcher {
    pub fn builder(coordinator: Arc<ReloadCoordinator>) -> ChangeWatcherBuilder {
        ChangeWatcherBuilder::new(coordinator)
    }

    /// Start watching on a new thread and attach it to `handle`.
    ///
    /// The notify backend and the initial directory set are set up before this
    /// returns, so backend failures surface here rather than in the thread.
    pub fn spawn(mut self, handle: &WatcherHandle) -> Result<(), WatchError> {
        if handle.is_attached() {
            return Err(WatchError::AlreadyStarted);
        }

        let (event_tx, event_rx) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(res);
        })?;

        self.refresh_watch_dirs(&mut watcher);
        if self.paths.is_empty() {
            tracing::warn!("[watcher] no unit directories to watch");
        } else {
            crate::log_event!(
                "watcher",
                "monitoring",
                "{} units in {} directories",
                self.coordinator.registry().len(),
                self.paths.len()
            );
        }

        let stop_rx = handle.stop_signal();
        let thread = thread::Builder::new()
            .name("hotcmd-watcher".into())
            .spawn(move || self.run(watcher, event_rx, stop_rx))
            .map_err(|e| WatchError::InitFailed {
                reason: e.to_string(),
            })?;

        handle.attach(thread)
    }

    fn run(
        mut self,
        mut watcher: RecommendedWatcher,
        event_rx: Receiver<notify::Result<Event>>,
        stop_rx: Receiver<()>,
    ) {
        crate::log_event!("watcher", "started");

        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(event_rx) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(e)) => tracing::error!("[watcher] file watch error: {e}"),
                    Err(_) => {
                        tracing::error!("[watcher] {}", WatchError::ChannelClosed);
                        break;
                    }
                },
                default(self.tick) => {}
            }

            let ready = self.debouncer.take_ready();
            if ready.is_empty() {
                continue;
            }
            for id in ready {
                crate::log_event!("watcher", "changed", "{id}");
                self.coordinator.on_unit_changed(&id);
            }
            // A reload can move a unit from a builtin to a file in a new directory
            self.refresh_watch_dirs(&mut watcher);
        }

        crate::debug_event!("watcher", "loop exited");
    }

    fn handle_event(&mut self, event: Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            crate::debug_event!("watcher", "ignored", "{:?}", event.kind);
            return;
        }

        let ids = self.coordinator.registry().ids();
        for path in &event.paths {
            match resolve_unit(path, &self.extensions, &ids) {
                Some(id) => self.debouncer.record(id),
                None => {
                    crate::debug_event!(
                        "watcher",
                        "unmatched",
                        "{:?} {}",
                        event.kind,
                        path.display()
                    );
                }
            }
        }
    }

    fn refresh_watch_dirs(&mut self, watcher: &mut RecommendedWatcher) {
        let registry = self.coordinator.registry();
        let mut new_dirs = self.paths.add_dirs(registry.loader().roots());
        new_dirs.extend(self.paths.add_files(registry.source_paths()));

        for dir in new_dirs {
            watch_directory(watcher, &dir);
        }
    }
}

fn watch_directory(watcher: &mut RecommendedWatcher, dir: &Path) {
    match watcher.watch(dir, RecursiveMode::NonRecursive) {
        Ok(()) => crate::debug_event!("watcher", "watching", "{}", dir.display()),
        Err(e) => {
            let e = WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            };
            // Keep going with the directories that did work
            tracing::warn!("[watcher] {e}");
        }
    }
}

/// Builder for [`ChangeWatcher`].
pub struct ChangeWatcherBuilder {
    coordinator: Arc<ReloadCoordinator>,
    extensions: Vec<String>,
    debounce_ms: u64,
    tick: Duration,
}

impl ChangeWatcherBuilder {
    fn new(coordinator: Arc<ReloadCoordinator>) -> Self {
        Self {
            coordinator,
            extensions: vec!["toml".to_string()],
            debounce_ms: 500,
            tick: DEFAULT_TICK,
        }
    }

    /// File extensions that denote unit definitions.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Quiet period before a changed unit is reloaded. Zero disables debouncing.
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// How often pending changes are checked when no events arrive.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn build(self) -> ChangeWatcher {
        ChangeWatcher {
            coordinator: self.coordinator,
            extensions: self.extensions,
            debouncer: Debouncer::new(self.debounce_ms),
            paths: WatchPaths::new(),
            tick: self.tick,
        }
    }
}
