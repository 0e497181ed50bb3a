//! Wiring of the host components from settings.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::Settings;
use crate::context::Context;
use crate::dispatch::Dispatcher;
use crate::reload::ReloadCoordinator;
use crate::session::{DetachedSession, Session};
use crate::shutdown::{CloseSessionUnit, SHUTDOWN_UNIT};
use crate::units::{LoadReport, ManifestLoader, UnitId, UnitRegistry};
use crate::watcher::{ChangeWatcher, WatchError, WatcherHandle};

/// All long-lived components of a running host.
pub struct Host {
    coordinator: Arc<ReloadCoordinator>,
    watcher: Arc<WatcherHandle>,
    session: Arc<dyn Session>,
}

impl Host {
    /// Load units and publish the first command table.
    ///
    /// `only` replaces the configured unit list when non-empty. Units that
    /// fail to load are reported, not fatal.
    pub fn build(
        settings: &Settings,
        runtime: Handle,
        only: &[String],
    ) -> anyhow::Result<(Self, LoadReport)> {
        let names: &[String] = if only.is_empty() {
            &settings.units.enabled
        } else {
            only
        };
        let shutdown_id = UnitId::parse(SHUTDOWN_UNIT)?;
        let loader = ManifestLoader::new(settings.units_dir(), &settings.units.extension)
            .with_builtin(shutdown_id, CloseSessionUnit::factory);
        let registry = Arc::new(UnitRegistry::new(Arc::new(loader)));
        let report = registry.load_names(names);

        let session: Arc<dyn Session> = Arc::new(DetachedSession::new(&settings.session.name));
        let watcher = Arc::new(WatcherHandle::new());
        let context = Arc::new(
            Context::new(Arc::clone(&session), watcher.clone())
                .with_shutdown_policy(settings.shutdown.policy()),
        );

        let dispatcher = Arc::new(Dispatcher::new(runtime));
        let coordinator = Arc::new(ReloadCoordinator::new(registry, dispatcher, context));
        let generation = coordinator.rebuild();

        crate::log_event!(
            "host",
            "ready",
            "{} units, {} commands (generation {generation})",
            report.loaded.len(),
            coordinator.dispatcher().table().len()
        );

        Ok((
            Self {
                coordinator,
                watcher,
                session,
            },
            report,
        ))
    }

    pub fn coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.coordinator
    }

    pub fn context(&self) -> &Arc<Context> {
        self.coordinator.context()
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn watcher(&self) -> &Arc<WatcherHandle> {
        &self.watcher
    }

    /// Start the change watcher thread.
    pub fn start_watching(
        &self,
        extension: &str,
        debounce_ms: u64,
        tick: Option<Duration>,
    ) -> Result<(), WatchError> {
        let mut builder = ChangeWatcher::builder(Arc::clone(&self.coordinator))
            .extensions([extension])
            .debounce_ms(debounce_ms);
        if let Some(tick) = tick {
            builder = builder.tick(tick);
        }
        builder.build().spawn(&self.watcher)
    }
}
