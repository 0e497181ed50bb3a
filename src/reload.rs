//! Reload coordination: reload a unit, rebuild the table, publish it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::dispatch::{Dispatcher, build_table};
use crate::units::{ReloadOutcome, UnitId, UnitRegistry};

/// Result of one reload cycle.
#[derive(Debug)]
pub enum ReloadCycle {
    /// A new table was published.
    Published { generation: u64, commands: usize },
    /// Nothing was published; the previous table stays in force.
    Skipped(ReloadOutcome),
}

impl ReloadCycle {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Drives reload -> build -> publish as one unit of work.
///
/// Cycles are serialized, so the dispatcher only ever sees complete builds
/// and the last cycle to finish is the one in force.
pub struct ReloadCoordinator {
    registry: Arc<UnitRegistry>,
    dispatcher: Arc<Dispatcher>,
    context: Arc<Context>,
    cycle: Mutex<()>,
}

impl ReloadCoordinator {
    pub fn new(
        registry: Arc<UnitRegistry>,
        dispatcher: Arc<Dispatcher>,
        context: Arc<Context>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            context,
            cycle: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Build from the current registry contents and publish. Returns the
    /// published generation.
    pub fn rebuild(&self) -> u64 {
        let _cycle = self.cycle.lock();
        self.build_and_publish().0
    }

    /// Handle a "unit changed" event.
    pub fn on_unit_changed(&self, id: &UnitId) -> ReloadCycle {
        let _cycle = self.cycle.lock();

        match self.registry.reload_one(id) {
            ReloadOutcome::Reloaded { .. } => {
                let (generation, commands) = self.build_and_publish();
                crate::log_event!("reload", "published", "{id}: {commands} commands");
                ReloadCycle::Published {
                    generation,
                    commands,
                }
            }
            outcome => {
                crate::debug_event!("reload", "skipped", "{id}: {outcome:?}");
                ReloadCycle::Skipped(outcome)
            }
        }
    }

    /// Reload every unit and publish once if any reload succeeded.
    pub fn reload_all(&self) -> ReloadCycle {
        let _cycle = self.cycle.lock();

        let outcomes = self.registry.reload_all();
        let reloaded = outcomes.iter().filter(|(_, o)| o.is_reloaded()).count();
        let failed = outcomes.len() - reloaded;

        if reloaded == 0 {
            tracing::warn!("[reload] no unit reloaded successfully, table unchanged");
            return ReloadCycle::Skipped(
                outcomes
                    .into_iter()
                    .map(|(_, outcome)| outcome)
                    .next()
                    .unwrap_or(ReloadOutcome::Unknown),
            );
        }

        let (generation, commands) = self.build_and_publish();
        crate::log_event!(
            "reload",
            "published",
            "{reloaded} units reloaded, {failed} failed, {commands} commands"
        );
        ReloadCycle::Published {
            generation,
            commands,
        }
    }

    fn build_and_publish(&self) -> (u64, usize) {
        let table = build_table(&self.registry.snapshot(), &self.context);
        let commands = table.len();
        (self.dispatcher.publish(table), commands)
    }
}
