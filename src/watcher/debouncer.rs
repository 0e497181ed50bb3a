//! Debouncing of unit change events.
//!
//! Editors often write a file several times per save (auto-save, format on
//! save). Each write would trigger a reload; debouncing collapses a burst into
//! one reload once the unit has been quiet for the configured duration.
//! Reloads are idempotent, so this only saves work.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::units::UnitId;

/// Debounces change events by unit id.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending changes: unit -> (first seen order, last change timestamp).
    pending: HashMap<UnitId, (u64, Instant)>,
    /// How long a unit must be quiet before it is reloaded.
    duration: Duration,
    next_seq: u64,
}

impl Debouncer {
    /// Create a new debouncer with the given duration in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            duration: Duration::from_millis(debounce_ms),
            next_seq: 0,
        }
    }

    /// Record a change. Resets the timer for this unit but keeps its place in
    /// delivery order.
    pub fn record(&mut self, id: UnitId) {
        let now = Instant::now();
        match self.pending.get_mut(&id) {
            Some((_, last_change)) => *last_change = now,
            None => {
                self.pending.insert(id, (self.next_seq, now));
                self.next_seq += 1;
            }
        }
    }

    /// Take all units that have been quiet for the debounce duration, in the
    /// order their first change was recorded.
    pub fn take_ready(&mut self) -> Vec<UnitId> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|id, (seq, last_change)| {
            if now.duration_since(*last_change) >= self.duration {
                ready.push((*seq, id.clone()));
                false
            } else {
                true
            }
        });

        ready.sort_by_key(|(seq, _)| *seq);
        ready.into_iter().map(|(_, id)| id).collect()
    }

    /// Check if there are any pending changes.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn id(raw: &str) -> UnitId {
        UnitId::parse(raw).unwrap()
    }

    #[test]
    fn test_debouncer_basic() {
        let mut debouncer = Debouncer::new(50);

        debouncer.record(id("greet"));

        // Immediately after, nothing should be ready
        assert!(debouncer.take_ready().is_empty());
        assert!(debouncer.has_pending());

        sleep(Duration::from_millis(60));

        assert_eq!(debouncer.take_ready(), vec![id("greet")]);
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_debouncer_resets_on_new_change() {
        let mut debouncer = Debouncer::new(50);

        debouncer.record(id("greet"));
        sleep(Duration::from_millis(30));

        // Record again - should reset the timer
        debouncer.record(id("greet"));
        sleep(Duration::from_millis(30));

        // 60ms since the first change, 30ms since the last
        assert!(debouncer.take_ready().is_empty());

        sleep(Duration::from_millis(30));
        assert_eq!(debouncer.take_ready().len(), 1);
    }

    #[test]
    fn test_zero_duration_is_immediate() {
        let mut debouncer = Debouncer::new(0);
        debouncer.record(id("greet"));
        assert_eq!(debouncer.take_ready(), vec![id("greet")]);
    }

    #[test]
    fn test_ready_units_keep_delivery_order() {
        let mut debouncer = Debouncer::new(0);
        debouncer.record(id("zeta"));
        debouncer.record(id("alpha"));
        debouncer.record(id("mid"));

        assert_eq!(
            debouncer.take_ready(),
            vec![id("zeta"), id("alpha"), id("mid")]
        );
    }
}
