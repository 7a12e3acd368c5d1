//! Cooperative timer wheel driven by the simulation clock
//!
//! Replaces interval/timeout callbacks with plain data: each entry is
//! (next fire time, optional period, action). The loop advances the scheduler
//! with the same clock that drives everything else, so timers never need a real
//! wall-clock wait and replays are exact.

use serde::{Deserialize, Serialize};

use crate::consts::MAX_TIMER_CATCH_UP;

/// Handle returned when a timer is scheduled; used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct TimerEntry<A> {
    handle: TimerHandle,
    next_fire: f64,
    period: Option<f64>,
    action: A,
}

/// A due timer, in firing order
#[derive(Debug, Clone, PartialEq)]
pub struct Firing<A> {
    pub handle: TimerHandle,
    pub due_at: f64,
    pub action: A,
}

#[derive(Debug, Clone)]
pub struct Scheduler<A> {
    entries: Vec<TimerEntry<A>>,
    next_handle: u64,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 1,
        }
    }
}

impl<A: Clone> Scheduler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, next_fire: f64, period: Option<f64>, action: A) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(TimerEntry {
            handle,
            next_fire,
            period,
            action,
        });
        handle
    }

    /// Repeat `action` every `period` ms, first firing one period from `now`
    pub fn every(&mut self, now: f64, period: f64, action: A) -> TimerHandle {
        debug_assert!(period > 0.0, "timer period must be positive");
        self.push(now + period, Some(period), action)
    }

    /// Fire `action` once, `delay` ms from `now`
    pub fn after(&mut self, now: f64, delay: f64, action: A) -> TimerHandle {
        self.push(now + delay.max(0.0), None, action)
    }

    /// Returns false if the handle was not scheduled
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    /// Cancel everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect every firing due at or before `now`, ordered by due time then
    /// handle. Periodic timers that fell far behind fire at most
    /// `MAX_TIMER_CATCH_UP` times and then resynchronize to `now`.
    pub fn advance(&mut self, now: f64) -> Vec<Firing<A>> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            let mut fired = 0;
            while entry.next_fire <= now {
                due.push(Firing {
                    handle: entry.handle,
                    due_at: entry.next_fire,
                    action: entry.action.clone(),
                });
                fired += 1;
                match entry.period {
                    Some(period) if fired < MAX_TIMER_CATCH_UP => entry.next_fire += period,
                    Some(period) => {
                        entry.next_fire = now + period;
                        log::debug!("timer {:?} dropped missed firings", entry.handle);
                    }
                    None => {
                        entry.next_fire = f64::INFINITY;
                    }
                }
            }
        }
        self.entries.retain(|e| e.next_fire.is_finite());
        due.sort_by(|a, b| a.due_at.total_cmp(&b.due_at).then(a.handle.cmp(&b.handle)));
        due
    }
}
