use std::time::{Duration, Instant};

use serde::Serialize;

pub const DEBOUNCE: Duration = Duration::from_secs(3);
pub const MIN_AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTrigger {
    /// Baseline save when a session has nothing stored yet.
    Initial,
    Manual,
    Auto,
}

impl SaveTrigger {
    fn merge(self, other: SaveTrigger) -> SaveTrigger {
        match (self, other) {
            (SaveTrigger::Auto, other) => other,
            (current, _) => current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Idle,
    Pending { due: Instant },
    InFlight { queued: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// The caller must perform the save now and report back via `complete`.
    Start(SaveTrigger),
    /// A save is already running; this one runs right after it.
    Queued,
}

/// Dirty tracking, debounce and single-slot queueing for state saves.
///
/// Time is passed in explicitly, so the controller never owns a timer.
#[derive(Debug, Clone)]
pub struct AutoSaveController {
    dirty: bool,
    revision: u64,
    saving_revision: u64,
    auto_save_enabled: bool,
    last_auto_save: Option<Instant>,
    deadline: Option<Instant>,
    in_flight: Option<SaveTrigger>,
    queued: Option<SaveTrigger>,
    debounce: Duration,
    min_interval: Duration,
}

impl Default for AutoSaveController {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoSaveController {
    pub fn new() -> Self {
        Self::with_timing(DEBOUNCE, MIN_AUTO_SAVE_INTERVAL)
    }

    pub fn with_timing(debounce: Duration, min_interval: Duration) -> Self {
        Self {
            dirty: false,
            revision: 0,
            saving_revision: 0,
            auto_save_enabled: false,
            last_auto_save: None,
            deadline: None,
            in_flight: None,
            queued: None,
            debounce,
            min_interval,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn auto_save_enabled(&self) -> bool {
        self.auto_save_enabled
    }

    pub fn enable_auto_save(&mut self) {
        self.auto_save_enabled = true;
    }

    pub fn phase(&self) -> SavePhase {
        if self.in_flight.is_some() {
            return SavePhase::InFlight {
                queued: self.queued.is_some(),
            };
        }
        match self.deadline {
            Some(due) => SavePhase::Pending { due },
            None => SavePhase::Idle,
        }
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty = true;
        self.revision += 1;
        self.deadline = None;
        if !self.auto_save_enabled {
            return;
        }
        let interval_elapsed = self
            .last_auto_save
            .map(|last| now.saturating_duration_since(last) >= self.min_interval)
            .unwrap_or(true);
        if interval_elapsed {
            self.deadline = Some(now + self.debounce);
        }
    }

    /// Fires the debounced auto-save once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<SaveDecision> {
        match self.deadline {
            Some(due) if due <= now => {
                self.deadline = None;
                Some(self.request(SaveTrigger::Auto, now))
            }
            _ => None,
        }
    }

    pub fn request(&mut self, trigger: SaveTrigger, now: Instant) -> SaveDecision {
        if self.in_flight.is_some() {
            self.queued = Some(match self.queued {
                Some(existing) => existing.merge(trigger),
                None => trigger,
            });
            return SaveDecision::Queued;
        }
        self.start(trigger, now);
        SaveDecision::Start(trigger)
    }

    fn start(&mut self, trigger: SaveTrigger, now: Instant) {
        self.in_flight = Some(trigger);
        self.saving_revision = self.revision;
        self.deadline = None;
        if trigger == SaveTrigger::Auto {
            self.last_auto_save = Some(now);
        }
    }

    /// Finishes the in-flight save. Returns the queued save, which the caller
    /// must start immediately.
    pub fn complete(&mut self, succeeded: bool, now: Instant) -> Option<SaveTrigger> {
        if self.in_flight.take().is_none() {
            return None;
        }
        if succeeded {
            self.auto_save_enabled = true;
            if self.revision == self.saving_revision {
                self.dirty = false;
            }
        }
        let next = self.queued.take()?;
        self.start(next, now);
        Some(next)
    }
}
