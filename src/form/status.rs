use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

/// Snapshot published after the debounce window settles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStatusChangedEvent {
    pub invalid: bool,
    pub dirty: bool,
    pub indexdata_changed: bool,
    pub data: Value,
}

/// Trailing-edge debounce driven by caller-supplied instants.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending_since: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending_since: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a change; restarts the window.
    pub fn touch(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// True once per burst, when `window` has passed since the last touch.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(since) if now.saturating_duration_since(since) >= self.window => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.pending_since = None;
    }
}
