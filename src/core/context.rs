//! Live settings and status shared by the facade and both engines
//!
//! Everything here is an atomic so the engines can observe a `command`
//! without being restarted. Engines parked on a queue can also wait on
//! [`LinkContext::changed`] to pick up a new setting immediately.

use std::sync::atomic::{AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::{BackoffPolicy, Command, LinkConfig, Status};

/// Which engine a detail log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Receiver,
    Sender,
}

/// Shared link settings and last recorded status
#[derive(Debug)]
pub struct LinkContext {
    debug_level: AtomicI32,
    backoff: AtomicU8,
    beacon_interval_ms: AtomicU64,
    status: AtomicU8,
    changed: Notify,
}

impl LinkContext {
    /// Creates a context seeded from the link configuration
    pub fn new(config: &LinkConfig) -> Self {
        LinkContext {
            debug_level: AtomicI32::new(config.debug_level),
            backoff: AtomicU8::new(config.backoff as u8),
            beacon_interval_ms: AtomicU64::new(crate::util::duration_to_millis(config.beacon_interval)),
            status: AtomicU8::new(Status::Success.code()),
            changed: Notify::new(),
        }
    }

    pub fn debug_level(&self) -> i32 {
        self.debug_level.load(Ordering::Relaxed)
    }

    /// Whether per-frame detail for `component` should be logged
    pub fn detail(&self, component: Component) -> bool {
        match self.debug_level() {
            level if level >= 4 => true,
            2 => component == Component::Receiver,
            3 => component == Component::Sender,
            _ => false,
        }
    }

    /// Whether ordinary link events should be logged at all
    pub fn chatty(&self) -> bool {
        self.debug_level() > 0
    }

    pub fn backoff(&self) -> BackoffPolicy {
        match self.backoff.load(Ordering::Relaxed) {
            1 => BackoffPolicy::Max,
            _ => BackoffPolicy::Random,
        }
    }

    /// Current beacon period, `None` when beacons are disabled
    pub fn beacon_interval(&self) -> Option<Duration> {
        match self.beacon_interval_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Last recorded status; out-of-range values read as an unspecified error
    pub fn status(&self) -> Status {
        Status::try_from(self.status.load(Ordering::Relaxed)).unwrap_or(Status::UnspecifiedError)
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status.code(), Ordering::Relaxed);
    }

    /// Resolves the next time a command changes a setting
    ///
    /// The future observes changes made after it was created, even before
    /// it is first polled.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    /// Applies an administrative command
    pub fn apply(&self, command: Command) {
        match command {
            Command::Help => {}
            Command::DebugLevel(level) => self.debug_level.store(level, Ordering::Relaxed),
            Command::SlotSelection(policy) => self.backoff.store(policy as u8, Ordering::Relaxed),
            Command::BeaconInterval(interval) => self
                .beacon_interval_ms
                .store(crate::util::duration_to_millis(interval), Ordering::Relaxed),
        }
        self.changed.notify_waiters();
    }
}
