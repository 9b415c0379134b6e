//! Injected wall-clock so scheduling logic is testable without real waits.

use chrono::{DateTime, Local};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local wall clock. Sample alignment and the maintenance window
/// are keyed to local time, matching how the station is operated on site.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
