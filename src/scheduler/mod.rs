//! Detection triggers: the recurring fixed-delay loop and on-demand scans.

pub mod engine;
pub mod manual;

pub use self::engine::{run_detection_loop, run_scheduled_detection};
pub use self::manual::{trigger_manual_detection, ScanReport, ScanStatus};

use std::time::Duration;

/// How the recurring detection loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSchedule {
    /// Measured from the completion of one run to the start of the next.
    pub fixed_delay: Duration,
    /// Trailing window each run scans, ending at the moment it starts.
    pub window: chrono::Duration,
}

impl Default for DetectionSchedule {
    fn default() -> Self {
        Self {
            fixed_delay: Duration::from_millis(300_000),
            window: chrono::Duration::minutes(5),
        }
    }
}
