use crate::detect::AnomalyDetector;
use crate::metrics::Window;
use crate::scheduler::DetectionSchedule;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main detection loop.
///
/// Runs immediately, then sleeps `fixed_delay` after each run completes, so
/// runs never overlap. `shutdown` is only observed while sleeping; a run that
/// has started always finishes its window.
pub async fn run_detection_loop(
    detector: AnomalyDetector,
    schedule: DetectionSchedule,
    shutdown: CancellationToken,
) {
    info!(
        delay_ms = schedule.fixed_delay.as_millis() as u64,
        window_secs = schedule.window.num_seconds(),
        "Detection scheduler started"
    );

    loop {
        run_scheduled_detection(&detector, schedule.window).await;

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Detection scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(schedule.fixed_delay) => {}
        }
    }
}

/// One scheduled pass over the trailing `window` ending now.
///
/// Returns the number of new anomalies, or `None` if the pass failed.
pub async fn run_scheduled_detection(
    detector: &AnomalyDetector,
    window: chrono::Duration,
) -> Option<usize> {
    let window = Window::trailing(Utc::now(), window);

    match detector.detect(window).await {
        Ok(summary) => {
            if summary.created > 0 {
                info!(
                    count = summary.created,
                    start = %window.start,
                    end = %window.end,
                    "{} new anomalies detected automatically in time window {} to {}",
                    summary.created,
                    window.start,
                    window.end
                );
            }
            Some(summary.created)
        }
        Err(e) => {
            error!(start = %window.start, end = %window.end, error = %e, "Scheduled detection failed");
            None
        }
    }
}
