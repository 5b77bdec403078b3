use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use log::debug;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::reminders::ReminderPipeline;

/// One pipeline run per minute, matching the cadence the schedule times are
/// written for.
pub const TICK_INTERVAL_S: u64 = 60;

/// Runs forever: lines the first tick up with the next whole minute, then
/// fires every sixty seconds. A tick that runs long delays the next one; a
/// missed minute is simply missed, the pipeline holds no state to catch up.
pub async fn start_reminder_loop(pipeline: Arc<ReminderPipeline>) {
    let first_tick = Instant::now() + delay_to_next_minute(Utc::now());
    let mut interval = time::interval_at(first_tick, Duration::from_secs(TICK_INTERVAL_S));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let summary = pipeline.run_tick(Utc::now()).await;
        debug!(
            "reminder_loop:: tick {} finished, {} matched",
            summary.time, summary.matched
        );
    }
}

/// How long until the next minute boundary, so ticks land right after the
/// HH:MM key changes.
fn delay_to_next_minute(now: DateTime<Utc>) -> Duration {
    Duration::from_secs(TICK_INTERVAL_S - u64::from(now.second() % 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn delay_reaches_the_next_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 7, 30, 45).unwrap();
        assert_eq!(delay_to_next_minute(now), Duration::from_secs(15));
    }

    #[test]
    fn delay_on_the_boundary_waits_a_full_minute() {
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 7, 30, 0).unwrap();
        assert_eq!(delay_to_next_minute(now), Duration::from_secs(60));
    }
}
