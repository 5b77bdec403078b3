use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use tokio::task::JoinSet;

use crate::fcm::PushGateway;
use crate::models::{NotificationPayload, EVERY_DAY};
use crate::store::{DueMedication, ReminderStore};
use crate::util::get_short_token;

/// Every `schedule.time` is written by the health UI as wall-clock time in
/// this zone, so matching must happen here no matter where the host runs.
pub const TIMEZONE: Tz = chrono_tz::Europe::Warsaw;

/// Zero-padded 24-hour "HH:MM" in the schedule timezone; the match key for
/// the current minute.
pub fn canonical_time_string(now: DateTime<Utc>) -> String {
    now.with_timezone(&TIMEZONE).format("%H:%M").to_string()
}

/// What one tick did, for the log line. The trigger gets the same trivial
/// acknowledgment whatever these counts say.
#[derive(Clone, Debug, Default)]
pub struct TickSummary {
    pub time: String,
    pub matched: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub query_failed: bool,
}

enum DispatchOutcome {
    Sent,
    Orphaned,
    NoTokens,
    TokenFetchFailed,
    SendFailed,
}

pub struct ReminderPipeline {
    store: Arc<dyn ReminderStore>,
    push: Arc<dyn PushGateway>,
}

impl ReminderPipeline {
    pub fn new(store: Arc<dyn ReminderStore>, push: Arc<dyn PushGateway>) -> ReminderPipeline {
        ReminderPipeline { store, push }
    }

    /// One tick: match every schedule against the current minute, then fan
    /// out per entry and wait for all dispatches to settle. Entry-level
    /// failures are logged and skipped; only a failed match query ends the
    /// tick early. Nothing is retried and nothing carries over to the next
    /// tick, so running the same instant twice dispatches twice.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickSummary {
        let time = canonical_time_string(now);
        info!("Checking reminders for time: {}", time);
        let mut summary = TickSummary { time: time.clone(), ..TickSummary::default() };

        let due = match self.store.due_medications(&time).await {
            Ok(due) => due,
            Err(e) => {
                error!("Reminder query failed: {}", e);
                summary.query_failed = true;
                return summary;
            }
        };
        if due.is_empty() {
            debug!("No meds scheduled for now.");
            return summary;
        }
        summary.matched = due.len();
        info!("Found {} meds due.", due.len());

        let mut dispatches = JoinSet::new();
        for entry in due {
            let store = Arc::clone(&self.store);
            let push = Arc::clone(&self.push);
            dispatches.spawn(async move { dispatch_reminder(store, push, entry).await });
        }
        while let Some(joined) = dispatches.join_next().await {
            match joined {
                Ok(DispatchOutcome::Sent) => summary.sent += 1,
                Ok(DispatchOutcome::Orphaned | DispatchOutcome::NoTokens) => summary.skipped += 1,
                Ok(DispatchOutcome::TokenFetchFailed | DispatchOutcome::SendFailed) => {
                    summary.failed += 1
                }
                Err(e) => {
                    error!("Dispatch task failed to join: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Tick {} done: {} sent, {} skipped, {} failed.",
            summary.time, summary.sent, summary.skipped, summary.failed
        );
        summary
    }
}

/// Resolve the owner, load their tokens, send one multicast. Every failure
/// here is terminal for this entry only; the rest of the tick keeps going.
async fn dispatch_reminder(
    store: Arc<dyn ReminderStore>,
    push: Arc<dyn PushGateway>,
    entry: DueMedication,
) -> DispatchOutcome {
    let owner = match entry.doc.parent_document() {
        Some(parent) => parent.id().to_string(),
        None => {
            warn!("Orphaned med doc: {}", entry.doc.id());
            return DispatchOutcome::Orphaned;
        }
    };

    let days = &entry.med.schedule.days;
    if !days.is_empty() && !days.iter().any(|day| day == EVERY_DAY) {
        // TODO: restrict delivery to the listed weekdays; today every
        // schedule fires on time alone whatever `days` says.
        debug!("dispatch:: '{}' lists specific days, filter not applied", entry.med.name);
    }

    let tokens = match store.device_tokens(&owner).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("Token fetch failed for user {}: {}", owner, e);
            return DispatchOutcome::TokenFetchFailed;
        }
    };
    if tokens.is_empty() {
        info!("No tokens for user {}", owner);
        return DispatchOutcome::NoTokens;
    }
    debug!(
        "dispatch:: user {} devices: {}",
        owner,
        tokens.iter().map(|t| get_short_token(t)).collect::<Vec<_>>().join(", ")
    );

    let device_count = tokens.len();
    let payload = NotificationPayload::for_medication(&entry.med, tokens);
    match push.send(&payload).await {
        Ok(report) => {
            debug!(
                "dispatch:: '{}' for user {} reached {}/{} devices",
                entry.med.name, owner, report.success, device_count
            );
            DispatchOutcome::Sent
        }
        Err(e) => {
            error!("Send failed for user {}: {}", owner, e);
            DispatchOutcome::SendFailed
        }
    }
}
