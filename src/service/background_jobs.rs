// service/background_jobs.rs
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};

use crate::AppState;

const REMINDER_INTERVAL_SECS: u64 = 1800; // 30 minutes
const AUTO_CONFIRM_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Confirmation reminder loop. The running flag guards against a slow run
/// overlapping the next tick; a tick that finds the previous run still in
/// flight is skipped, not queued.
pub async fn start_confirmation_reminder_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(REMINDER_INTERVAL_SECS));
    let running = AtomicBool::new(false);

    loop {
        interval.tick().await;

        if running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Reminder tick skipped: previous run still in progress");
            continue;
        }

        tracing::info!("Running confirmation reminder job at {}", Utc::now());
        match app_state
            .contract_service
            .process_confirmation_reminders(Utc::now())
            .await
        {
            Ok(count) => tracing::info!("Reminder job completed: {} contracts processed", count),
            Err(e) => tracing::error!("Reminder job failed: {}", e),
        }

        running.store(false, Ordering::SeqCst);
    }
}

/// Auto-confirmation loop: force-completes contracts stuck in
/// awaiting_confirmation beyond the configured grace window.
pub async fn start_auto_confirmation_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(AUTO_CONFIRM_INTERVAL_SECS));
    let running = AtomicBool::new(false);
    let grace = ChronoDuration::hours(app_state.env.auto_confirm_grace_hours);

    loop {
        interval.tick().await;

        if running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Auto-confirm tick skipped: previous run still in progress");
            continue;
        }

        tracing::info!("Running auto-confirmation job at {}", Utc::now());
        match app_state
            .contract_service
            .process_auto_confirmations(Utc::now(), grace)
            .await
        {
            Ok(count) => {
                tracing::info!("Auto-confirmation job completed: {} contracts completed", count)
            }
            Err(e) => tracing::error!("Auto-confirmation job failed: {}", e),
        }

        running.store(false, Ordering::SeqCst);
    }
}
