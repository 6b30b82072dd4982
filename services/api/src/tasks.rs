//! services/api/src/tasks.rs
//!
//! Background loops: a periodic dispatcher drain and the daily scheduler
//! trigger. Both run on plain tokio intervals; a failed tick is logged and
//! the loop keeps going.

use chrono::{Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vocab_delivery_core::{dispatcher::run_dispatcher, scheduler::run_scheduler};

use crate::web::state::AppState;

/// Drains due outbox jobs at the configured cadence, forever.
pub async fn dispatch_loop(app_state: Arc<AppState>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(app_state.config.dispatch_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match run_dispatcher(
            app_state.store.as_ref(),
            app_state.whatsapp.as_ref(),
            app_state.email.as_ref(),
            Utc::now(),
        )
        .await
        {
            Ok(summary) if summary.examined > 0 => {
                info!(
                    sent = summary.sent,
                    failed = summary.failed,
                    deferred = summary.deferred,
                    "dispatch tick completed"
                );
            }
            Ok(_) => {}
            Err(e) => error!("dispatch tick failed: {e}"),
        }
    }
}

/// Fires the daily scheduler run during the configured UTC hour.
///
/// The tick is once a minute and the scheduler itself is idempotent per day,
/// so repeated triggers within the hour create nothing extra.
pub async fn scheduler_loop(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let now = Utc::now();
        if now.hour() != app_state.config.scheduler_hour_utc {
            continue;
        }
        match run_scheduler(
            app_state.store.as_ref(),
            app_state.generator.as_ref(),
            now.date_naive(),
            now,
            rand::random(),
        )
        .await
        {
            Ok(summary) if summary.jobs_created > 0 => {
                info!(
                    jobs_created = summary.jobs_created,
                    subscribers = summary.subscribers_processed,
                    "daily scheduler run completed"
                );
            }
            Ok(_) => {}
            Err(e) => error!("daily scheduler run failed: {e}"),
        }
    }
}
