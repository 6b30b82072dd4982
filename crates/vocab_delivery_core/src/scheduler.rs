//! crates/vocab_delivery_core/src/scheduler.rs
//!
//! The Outbox Scheduler: materializes (subscriber, word, time, channel) send
//! jobs for one delivery day. Idempotent — re-running for a day that already
//! has jobs creates nothing new — and isolated per subscriber, so one bad
//! configuration never aborts the batch.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{JobStatus, OutboxJob, Subscriber};
use crate::planner::plan_delivery_times;
use crate::ports::{DeliveryStore, PortResult, WordGenerationService};
use crate::selection::select_words;

/// Aggregate counts from one scheduler run, recorded for observability.
#[derive(Debug, Clone, Default)]
pub struct SchedulerRunSummary {
    pub subscribers_processed: u32,
    pub jobs_created: u32,
    pub skipped_already_scheduled: u32,
    pub skipped_invalid: u32,
    pub failures: Vec<SubscriberFailure>,
}

/// One subscriber the run could not schedule, with a reproducible reason.
#[derive(Debug, Clone)]
pub struct SubscriberFailure {
    pub subscriber_id: Uuid,
    pub reason: String,
}

/// Creates the day's outbox jobs for every active subscriber.
///
/// Safe to call repeatedly for the same day: subscribers that already have a
/// non-cancelled job for `today` are skipped. Only a store-level failure on
/// the initial enumeration aborts the run; per-subscriber failures are
/// recorded in the summary and the loop continues.
pub async fn run_scheduler(
    store: &dyn DeliveryStore,
    generator: &dyn WordGenerationService,
    today: NaiveDate,
    now: DateTime<Utc>,
    seed: u64,
) -> PortResult<SchedulerRunSummary> {
    let subscribers = store.list_active_subscribers().await?;
    let mut summary = SchedulerRunSummary::default();

    info!(day = %today, subscribers = subscribers.len(), "outbox scheduler run started");

    for subscriber in &subscribers {
        match schedule_subscriber(store, generator, subscriber, today, now, seed).await {
            Ok(SubscriberOutcome::Created(jobs)) => {
                summary.subscribers_processed += 1;
                summary.jobs_created += jobs;
            }
            Ok(SubscriberOutcome::AlreadyScheduled) => {
                summary.skipped_already_scheduled += 1;
            }
            Ok(SubscriberOutcome::Invalid(reason)) => {
                summary.skipped_invalid += 1;
                summary.failures.push(SubscriberFailure {
                    subscriber_id: subscriber.id,
                    reason,
                });
            }
            Err(reason) => {
                warn!(
                    subscriber_id = %subscriber.id,
                    category = %subscriber.category,
                    "scheduling failed for subscriber: {reason}"
                );
                summary.failures.push(SubscriberFailure {
                    subscriber_id: subscriber.id,
                    reason,
                });
            }
        }
    }

    info!(
        day = %today,
        processed = summary.subscribers_processed,
        jobs_created = summary.jobs_created,
        skipped_already_scheduled = summary.skipped_already_scheduled,
        skipped_invalid = summary.skipped_invalid,
        failures = summary.failures.len(),
        "outbox scheduler run finished"
    );
    Ok(summary)
}

enum SubscriberOutcome {
    Created(u32),
    AlreadyScheduled,
    Invalid(String),
}

async fn schedule_subscriber(
    store: &dyn DeliveryStore,
    generator: &dyn WordGenerationService,
    subscriber: &Subscriber,
    today: NaiveDate,
    now: DateTime<Utc>,
    seed: u64,
) -> Result<SubscriberOutcome, String> {
    let Some(channel) = subscriber.preferred_channel() else {
        return Ok(SubscriberOutcome::Invalid(
            "no usable delivery target".to_string(),
        ));
    };
    if let Err(e) = subscriber.validate() {
        return Ok(SubscriberOutcome::Invalid(e.to_string()));
    }

    // Idempotency guard: a day with surviving jobs is never re-scheduled.
    let existing = store
        .jobs_scheduled_on(subscriber.id, today)
        .await
        .map_err(|e| e.to_string())?;
    if existing.iter().any(|j| j.status != JobStatus::Cancelled) {
        return Ok(SubscriberOutcome::AlreadyScheduled);
    }

    let slots = plan_delivery_times(subscriber).map_err(|e| e.to_string())?;
    let words = select_words(store, generator, subscriber, now, subscriber_seed(seed, subscriber))
        .await
        .map_err(|e| e.to_string())?;

    let mut created = 0u32;
    for (idx, (slot, selected)) in slots.iter().zip(words.iter()).enumerate() {
        let job = OutboxJob {
            id: Uuid::new_v4(),
            subscriber_id: subscriber.id,
            word_id: selected.word.id,
            headword: selected.word.word.clone(),
            body: selected.word.render_message(),
            channel,
            scheduled_at: local_slot_to_utc(today, *slot, subscriber.utc_offset_minutes),
            scheduled_for: today,
            slot_index: idx as i32,
            status: JobStatus::Queued,
            attempts: 0,
            created_at: now,
            last_attempt_at: None,
            error_detail: None,
            provider_message_id: None,
        };
        store.insert_job(&job).await.map_err(|e| e.to_string())?;
        created += 1;
    }

    Ok(SubscriberOutcome::Created(created))
}

/// Converts a subscriber-local wall-clock slot to the UTC send instant.
fn local_slot_to_utc(day: NaiveDate, slot: NaiveTime, utc_offset_minutes: i32) -> DateTime<Utc> {
    let local = day.and_time(slot);
    Utc.from_utc_datetime(&(local - Duration::minutes(utc_offset_minutes as i64)))
}

/// Per-subscriber seed derivation, so one run's fallback shuffles differ
/// between subscribers while staying reproducible for a fixed run seed.
fn subscriber_seed(run_seed: u64, subscriber: &Subscriber) -> u64 {
    run_seed ^ (subscriber.id.as_u128() as u64)
}
