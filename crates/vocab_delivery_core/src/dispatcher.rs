//! crates/vocab_delivery_core/src/dispatcher.rs
//!
//! The Delivery Dispatcher: drains queued outbox jobs whose scheduled time
//! has arrived and attempts one send per job per run. Transient provider
//! failures leave the job queued for the next externally triggered run;
//! permanent failures are terminal. One job's failure never blocks the rest
//! of the batch.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{Channel, JobStatus, OutboxJob, Subscriber};
use crate::ports::{DeliveryStore, EmailService, PortError, SendError, WhatsAppService};

/// Transient attempts allowed before a job is marked failed. Each retry
/// happens on a later dispatcher invocation, never in-process.
pub const MAX_ATTEMPTS: i32 = 3;

/// How many due jobs one run will claim.
const BATCH_LIMIT: u32 = 200;

/// Subject line used for email deliveries.
const EMAIL_SUBJECT: &str = "Your word of the moment";

/// Aggregate counts from one dispatcher run.
#[derive(Debug, Clone, Default)]
pub struct DispatchRunSummary {
    pub examined: u32,
    pub sent: u32,
    pub failed: u32,
    /// Transient failures left queued for a later run.
    pub deferred: u32,
    /// Jobs that were no longer queued by send time (sent, cancelled).
    pub skipped_not_queued: u32,
}

/// Attempts delivery for every due queued job.
///
/// Idempotent with respect to each job: the status is re-checked immediately
/// before the provider call, so an already-sent job is never re-sent and a
/// last-moment cancellation is honored.
pub async fn run_dispatcher(
    store: &dyn DeliveryStore,
    whatsapp: &dyn WhatsAppService,
    email: &dyn EmailService,
    now: DateTime<Utc>,
) -> Result<DispatchRunSummary, PortError> {
    let due = store.due_jobs(now, BATCH_LIMIT).await?;
    let mut summary = DispatchRunSummary::default();

    if due.is_empty() {
        return Ok(summary);
    }
    info!(due = due.len(), "delivery dispatcher run started");

    for job in &due {
        summary.examined += 1;
        match dispatch_job(store, whatsapp, email, job, now).await {
            Ok(outcome) => match outcome {
                JobOutcome::Sent => summary.sent += 1,
                JobOutcome::Failed => summary.failed += 1,
                JobOutcome::Deferred => summary.deferred += 1,
                JobOutcome::SkippedNotQueued => summary.skipped_not_queued += 1,
            },
            Err(e) => {
                // Store-level failure on one job; isolate and keep going.
                warn!(job_id = %job.id, "dispatch errored, continuing batch: {e}");
                summary.deferred += 1;
            }
        }
    }

    info!(
        sent = summary.sent,
        failed = summary.failed,
        deferred = summary.deferred,
        skipped = summary.skipped_not_queued,
        "delivery dispatcher run finished"
    );
    Ok(summary)
}

enum JobOutcome {
    Sent,
    Failed,
    Deferred,
    SkippedNotQueued,
}

async fn dispatch_job(
    store: &dyn DeliveryStore,
    whatsapp: &dyn WhatsAppService,
    email: &dyn EmailService,
    job: &OutboxJob,
    now: DateTime<Utc>,
) -> Result<JobOutcome, PortError> {
    // Re-check immediately before sending: honors cancellation and makes a
    // double invocation of the dispatcher a no-op for already-sent jobs.
    let status = store.job_status(job.id).await?;
    if status != JobStatus::Queued {
        return Ok(JobOutcome::SkippedNotQueued);
    }

    let subscriber = store.get_subscriber(job.subscriber_id).await?;
    let Some(target) = delivery_target(&subscriber, job.channel) else {
        store.mark_failed(job.id, "no-target", now).await?;
        warn!(job_id = %job.id, subscriber_id = %subscriber.id, "job failed: no-target");
        return Ok(JobOutcome::Failed);
    };

    let result = match job.channel {
        Channel::WhatsApp => whatsapp.send_message(&target, &job.body).await,
        Channel::Email => email.send_email(&target, EMAIL_SUBJECT, &job.body).await,
    };

    match result {
        Ok(receipt) => {
            store
                .mark_sent(job.id, &receipt.provider_message_id, now)
                .await?;
            Ok(JobOutcome::Sent)
        }
        Err(SendError::Transient(detail)) => {
            let attempts = store.record_attempt(job.id, &detail, now).await?;
            if attempts >= MAX_ATTEMPTS {
                let reason = format!("transient retries exhausted after {attempts} attempts: {detail}");
                store.mark_failed(job.id, &reason, now).await?;
                warn!(job_id = %job.id, "job failed: {reason}");
                Ok(JobOutcome::Failed)
            } else {
                info!(job_id = %job.id, attempts, "transient provider error, job left queued: {detail}");
                Ok(JobOutcome::Deferred)
            }
        }
        Err(e @ (SendError::Permanent(_) | SendError::Configuration(_))) => {
            let reason = e.to_string();
            store.mark_failed(job.id, &reason, now).await?;
            warn!(job_id = %job.id, subscriber_id = %subscriber.id, "job failed: {reason}");
            Ok(JobOutcome::Failed)
        }
    }
}

/// The delivery address for a job's channel, validated at dispatch time so a
/// number gone bad since scheduling is caught before any provider call.
fn delivery_target(subscriber: &Subscriber, channel: Channel) -> Option<String> {
    match channel {
        Channel::WhatsApp => subscriber
            .phone
            .clone()
            .filter(|p| crate::domain::is_valid_e164(p)),
        Channel::Email => subscriber.email.clone().filter(|e| !e.is_empty()),
    }
}
