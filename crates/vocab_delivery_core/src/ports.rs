//! crates/vocab_delivery_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the delivery core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    DeliveryStatusRecord, JobStatus, OutboxJob, Subscriber, VocabularyWord, WordHistoryEntry,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Provider Error Classification
//=========================================================================================

/// A messaging provider failure, classified for retry handling.
///
/// Adapters map HTTP status conventions onto these variants:
/// 429 and 5xx (and timeouts) are transient, other 4xx are permanent.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Rate limit, timeout or server error. Eligible for retry on a later run.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Invalid recipient, rejected content, other permanent 4xx. Never retried.
    #[error("permanent provider error: {0}")]
    Permanent(String),
    /// Missing credentials or sender configuration. Fails fast.
    #[error("provider configuration error: {0}")]
    Configuration(String),
}

/// The provider's acknowledgement of an accepted message.
#[derive(Debug, Clone)]
pub struct ProviderReceipt {
    pub provider_message_id: String,
}

//=========================================================================================
// Persistence Port
//=========================================================================================

/// Aggregate counts of delivery outcomes over a trailing window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryCounts {
    pub sent: i64,
    pub failed: i64,
}

/// The persistence boundary for all delivery-core entities.
///
/// Coordination state (job status, history) lives here, never in process
/// memory, so every batch run is independently resumable.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    // --- Subscribers ---
    /// Subscribers with a usable delivery target on at least one channel.
    async fn list_active_subscribers(&self) -> PortResult<Vec<Subscriber>>;

    async fn get_subscriber(&self, subscriber_id: Uuid) -> PortResult<Subscriber>;

    async fn count_active_subscribers(&self) -> PortResult<i64>;

    // --- Vocabulary Inventory ---
    /// Words in a category whose headword is not in `excluding`, up to `limit`.
    async fn words_in_category(
        &self,
        category: &str,
        excluding: &[String],
        limit: u32,
    ) -> PortResult<Vec<VocabularyWord>>;

    /// Persists new words and returns the stored rows, in input order. A
    /// headword that already exists in the category resolves to the existing
    /// row, so callers always get ids that are safe to reference from
    /// history and jobs.
    async fn insert_words(&self, words: &[VocabularyWord]) -> PortResult<Vec<VocabularyWord>>;

    // --- Word History ---
    /// Headwords already shown to the subscriber in this category.
    async fn history_headwords(
        &self,
        subscriber_id: Uuid,
        category: &str,
    ) -> PortResult<Vec<String>>;

    async fn append_history(&self, entry: &WordHistoryEntry) -> PortResult<()>;

    // --- Outbox ---
    async fn insert_job(&self, job: &OutboxJob) -> PortResult<()>;

    /// All of a subscriber's jobs for a given delivery date, any status.
    async fn jobs_scheduled_on(
        &self,
        subscriber_id: Uuid,
        day: NaiveDate,
    ) -> PortResult<Vec<OutboxJob>>;

    /// Queued jobs whose scheduled time has arrived, oldest first.
    async fn due_jobs(&self, now: DateTime<Utc>, limit: u32) -> PortResult<Vec<OutboxJob>>;

    /// Current status of a job; re-checked immediately before a send so a
    /// last-moment cancellation is honored.
    async fn job_status(&self, job_id: Uuid) -> PortResult<JobStatus>;

    /// Transition `queued -> sent`. A no-op on jobs no longer queued.
    async fn mark_sent(
        &self,
        job_id: Uuid,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Transition `queued -> failed` with the provider's error detail.
    /// A no-op on jobs no longer queued.
    async fn mark_failed(&self, job_id: Uuid, reason: &str, at: DateTime<Utc>) -> PortResult<()>;

    /// Records a failed transient attempt on a still-queued job and returns
    /// the updated attempt count.
    async fn record_attempt(
        &self,
        job_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> PortResult<i32>;

    // --- Delivery Status (webhooks) ---
    async fn append_delivery_status(&self, record: &DeliveryStatusRecord) -> PortResult<()>;

    // --- Health Aggregates ---
    async fn queued_backlog(&self) -> PortResult<i64>;

    /// Number of jobs created for the given delivery date.
    async fn jobs_created_on(&self, day: NaiveDate) -> PortResult<i64>;

    async fn delivery_counts_since(&self, since: DateTime<Utc>) -> PortResult<DeliveryCounts>;

    /// Distinct subscribers with at least one job for the given delivery date.
    async fn subscribers_with_jobs_on(&self, day: NaiveDate) -> PortResult<i64>;

    // --- Repair Operations ---
    /// Operator retry: today's failed jobs back to queued. Returns rows changed.
    async fn requeue_failed_on(&self, day: NaiveDate) -> PortResult<u64>;

    /// Fills in missing or out-of-range delivery settings with defaults.
    async fn backfill_delivery_defaults(&self) -> PortResult<u64>;

    /// Removes subscriptions with no usable delivery target. Cascades to
    /// their history and jobs.
    async fn purge_unreachable_subscribers(&self) -> PortResult<u64>;
}

//=========================================================================================
// Content Generation Port
//=========================================================================================

/// A raw generated entry as returned by the LLM collaborator.
///
/// All fields are optional: generated payloads can be malformed, and the
/// core filters them rather than trusting the generator.
#[derive(Debug, Clone, Default)]
pub struct GeneratedWord {
    pub word: Option<String>,
    pub definition: Option<String>,
    pub example: Option<String>,
    pub part_of_speech: Option<String>,
    pub memory_aid: Option<String>,
}

#[async_trait]
pub trait WordGenerationService: Send + Sync {
    /// Requests `count` new words for a category, passing the exclusion list
    /// so the generator avoids repeats (the core still filters the response).
    async fn generate_words(
        &self,
        category: &str,
        subcategory: Option<&str>,
        count: u32,
        excluding: &[String],
    ) -> PortResult<Vec<GeneratedWord>>;
}

//=========================================================================================
// Messaging Ports
//=========================================================================================

#[async_trait]
pub trait WhatsAppService: Send + Sync {
    /// Sends a WhatsApp message to an E.164 number.
    async fn send_message(&self, to: &str, body: &str) -> Result<ProviderReceipt, SendError>;
}

#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends a transactional email.
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<ProviderReceipt, SendError>;
}
