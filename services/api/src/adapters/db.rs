//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DeliveryStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Status transitions are guarded in SQL (`... WHERE status = 'queued'`), so a
//! concurrent cancellation or a second dispatcher can never resurrect or double
//! up a job.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use vocab_delivery_core::domain::{
    DeliveryStatusRecord, JobStatus, OutboxJob, Subscriber, VocabularyWord, WordHistoryEntry,
};
use vocab_delivery_core::ports::{DeliveryCounts, DeliveryStore, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DeliveryStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// A subscriber is reachable when at least one channel has a non-empty target.
const ACTIVE_SUBSCRIBER: &str =
    "((phone IS NOT NULL AND phone <> '') OR (email IS NOT NULL AND email <> ''))";

fn unexpected(e: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SubscriberRecord {
    id: Uuid,
    phone: Option<String>,
    email: Option<String>,
    is_pro: bool,
    category: String,
    subcategory: Option<String>,
    mode: String,
    auto_window_start: NaiveTime,
    auto_window_end: NaiveTime,
    utc_offset_minutes: i32,
    words_per_day: i16,
    custom_times: Vec<NaiveTime>,
}
impl SubscriberRecord {
    fn to_domain(self) -> PortResult<Subscriber> {
        Ok(Subscriber {
            id: self.id,
            phone: self.phone,
            email: self.email,
            is_pro: self.is_pro,
            category: self.category,
            subcategory: self.subcategory,
            mode: self.mode.parse().map_err(unexpected)?,
            auto_window_start: self.auto_window_start,
            auto_window_end: self.auto_window_end,
            utc_offset_minutes: self.utc_offset_minutes,
            words_per_day: self.words_per_day as u8,
            custom_times: self.custom_times,
        })
    }
}

#[derive(FromRow)]
struct WordRecord {
    id: Uuid,
    word: String,
    definition: String,
    example: String,
    category: String,
    subcategory: Option<String>,
    part_of_speech: Option<String>,
    memory_aid: Option<String>,
    created_at: DateTime<Utc>,
}
impl WordRecord {
    fn to_domain(self) -> VocabularyWord {
        VocabularyWord {
            id: self.id,
            word: self.word,
            definition: self.definition,
            example: self.example,
            category: self.category,
            subcategory: self.subcategory,
            part_of_speech: self.part_of_speech,
            memory_aid: self.memory_aid,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct JobRecord {
    id: Uuid,
    subscriber_id: Uuid,
    word_id: Uuid,
    headword: String,
    body: String,
    channel: String,
    scheduled_at: DateTime<Utc>,
    scheduled_for: NaiveDate,
    slot_index: i32,
    status: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    error_detail: Option<String>,
    provider_message_id: Option<String>,
}
impl JobRecord {
    fn to_domain(self) -> PortResult<OutboxJob> {
        Ok(OutboxJob {
            id: self.id,
            subscriber_id: self.subscriber_id,
            word_id: self.word_id,
            headword: self.headword,
            body: self.body,
            channel: self.channel.parse().map_err(unexpected)?,
            scheduled_at: self.scheduled_at,
            scheduled_for: self.scheduled_for,
            slot_index: self.slot_index,
            status: self.status.parse().map_err(unexpected)?,
            attempts: self.attempts,
            created_at: self.created_at,
            last_attempt_at: self.last_attempt_at,
            error_detail: self.error_detail,
            provider_message_id: self.provider_message_id,
        })
    }
}

#[derive(FromRow)]
struct DeliveryCountsRecord {
    sent: i64,
    failed: i64,
}

const SUBSCRIBER_COLUMNS: &str = "id, phone, email, is_pro, category, subcategory, mode, \
     auto_window_start, auto_window_end, utc_offset_minutes, words_per_day, custom_times";

const JOB_COLUMNS: &str = "id, subscriber_id, word_id, headword, body, channel, scheduled_at, \
     scheduled_for, slot_index, status, attempts, created_at, last_attempt_at, error_detail, \
     provider_message_id";

//=========================================================================================
// `DeliveryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DeliveryStore for DbAdapter {
    async fn list_active_subscribers(&self) -> PortResult<Vec<Subscriber>> {
        let records = sqlx::query_as::<_, SubscriberRecord>(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE {ACTIVE_SUBSCRIBER} ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_subscriber(&self, subscriber_id: Uuid) -> PortResult<Subscriber> {
        let record = sqlx::query_as::<_, SubscriberRecord>(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE id = $1"
        ))
        .bind(subscriber_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Subscriber {} not found", subscriber_id))
            }
            other => unexpected(other),
        })?;
        record.to_domain()
    }

    async fn count_active_subscribers(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM subscribers WHERE {ACTIVE_SUBSCRIBER}"
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn words_in_category(
        &self,
        category: &str,
        excluding: &[String],
        limit: u32,
    ) -> PortResult<Vec<VocabularyWord>> {
        let records = sqlx::query_as::<_, WordRecord>(&format!(
            "SELECT id, word, definition, example, category, subcategory, part_of_speech, \
             memory_aid, created_at \
             FROM vocabulary_words \
             WHERE category = $1 AND NOT (LOWER(word) = ANY($2)) \
             ORDER BY created_at, id \
             LIMIT $3"
        ))
        .bind(category)
        .bind(excluding)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_words(&self, words: &[VocabularyWord]) -> PortResult<Vec<VocabularyWord>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut stored = Vec::with_capacity(words.len());
        for w in words {
            // A colliding headword in the category resolves to the existing
            // row; the no-op update makes RETURNING yield it either way, so
            // callers never hold an id that was silently dropped.
            let record = sqlx::query_as::<_, WordRecord>(
                "INSERT INTO vocabulary_words \
                 (id, word, definition, example, category, subcategory, part_of_speech, \
                  memory_aid, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (category, LOWER(word)) DO UPDATE \
                     SET word = vocabulary_words.word \
                 RETURNING id, word, definition, example, category, subcategory, \
                           part_of_speech, memory_aid, created_at",
            )
            .bind(w.id)
            .bind(&w.word)
            .bind(&w.definition)
            .bind(&w.example)
            .bind(&w.category)
            .bind(&w.subcategory)
            .bind(&w.part_of_speech)
            .bind(&w.memory_aid)
            .bind(w.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            stored.push(record.to_domain());
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(stored)
    }

    async fn history_headwords(
        &self,
        subscriber_id: Uuid,
        category: &str,
    ) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT headword FROM word_history WHERE subscriber_id = $1 AND category = $2",
        )
        .bind(subscriber_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn append_history(&self, entry: &WordHistoryEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO word_history (id, subscriber_id, word_id, headword, category, sent_at, source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.subscriber_id)
        .bind(entry.word_id)
        .bind(&entry.headword)
        .bind(&entry.category)
        .bind(entry.sent_at)
        .bind(entry.source.as_str())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_job(&self, job: &OutboxJob) -> PortResult<()> {
        // The partial unique index on (subscriber_id, scheduled_for,
        // slot_index) makes a racing scheduler run's insert a no-op instead
        // of a double booking.
        sqlx::query(
            "INSERT INTO outbox_jobs \
             (id, subscriber_id, word_id, headword, body, channel, scheduled_at, scheduled_for, \
              slot_index, status, attempts, created_at, last_attempt_at, error_detail, \
              provider_message_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT DO NOTHING",
        )
        .bind(job.id)
        .bind(job.subscriber_id)
        .bind(job.word_id)
        .bind(&job.headword)
        .bind(&job.body)
        .bind(job.channel.as_str())
        .bind(job.scheduled_at)
        .bind(job.scheduled_for)
        .bind(job.slot_index)
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(job.created_at)
        .bind(job.last_attempt_at)
        .bind(&job.error_detail)
        .bind(&job.provider_message_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn jobs_scheduled_on(
        &self,
        subscriber_id: Uuid,
        day: NaiveDate,
    ) -> PortResult<Vec<OutboxJob>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM outbox_jobs \
             WHERE subscriber_id = $1 AND scheduled_for = $2"
        ))
        .bind(subscriber_id)
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: u32) -> PortResult<Vec<OutboxJob>> {
        let records = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM outbox_jobs \
             WHERE status = 'queued' AND scheduled_at <= $1 \
             ORDER BY scheduled_at, id \
             LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn job_status(&self, job_id: Uuid) -> PortResult<JobStatus> {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM outbox_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Job {} not found", job_id))
                }
                other => unexpected(other),
            })?;
        status.parse().map_err(unexpected)
    }

    async fn mark_sent(
        &self,
        job_id: Uuid,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "UPDATE outbox_jobs \
             SET status = 'sent', provider_message_id = $2, attempts = attempts + 1, \
                 last_attempt_at = $3, error_detail = NULL \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(job_id)
        .bind(provider_message_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, reason: &str, at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query(
            "UPDATE outbox_jobs \
             SET status = 'failed', error_detail = $2, last_attempt_at = $3 \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(job_id)
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn record_attempt(
        &self,
        job_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> PortResult<i32> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE outbox_jobs \
             SET attempts = attempts + 1, error_detail = $2, last_attempt_at = $3 \
             WHERE id = $1 \
             RETURNING attempts",
        )
        .bind(job_id)
        .bind(error)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Job {} not found", job_id)),
            other => unexpected(other),
        })
    }

    async fn append_delivery_status(&self, record: &DeliveryStatusRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO delivery_status_records \
             (id, job_id, provider_message_id, provider, status, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.job_id)
        .bind(&record.provider_message_id)
        .bind(&record.provider)
        .bind(&record.status)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn queued_backlog(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outbox_jobs WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn jobs_created_on(&self, day: NaiveDate) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outbox_jobs WHERE scheduled_for = $1")
            .bind(day)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn delivery_counts_since(&self, since: DateTime<Utc>) -> PortResult<DeliveryCounts> {
        let record = sqlx::query_as::<_, DeliveryCountsRecord>(
            "SELECT COUNT(*) FILTER (WHERE status = 'sent') AS sent, \
                    COUNT(*) FILTER (WHERE status = 'failed') AS failed \
             FROM outbox_jobs WHERE last_attempt_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(DeliveryCounts {
            sent: record.sent,
            failed: record.failed,
        })
    }

    async fn subscribers_with_jobs_on(&self, day: NaiveDate) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT subscriber_id) FROM outbox_jobs WHERE scheduled_for = $1",
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn requeue_failed_on(&self, day: NaiveDate) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE outbox_jobs \
             SET status = 'queued', attempts = 0, error_detail = NULL \
             WHERE status = 'failed' AND scheduled_for = $1",
        )
        .bind(day)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn backfill_delivery_defaults(&self) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE subscribers \
             SET words_per_day = CASE WHEN words_per_day BETWEEN 1 AND 5 \
                                      THEN words_per_day ELSE 3 END, \
                 mode = CASE WHEN mode = 'custom' AND cardinality(custom_times) = 0 \
                             THEN 'auto' ELSE mode END \
             WHERE words_per_day NOT BETWEEN 1 AND 5 \
                OR (mode = 'custom' AND cardinality(custom_times) = 0)",
        )
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn purge_unreachable_subscribers(&self) -> PortResult<u64> {
        // word_history and outbox_jobs cascade on subscriber deletion.
        let result = sqlx::query(&format!(
            "DELETE FROM subscribers WHERE NOT {ACTIVE_SUBSCRIBER}"
        ))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}
