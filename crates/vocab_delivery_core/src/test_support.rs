//! crates/vocab_delivery_core/src/test_support.rs
//!
//! In-memory port implementations and fixtures shared by the unit tests.
//! `InMemoryStore` mirrors the semantics the real Postgres adapter provides:
//! status-guarded transitions, case-insensitive headword exclusion, cascades.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Channel, DeliveryMode, DeliveryStatusRecord, JobStatus, OutboxJob, Subscriber, VocabularyWord,
    WordHistoryEntry,
};
use crate::ports::{
    DeliveryCounts, DeliveryStore, EmailService, GeneratedWord, PortError, PortResult,
    ProviderReceipt, SendError, WhatsAppService, WordGenerationService,
};

//=========================================================================================
// Fixtures
//=========================================================================================

/// A reachable auto-mode subscriber in the "business" category, 3 words/day.
pub fn subscriber_fixture() -> Subscriber {
    Subscriber {
        id: Uuid::new_v4(),
        phone: Some("+15551234567".to_string()),
        email: Some("subscriber@example.com".to_string()),
        is_pro: false,
        category: "business".to_string(),
        subcategory: Some("intermediate".to_string()),
        mode: DeliveryMode::Auto,
        auto_window_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        auto_window_end: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        utc_offset_minutes: 0,
        words_per_day: 3,
        custom_times: Vec::new(),
    }
}

pub fn vocabulary_word(word: &str, category: &str) -> VocabularyWord {
    VocabularyWord {
        id: Uuid::new_v4(),
        word: word.to_string(),
        definition: format!("definition of {word}"),
        example: format!("An example sentence using {word}."),
        category: category.to_string(),
        subcategory: None,
        part_of_speech: None,
        memory_aid: None,
        created_at: Utc::now(),
    }
}

pub fn outbox_job(subscriber_id: Uuid, channel: Channel, scheduled_at: DateTime<Utc>) -> OutboxJob {
    OutboxJob {
        id: Uuid::new_v4(),
        subscriber_id,
        word_id: Uuid::new_v4(),
        headword: "ubiquitous".to_string(),
        body: "ubiquitous\n\nPresent everywhere.\n\nExample: ...".to_string(),
        channel,
        scheduled_at,
        scheduled_for: scheduled_at.date_naive(),
        slot_index: 0,
        status: JobStatus::Queued,
        attempts: 0,
        created_at: scheduled_at,
        last_attempt_at: None,
        error_detail: None,
        provider_message_id: None,
    }
}

//=========================================================================================
// In-Memory Store
//=========================================================================================

#[derive(Default)]
struct StoreData {
    subscribers: Vec<Subscriber>,
    words: Vec<VocabularyWord>,
    history: Vec<WordHistoryEntry>,
    jobs: Vec<OutboxJob>,
    delivery_statuses: Vec<DeliveryStatusRecord>,
}

/// An in-memory `DeliveryStore` for unit tests. Mirrors the relational
/// adapter's conflict handling: headwords dedupe per category and a
/// non-cancelled (subscriber, day, slot) is never inserted twice.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<StoreData>,
    cancel_on_status_check: Mutex<Option<Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_subscriber(&self, subscriber: Subscriber) {
        self.data.lock().unwrap().subscribers.push(subscriber);
    }

    pub fn seed_word(&self, word: VocabularyWord) {
        self.data.lock().unwrap().words.push(word);
    }

    pub fn seed_job(&self, job: OutboxJob) {
        self.data.lock().unwrap().jobs.push(job);
    }

    pub fn word_count(&self) -> usize {
        self.data.lock().unwrap().words.len()
    }

    pub fn word(&self, word_id: Uuid) -> Option<VocabularyWord> {
        self.data
            .lock()
            .unwrap()
            .words
            .iter()
            .find(|w| w.id == word_id)
            .cloned()
    }

    /// Arms a one-shot race simulation: the next `job_status` lookup for
    /// this job cancels it first, as if an operator beat the dispatcher to
    /// the row between the due-jobs fetch and the send.
    pub fn cancel_when_status_checked(&self, job_id: Uuid) {
        *self.cancel_on_status_check.lock().unwrap() = Some(job_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.data.lock().unwrap().subscribers.len()
    }

    pub fn history_for(&self, subscriber_id: Uuid) -> Vec<WordHistoryEntry> {
        self.data
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.subscriber_id == subscriber_id)
            .cloned()
            .collect()
    }

    pub fn jobs_for(&self, subscriber_id: Uuid) -> Vec<OutboxJob> {
        self.data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.subscriber_id == subscriber_id)
            .cloned()
            .collect()
    }

    pub fn job(&self, job_id: Uuid) -> OutboxJob {
        self.data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
            .expect("job exists")
    }

    pub fn cancel_all_jobs(&self, subscriber_id: Uuid) {
        let mut data = self.data.lock().unwrap();
        for job in data.jobs.iter_mut() {
            if job.subscriber_id == subscriber_id {
                job.status = JobStatus::Cancelled;
            }
        }
    }

    /// Test-only override that bypasses transition checks.
    pub fn force_status(&self, job_id: Uuid, status: JobStatus, at: DateTime<Utc>) {
        let mut data = self.data.lock().unwrap();
        let job = data
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .expect("job exists");
        job.status = status;
        job.last_attempt_at = Some(at);
    }

}

#[async_trait]
impl DeliveryStore for InMemoryStore {
    async fn list_active_subscribers(&self) -> PortResult<Vec<Subscriber>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .filter(|s| s.has_delivery_target())
            .cloned()
            .collect())
    }

    async fn get_subscriber(&self, subscriber_id: Uuid) -> PortResult<Subscriber> {
        self.data
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .find(|s| s.id == subscriber_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Subscriber {subscriber_id} not found")))
    }

    async fn count_active_subscribers(&self) -> PortResult<i64> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .filter(|s| s.has_delivery_target())
            .count() as i64)
    }

    async fn words_in_category(
        &self,
        category: &str,
        excluding: &[String],
        limit: u32,
    ) -> PortResult<Vec<VocabularyWord>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .words
            .iter()
            .filter(|w| w.category == category && !excluding.contains(&w.word.to_lowercase()))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_words(&self, words: &[VocabularyWord]) -> PortResult<Vec<VocabularyWord>> {
        let mut data = self.data.lock().unwrap();
        let mut stored = Vec::with_capacity(words.len());
        for word in words {
            let key = word.word.to_lowercase();
            match data
                .words
                .iter()
                .find(|w| w.category == word.category && w.word.to_lowercase() == key)
            {
                Some(existing) => stored.push(existing.clone()),
                None => {
                    data.words.push(word.clone());
                    stored.push(word.clone());
                }
            }
        }
        Ok(stored)
    }

    async fn history_headwords(
        &self,
        subscriber_id: Uuid,
        category: &str,
    ) -> PortResult<Vec<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.subscriber_id == subscriber_id && h.category == category)
            .map(|h| h.headword.clone())
            .collect())
    }

    async fn append_history(&self, entry: &WordHistoryEntry) -> PortResult<()> {
        self.data.lock().unwrap().history.push(entry.clone());
        Ok(())
    }

    async fn insert_job(&self, job: &OutboxJob) -> PortResult<()> {
        let mut data = self.data.lock().unwrap();
        let slot_taken = data.jobs.iter().any(|j| {
            j.subscriber_id == job.subscriber_id
                && j.scheduled_for == job.scheduled_for
                && j.slot_index == job.slot_index
                && j.status != JobStatus::Cancelled
        });
        if !slot_taken {
            data.jobs.push(job.clone());
        }
        Ok(())
    }

    async fn jobs_scheduled_on(
        &self,
        subscriber_id: Uuid,
        day: NaiveDate,
    ) -> PortResult<Vec<OutboxJob>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.subscriber_id == subscriber_id && j.scheduled_for == day)
            .cloned()
            .collect())
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: u32) -> PortResult<Vec<OutboxJob>> {
        let mut due: Vec<OutboxJob> = self
            .data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued && j.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.scheduled_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn job_status(&self, job_id: Uuid) -> PortResult<JobStatus> {
        {
            let mut armed = self.cancel_on_status_check.lock().unwrap();
            if *armed == Some(job_id) {
                *armed = None;
                let mut data = self.data.lock().unwrap();
                if let Some(job) = data.jobs.iter_mut().find(|j| j.id == job_id) {
                    job.status = JobStatus::Cancelled;
                }
            }
        }
        self.data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .map(|j| j.status)
            .ok_or_else(|| PortError::NotFound(format!("Job {job_id} not found")))
    }

    async fn mark_sent(
        &self,
        job_id: Uuid,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(job) = data
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Queued)
        {
            job.status = JobStatus::Sent;
            job.provider_message_id = Some(provider_message_id.to_string());
            job.attempts += 1;
            job.last_attempt_at = Some(at);
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, reason: &str, at: DateTime<Utc>) -> PortResult<()> {
        let mut data = self.data.lock().unwrap();
        if let Some(job) = data
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Queued)
        {
            job.status = JobStatus::Failed;
            job.error_detail = Some(reason.to_string());
            job.last_attempt_at = Some(at);
        }
        Ok(())
    }

    async fn record_attempt(
        &self,
        job_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> PortResult<i32> {
        let mut data = self.data.lock().unwrap();
        let job = data
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| PortError::NotFound(format!("Job {job_id} not found")))?;
        job.attempts += 1;
        job.error_detail = Some(error.to_string());
        job.last_attempt_at = Some(at);
        Ok(job.attempts)
    }

    async fn append_delivery_status(&self, record: &DeliveryStatusRecord) -> PortResult<()> {
        self.data
            .lock()
            .unwrap()
            .delivery_statuses
            .push(record.clone());
        Ok(())
    }

    async fn queued_backlog(&self) -> PortResult<i64> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .count() as i64)
    }

    async fn jobs_created_on(&self, day: NaiveDate) -> PortResult<i64> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.scheduled_for == day)
            .count() as i64)
    }

    async fn delivery_counts_since(&self, since: DateTime<Utc>) -> PortResult<DeliveryCounts> {
        let data = self.data.lock().unwrap();
        let mut counts = DeliveryCounts::default();
        for job in data
            .jobs
            .iter()
            .filter(|j| j.last_attempt_at.is_some_and(|at| at >= since))
        {
            match job.status {
                JobStatus::Sent => counts.sent += 1,
                JobStatus::Failed => counts.failed += 1,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn subscribers_with_jobs_on(&self, day: NaiveDate) -> PortResult<i64> {
        let data = self.data.lock().unwrap();
        let mut ids: Vec<Uuid> = data
            .jobs
            .iter()
            .filter(|j| j.scheduled_for == day)
            .map(|j| j.subscriber_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids.len() as i64)
    }

    async fn requeue_failed_on(&self, day: NaiveDate) -> PortResult<u64> {
        let mut data = self.data.lock().unwrap();
        let mut requeued = 0u64;
        for job in data.jobs.iter_mut() {
            if job.status == JobStatus::Failed && job.scheduled_for == day {
                job.status = JobStatus::Queued;
                job.attempts = 0;
                job.error_detail = None;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn backfill_delivery_defaults(&self) -> PortResult<u64> {
        let mut data = self.data.lock().unwrap();
        let mut updated = 0u64;
        for sub in data.subscribers.iter_mut() {
            let mut changed = false;
            if !(1..=5).contains(&sub.words_per_day) {
                sub.words_per_day = 3;
                changed = true;
            }
            if sub.mode == DeliveryMode::Custom && sub.custom_times.is_empty() {
                sub.mode = DeliveryMode::Auto;
                changed = true;
            }
            if changed {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn purge_unreachable_subscribers(&self) -> PortResult<u64> {
        let mut data = self.data.lock().unwrap();
        let unreachable: Vec<Uuid> = data
            .subscribers
            .iter()
            .filter(|s| !s.has_delivery_target())
            .map(|s| s.id)
            .collect();
        data.subscribers.retain(|s| !unreachable.contains(&s.id));
        data.jobs.retain(|j| !unreachable.contains(&j.subscriber_id));
        data.history
            .retain(|h| !unreachable.contains(&h.subscriber_id));
        Ok(unreachable.len() as u64)
    }
}

//=========================================================================================
// Generators
//=========================================================================================

/// Returns a fixed list of well-formed entries (plus any pushed malformed
/// ones) on every call; the engine filters and truncates.
pub struct StubGenerator {
    entries: Vec<GeneratedWord>,
}

impl StubGenerator {
    pub fn with_words(words: &[&str]) -> Self {
        let entries = words
            .iter()
            .map(|w| GeneratedWord {
                word: Some(w.to_string()),
                definition: Some(format!("definition of {w}")),
                example: Some(format!("An example sentence using {w}.")),
                part_of_speech: Some("noun".to_string()),
                memory_aid: None,
            })
            .collect();
        Self { entries }
    }

    /// Appends an entry with a headword but no definition or example.
    pub fn push_malformed(&mut self) {
        self.entries.push(GeneratedWord {
            word: Some("broken".to_string()),
            ..GeneratedWord::default()
        });
    }
}

#[async_trait]
impl WordGenerationService for StubGenerator {
    async fn generate_words(
        &self,
        _category: &str,
        _subcategory: Option<&str>,
        _count: u32,
        _excluding: &[String],
    ) -> PortResult<Vec<GeneratedWord>> {
        Ok(self.entries.clone())
    }
}

/// A generator whose every call fails, for fallback-path tests.
pub struct FailingGenerator;

#[async_trait]
impl WordGenerationService for FailingGenerator {
    async fn generate_words(
        &self,
        _category: &str,
        _subcategory: Option<&str>,
        _count: u32,
        _excluding: &[String],
    ) -> PortResult<Vec<GeneratedWord>> {
        Err(PortError::Unexpected("generation API unavailable".to_string()))
    }
}

//=========================================================================================
// Senders
//=========================================================================================

enum SendScript {
    Ok,
    Transient(String),
    Permanent(String),
}

/// Serves as both the WhatsApp and email provider in dispatcher tests.
pub struct ScriptedSender {
    script: SendScript,
    sends: Mutex<u32>,
    last_target: Mutex<Option<String>>,
}

impl ScriptedSender {
    pub fn always_ok() -> Self {
        Self::new(SendScript::Ok)
    }

    pub fn always_transient(detail: &str) -> Self {
        Self::new(SendScript::Transient(detail.to_string()))
    }

    pub fn always_permanent(detail: &str) -> Self {
        Self::new(SendScript::Permanent(detail.to_string()))
    }

    fn new(script: SendScript) -> Self {
        Self {
            script,
            sends: Mutex::new(0),
            last_target: Mutex::new(None),
        }
    }

    pub fn send_count(&self) -> u32 {
        *self.sends.lock().unwrap()
    }

    pub fn last_target(&self) -> Option<String> {
        self.last_target.lock().unwrap().clone()
    }

    fn attempt(&self, target: &str) -> Result<ProviderReceipt, SendError> {
        let mut sends = self.sends.lock().unwrap();
        *sends += 1;
        *self.last_target.lock().unwrap() = Some(target.to_string());
        match &self.script {
            SendScript::Ok => Ok(ProviderReceipt {
                provider_message_id: format!("msg-{}", *sends),
            }),
            SendScript::Transient(detail) => Err(SendError::Transient(detail.clone())),
            SendScript::Permanent(detail) => Err(SendError::Permanent(detail.clone())),
        }
    }
}

#[async_trait]
impl WhatsAppService for ScriptedSender {
    async fn send_message(&self, to: &str, _body: &str) -> Result<ProviderReceipt, SendError> {
        self.attempt(to)
    }
}

#[async_trait]
impl EmailService for ScriptedSender {
    async fn send_email(
        &self,
        to: &str,
        _subject: &str,
        _html: &str,
    ) -> Result<ProviderReceipt, SendError> {
        self.attempt(to)
    }
}
