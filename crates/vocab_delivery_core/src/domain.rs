//! crates/vocab_delivery_core/src/domain.rs
//!
//! Defines the pure, core data structures for the delivery subsystem.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Lowest and highest allowed values for a subscriber's daily word count.
pub const MIN_WORDS_PER_DAY: u8 = 1;
pub const MAX_WORDS_PER_DAY: u8 = 5;

//=========================================================================================
// Validation Errors
//=========================================================================================

/// Raised when a subscriber's delivery configuration is malformed.
/// Surfaced synchronously to the caller; never silently corrected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("words per day must be between {MIN_WORDS_PER_DAY} and {MAX_WORDS_PER_DAY}, got {0}")]
    WordCountOutOfRange(u8),
    #[error("custom delivery times contain a duplicate: {0}")]
    DuplicateCustomTimes(NaiveTime),
    #[error("phone number is not valid E.164: {0}")]
    InvalidPhoneNumber(String),
}

/// Checks a phone number against the E.164 shape (`+` followed by 2-15 digits).
pub fn is_valid_e164(phone: &str) -> bool {
    static E164: OnceLock<Regex> = OnceLock::new();
    let re = E164.get_or_init(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());
    re.is_match(phone)
}

//=========================================================================================
// Subscriber
//=========================================================================================

/// How a subscriber's daily delivery times are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The system spaces deliveries evenly across the configured window.
    Auto,
    /// The subscriber picks an exact time for each word.
    Custom,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Auto => "auto",
            DeliveryMode::Custom => "custom",
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(DeliveryMode::Auto),
            "custom" => Ok(DeliveryMode::Custom),
            other => Err(format!("unknown delivery mode '{other}'")),
        }
    }
}

/// The channel a message is delivered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    WhatsApp,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::WhatsApp => "whatsapp",
            Channel::Email => "email",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Channel::WhatsApp),
            "email" => Ok(Channel::Email),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// A user's delivery configuration.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    /// E.164 phone number, when the subscriber has connected WhatsApp.
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_pro: bool,
    /// Primary content category, e.g. "business".
    pub category: String,
    /// Optional sub-category, e.g. "intermediate".
    pub subcategory: Option<String>,
    pub mode: DeliveryMode,
    pub auto_window_start: NaiveTime,
    pub auto_window_end: NaiveTime,
    /// The subscriber's timezone as a fixed offset from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// How many words the subscriber receives per day (1-5).
    pub words_per_day: u8,
    /// Ordered custom delivery times; meaningful when `mode` is `Custom`.
    pub custom_times: Vec<NaiveTime>,
}

impl Subscriber {
    /// Validates the delivery configuration.
    ///
    /// Duplicate custom times are rejected rather than deduplicated, since
    /// silent merging would reduce the advertised daily word count.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_WORDS_PER_DAY..=MAX_WORDS_PER_DAY).contains(&self.words_per_day) {
            return Err(ValidationError::WordCountOutOfRange(self.words_per_day));
        }
        if self.mode == DeliveryMode::Custom {
            for (i, time) in self.custom_times.iter().enumerate() {
                if self.custom_times[..i].contains(time) {
                    return Err(ValidationError::DuplicateCustomTimes(*time));
                }
            }
        }
        if let Some(phone) = &self.phone {
            if !is_valid_e164(phone) {
                return Err(ValidationError::InvalidPhoneNumber(phone.clone()));
            }
        }
        Ok(())
    }

    /// Whether the subscriber can be reached on at least one channel.
    pub fn has_delivery_target(&self) -> bool {
        self.preferred_channel().is_some()
    }

    /// The channel deliveries are sent over: WhatsApp when a phone number
    /// is present, otherwise email.
    pub fn preferred_channel(&self) -> Option<Channel> {
        if self.phone.as_deref().is_some_and(|p| !p.is_empty()) {
            Some(Channel::WhatsApp)
        } else if self.email.as_deref().is_some_and(|e| !e.is_empty()) {
            Some(Channel::Email)
        } else {
            None
        }
    }
}

//=========================================================================================
// Vocabulary Content
//=========================================================================================

/// A single lexical entry, shared across all subscribers in a category.
/// Immutable once used in a delivery.
#[derive(Debug, Clone)]
pub struct VocabularyWord {
    pub id: Uuid,
    pub word: String,
    pub definition: String,
    pub example: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub part_of_speech: Option<String>,
    pub memory_aid: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VocabularyWord {
    /// Renders the delivery message body for this word.
    pub fn render_message(&self) -> String {
        let mut body = format!(
            "{word}\n\n{definition}\n\nExample: {example}",
            word = self.word,
            definition = self.definition,
            example = self.example,
        );
        if let Some(aid) = &self.memory_aid {
            body.push_str("\n\nHint: ");
            body.push_str(aid);
        }
        body
    }
}

/// Where a selected word came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSource {
    Database,
    Generated,
    Fallback,
}

impl WordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WordSource::Database => "database",
            WordSource::Generated => "generated",
            WordSource::Fallback => "fallback",
        }
    }
}

impl FromStr for WordSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(WordSource::Database),
            "generated" => Ok(WordSource::Generated),
            "fallback" => Ok(WordSource::Fallback),
            other => Err(format!("unknown word source '{other}'")),
        }
    }
}

/// The append-only record that a word was selected for a subscriber.
///
/// Written at selection time, not at delivery time: "we decided to show you
/// this word" is tracked independently of "we successfully delivered it".
#[derive(Debug, Clone)]
pub struct WordHistoryEntry {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub word_id: Uuid,
    /// The headword at the time of selection; the exclusion key.
    pub headword: String,
    /// The subscriber's category at the time of selection.
    pub category: String,
    pub sent_at: DateTime<Utc>,
    pub source: WordSource,
}

//=========================================================================================
// Outbox
//=========================================================================================

/// Status of a scheduled send job. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Sent,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a transition to `next` is legal.
    ///
    /// `Queued` may reach any terminal state. `Failed -> Queued` is the
    /// explicit operator-triggered retry; `Sent` and `Cancelled` are final.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Sent)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Failed, JobStatus::Queued)
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "sent" => Ok(JobStatus::Sent),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// A scheduled, not-yet-delivered unit of work: send one word to one
/// subscriber at one time over one channel.
#[derive(Debug, Clone)]
pub struct OutboxJob {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub word_id: Uuid,
    pub headword: String,
    /// Message body snapshot taken at scheduling time, so later edits to the
    /// vocabulary row never change what a queued job sends.
    pub body: String,
    pub channel: Channel,
    /// The UTC instant the job becomes due.
    pub scheduled_at: DateTime<Utc>,
    /// The subscriber-local delivery date; the idempotency key for daily runs.
    pub scheduled_for: NaiveDate,
    /// Position of this delivery in the day's plan. Together with the
    /// subscriber and date it uniquely identifies a non-cancelled slot, which
    /// is what stops concurrent scheduler runs from double-booking a day.
    pub slot_index: i32,
    pub status: JobStatus,
    /// Number of delivery attempts made so far.
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub provider_message_id: Option<String>,
}

/// Provider-reported delivery outcome, appended from provider webhooks.
#[derive(Debug, Clone)]
pub struct DeliveryStatusRecord {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub provider_message_id: String,
    pub provider: String,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::subscriber_fixture;

    #[test]
    fn e164_validation() {
        assert!(is_valid_e164("+15551234567"));
        assert!(is_valid_e164("+4915112345678"));
        assert!(!is_valid_e164("15551234567"));
        assert!(!is_valid_e164("+0123"));
        assert!(!is_valid_e164("+1 555 123"));
        assert!(!is_valid_e164(""));
    }

    #[test]
    fn duplicate_custom_times_are_rejected() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let mut sub = subscriber_fixture();
        sub.mode = DeliveryMode::Custom;
        sub.words_per_day = 3;
        sub.custom_times = vec![nine, nine, NaiveTime::from_hms_opt(18, 0, 0).unwrap()];
        assert_eq!(
            sub.validate(),
            Err(ValidationError::DuplicateCustomTimes(nine))
        );
    }

    #[test]
    fn word_count_bounds_are_enforced() {
        let mut sub = subscriber_fixture();
        sub.words_per_day = 0;
        assert_eq!(sub.validate(), Err(ValidationError::WordCountOutOfRange(0)));
        sub.words_per_day = 6;
        assert_eq!(sub.validate(), Err(ValidationError::WordCountOutOfRange(6)));
        sub.words_per_day = 5;
        assert_eq!(sub.validate(), Ok(()));
    }

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Sent));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Queued));

        assert!(!JobStatus::Sent.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Sent.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Sent));
    }

    #[test]
    fn preferred_channel_prefers_whatsapp() {
        let mut sub = subscriber_fixture();
        sub.phone = Some("+15551234567".to_string());
        sub.email = Some("user@example.com".to_string());
        assert_eq!(sub.preferred_channel(), Some(Channel::WhatsApp));

        sub.phone = None;
        assert_eq!(sub.preferred_channel(), Some(Channel::Email));

        sub.email = None;
        assert_eq!(sub.preferred_channel(), None);
        assert!(!sub.has_delivery_target());
    }
}
