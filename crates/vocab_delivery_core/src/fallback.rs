//! crates/vocab_delivery_core/src/fallback.rs
//!
//! Static, versioned pools of pre-written vocabulary entries, used when live
//! generation is unavailable. Categories without a dedicated pool fall back
//! to the generic one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::VocabularyWord;

/// Bumped whenever the pool contents change.
pub const FALLBACK_POOL_VERSION: &str = "2025-07-01";

/// One pre-written entry. Every field is complete so a fallback delivery is
/// indistinguishable in shape from a generated one.
#[derive(Debug, Clone, Copy)]
pub struct FallbackEntry {
    pub word: &'static str,
    pub definition: &'static str,
    pub example: &'static str,
}

impl FallbackEntry {
    /// Materializes the entry as a vocabulary word with a provisional id.
    /// Persisting it resolves to the existing inventory row when the
    /// headword is already present in the category.
    pub fn to_vocabulary_word(&self, category: &str, now: DateTime<Utc>) -> VocabularyWord {
        VocabularyWord {
            id: Uuid::new_v4(),
            word: self.word.to_string(),
            definition: self.definition.to_string(),
            example: self.example.to_string(),
            category: category.to_string(),
            subcategory: None,
            part_of_speech: None,
            memory_aid: None,
            created_at: now,
        }
    }
}

const BUSINESS: &[FallbackEntry] = &[
    FallbackEntry {
        word: "leverage",
        definition: "To use something to its maximum advantage.",
        example: "The startup leveraged its small size to move faster than competitors.",
    },
    FallbackEntry {
        word: "stakeholder",
        definition: "A person or group with an interest in the success of an organization.",
        example: "We presented the quarterly results to all key stakeholders.",
    },
    FallbackEntry {
        word: "synergy",
        definition: "The combined effect greater than the sum of separate effects.",
        example: "The merger created real synergy between the two sales teams.",
    },
    FallbackEntry {
        word: "scalable",
        definition: "Able to grow in capacity without losing performance.",
        example: "They redesigned the service to be scalable to millions of users.",
    },
    FallbackEntry {
        word: "benchmark",
        definition: "A standard against which performance is measured.",
        example: "Last year's revenue is the benchmark for this quarter's targets.",
    },
    FallbackEntry {
        word: "mitigate",
        definition: "To make something less severe or harmful.",
        example: "The team acted early to mitigate the risk of a delayed launch.",
    },
];

const ACADEMIC: &[FallbackEntry] = &[
    FallbackEntry {
        word: "empirical",
        definition: "Based on observation or experiment rather than theory.",
        example: "The paper offers empirical evidence for the hypothesis.",
    },
    FallbackEntry {
        word: "paradigm",
        definition: "A typical example or model of something.",
        example: "The discovery caused a paradigm shift in the field.",
    },
    FallbackEntry {
        word: "synthesize",
        definition: "To combine separate elements into a coherent whole.",
        example: "The review synthesizes findings from forty studies.",
    },
    FallbackEntry {
        word: "salient",
        definition: "Most noticeable or important.",
        example: "She summarized the salient points of the lecture.",
    },
    FallbackEntry {
        word: "corroborate",
        definition: "To confirm or give support to a statement or finding.",
        example: "Two independent experiments corroborated the result.",
    },
    FallbackEntry {
        word: "nuance",
        definition: "A subtle difference in meaning, expression or sound.",
        example: "The translation loses some nuance of the original text.",
    },
];

const TRAVEL: &[FallbackEntry] = &[
    FallbackEntry {
        word: "itinerary",
        definition: "A planned route or journey.",
        example: "Our itinerary includes three days in Lisbon.",
    },
    FallbackEntry {
        word: "layover",
        definition: "A period of waiting between connecting flights.",
        example: "We had a six-hour layover in Istanbul.",
    },
    FallbackEntry {
        word: "excursion",
        definition: "A short journey or trip, especially for leisure.",
        example: "The hotel organizes a daily excursion to the old town.",
    },
    FallbackEntry {
        word: "off-season",
        definition: "The time of year when a destination is least busy.",
        example: "Prices drop sharply in the off-season.",
    },
    FallbackEntry {
        word: "wanderlust",
        definition: "A strong desire to travel.",
        example: "Her wanderlust took her to five continents before thirty.",
    },
];

const GENERIC: &[FallbackEntry] = &[
    FallbackEntry {
        word: "ubiquitous",
        definition: "Present, appearing or found everywhere.",
        example: "Smartphones have become ubiquitous in daily life.",
    },
    FallbackEntry {
        word: "resilient",
        definition: "Able to recover quickly from difficulties.",
        example: "The community proved resilient after the flood.",
    },
    FallbackEntry {
        word: "meticulous",
        definition: "Showing great attention to detail; very careful.",
        example: "He kept meticulous notes of every experiment.",
    },
    FallbackEntry {
        word: "candid",
        definition: "Truthful and straightforward; frank.",
        example: "She gave a candid assessment of the project's problems.",
    },
    FallbackEntry {
        word: "mellifluous",
        definition: "Sweet or musical; pleasant to hear.",
        example: "The narrator's mellifluous voice made the audiobook a joy.",
    },
    FallbackEntry {
        word: "pragmatic",
        definition: "Dealing with things sensibly and realistically.",
        example: "We need a pragmatic approach to the schedule slip.",
    },
    FallbackEntry {
        word: "tenacious",
        definition: "Holding firmly to something; persistent.",
        example: "Her tenacious pursuit of the answer paid off.",
    },
];

/// The fallback pool for a category, or the generic pool when the category
/// has no dedicated set. Category matching is case-insensitive.
pub fn pool_for(category: &str) -> &'static [FallbackEntry] {
    match category.to_ascii_lowercase().as_str() {
        "business" => BUSINESS,
        "academic" => ACADEMIC,
        "travel" => TRAVEL,
        _ => GENERIC,
    }
}
