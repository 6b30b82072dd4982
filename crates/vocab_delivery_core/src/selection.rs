//! crates/vocab_delivery_core/src/selection.rs
//!
//! The Word Selection Engine: produces exactly N never-before-seen words for
//! a subscriber, preferring existing inventory, then live generation, then
//! the static fallback pool. Every selected word is written to the
//! subscriber's history before it is handed to delivery.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Subscriber, VocabularyWord, WordHistoryEntry, WordSource};
use crate::fallback;
use crate::ports::{DeliveryStore, GeneratedWord, PortError, WordGenerationService};

/// Failure modes of word selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// Inventory, generation and fallback all produced nothing. Hard failure,
    /// surfaced as a per-subscriber skip by the scheduler.
    #[error("no vocabulary content available for category '{0}'")]
    ContentUnavailable(String),
    #[error("store error during word selection: {0}")]
    Store(#[from] PortError),
}

/// A word chosen for delivery, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct SelectedWord {
    pub word: VocabularyWord,
    pub source: WordSource,
}

/// Selects `subscriber.words_per_day` words the subscriber has not seen.
///
/// Selection order: database inventory, then the generation collaborator for
/// the shortfall, then the static fallback pool. Generation failures and
/// malformed generated entries degrade to fallback rather than aborting.
/// `seed` drives the fallback reshuffle so tests stay deterministic.
///
/// History entries are appended for every selected word — including
/// fallback words — before this function returns, so a word is excluded
/// from future selections even when the subsequent send fails.
pub async fn select_words(
    store: &dyn DeliveryStore,
    generator: &dyn WordGenerationService,
    subscriber: &Subscriber,
    now: DateTime<Utc>,
    seed: u64,
) -> Result<Vec<SelectedWord>, SelectionError> {
    let n = subscriber.words_per_day as usize;
    let category = subscriber.category.as_str();

    let history = store.history_headwords(subscriber.id, category).await?;
    let mut excluded: Vec<String> = history.iter().map(|w| w.to_lowercase()).collect();
    let mut picked: Vec<SelectedWord> = Vec::with_capacity(n);

    // Step 1: existing inventory, minus history.
    let inventory = store
        .words_in_category(category, &excluded, n as u32)
        .await?;
    for word in inventory.into_iter().take(n) {
        excluded.push(word.word.to_lowercase());
        picked.push(SelectedWord {
            word,
            source: WordSource::Database,
        });
    }

    // Step 2: generation for the shortfall.
    if picked.len() < n {
        let shortfall = (n - picked.len()) as u32;
        match generator
            .generate_words(
                category,
                subscriber.subcategory.as_deref(),
                shortfall,
                &excluded,
            )
            .await
        {
            Ok(entries) => {
                let fresh = accept_generated(entries, subscriber, &excluded, now);
                if !fresh.is_empty() {
                    // A word must exist as an inventory row before history
                    // or jobs can reference it, so persistence comes first
                    // and a storage failure degrades to the fallback pool.
                    match store.insert_words(&fresh).await {
                        Ok(stored) => {
                            for word in stored {
                                if picked.len() == n {
                                    break;
                                }
                                excluded.push(word.word.to_lowercase());
                                picked.push(SelectedWord {
                                    word,
                                    source: WordSource::Generated,
                                });
                            }
                        }
                        Err(e) => {
                            warn!(
                                subscriber_id = %subscriber.id,
                                category,
                                "failed to persist generated words, degrading to fallback pool: {e}"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    subscriber_id = %subscriber.id,
                    category,
                    "word generation failed, degrading to fallback pool: {e}"
                );
            }
        }
    }

    // Step 3: static fallback pool for whatever is still missing. Fallback
    // entries become inventory rows like generated ones; a headword already
    // in the table resolves to the existing row.
    if picked.len() < n {
        let shortfall = n - picked.len();
        let candidates = fallback_words(category, &excluded, shortfall, seed, now);
        if !candidates.is_empty() {
            let stored = store.insert_words(&candidates).await?;
            for word in stored {
                excluded.push(word.word.to_lowercase());
                picked.push(SelectedWord {
                    word,
                    source: WordSource::Fallback,
                });
            }
        }
    }

    if picked.is_empty() {
        return Err(SelectionError::ContentUnavailable(category.to_string()));
    }

    // History before delivery: selection is tracked independently of the
    // send outcome.
    for selected in &picked {
        let entry = WordHistoryEntry {
            id: Uuid::new_v4(),
            subscriber_id: subscriber.id,
            word_id: selected.word.id,
            headword: selected.word.word.clone(),
            category: category.to_string(),
            sent_at: now,
            source: selected.source,
        };
        store.append_history(&entry).await?;
    }

    info!(
        subscriber_id = %subscriber.id,
        category,
        selected = picked.len(),
        "word selection complete"
    );
    Ok(picked)
}

/// Filters the generator's raw entries: drops malformed payloads (missing
/// headword, definition or example) and entries still colliding with the
/// exclusion set, then materializes the survivors.
fn accept_generated(
    entries: Vec<GeneratedWord>,
    subscriber: &Subscriber,
    excluded: &[String],
    now: DateTime<Utc>,
) -> Vec<VocabularyWord> {
    let mut accepted: Vec<VocabularyWord> = Vec::new();
    for entry in entries {
        let (Some(word), Some(definition), Some(example)) =
            (entry.word, entry.definition, entry.example)
        else {
            warn!(category = %subscriber.category, "dropping malformed generated entry");
            continue;
        };
        let key = word.to_lowercase();
        if excluded.contains(&key) || accepted.iter().any(|w| w.word.to_lowercase() == key) {
            continue;
        }
        accepted.push(VocabularyWord {
            id: Uuid::new_v4(),
            word,
            definition,
            example,
            category: subscriber.category.clone(),
            subcategory: subscriber.subcategory.clone(),
            part_of_speech: entry.part_of_speech,
            memory_aid: entry.memory_aid,
            created_at: now,
        });
    }
    accepted
}

/// Draws `count` words from the category's fallback pool, filtered against
/// the exclusion set. When the filtered pool runs short the full pool is
/// reshuffled (seeded, so reproducible) and re-drawn with fresh ids,
/// explicitly replenishing an exhausted pool.
fn fallback_words(
    category: &str,
    excluded: &[String],
    count: usize,
    seed: u64,
    now: DateTime<Utc>,
) -> Vec<VocabularyWord> {
    let pool = fallback::pool_for(category);
    let mut words: Vec<VocabularyWord> = pool
        .iter()
        .filter(|e| !excluded.contains(&e.word.to_lowercase()))
        .take(count)
        .map(|e| e.to_vocabulary_word(category, now))
        .collect();

    if words.len() < count && !pool.is_empty() {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut reshuffled: Vec<&fallback::FallbackEntry> = pool.iter().collect();
        reshuffled.shuffle(&mut rng);
        let mut i = 0;
        while words.len() < count {
            words.push(reshuffled[i % reshuffled.len()].to_vocabulary_word(category, now));
            i += 1;
        }
    }

    words
}
