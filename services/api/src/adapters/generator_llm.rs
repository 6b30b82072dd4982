//! services/api/src/adapters/generator_llm.rs
//!
//! This module contains the adapter for the word-generating LLM.
//! It implements the `WordGenerationService` port from the `core` crate.
//!
//! The response contract is a JSON array of word objects. The adapter parses
//! leniently into optional fields; validating completeness is the core's job.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use vocab_delivery_core::ports::{GeneratedWord, PortError, PortResult, WordGenerationService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `WordGenerationService` using an OpenAI-compatible LLM.
///
/// The API key is optional: without one the service still boots and every
/// generation call errors, which the selection engine absorbs by degrading
/// to the static fallback pool.
#[derive(Clone)]
pub struct OpenAiGeneratorAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiGeneratorAdapter {
    /// Creates a new `OpenAiGeneratorAdapter`.
    pub fn new(api_key: Option<&str>, model: String) -> Self {
        let client =
            api_key.map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));
        Self { client, model }
    }
}

/// The wire shape of one generated entry. Every field is optional so a
/// partially filled object deserializes instead of failing the whole batch.
#[derive(Deserialize)]
struct RawGeneratedEntry {
    #[serde(default)]
    word: Option<String>,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default)]
    example: Option<String>,
    #[serde(default)]
    part_of_speech: Option<String>,
    #[serde(default)]
    memory_aid: Option<String>,
}

impl RawGeneratedEntry {
    fn to_port(self) -> GeneratedWord {
        GeneratedWord {
            word: self.word,
            definition: self.definition,
            example: self.example,
            part_of_speech: self.part_of_speech,
            memory_aid: self.memory_aid,
        }
    }
}

/// Models often wrap JSON in a markdown fence despite instructions not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

//=========================================================================================
// `WordGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl WordGenerationService for OpenAiGeneratorAdapter {
    async fn generate_words(
        &self,
        category: &str,
        subcategory: Option<&str>,
        count: u32,
        excluding: &[String],
    ) -> PortResult<Vec<GeneratedWord>> {
        let Some(client) = &self.client else {
            return Err(PortError::Unexpected(
                "word generation is disabled: OPENAI_API_KEY is not set".to_string(),
            ));
        };

        let topic = match subcategory {
            Some(sub) => format!("{} ({})", category, sub),
            None => category.to_string(),
        };
        let exclusions = if excluding.is_empty() {
            "none".to_string()
        } else {
            excluding.join(", ")
        };

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(
                    "You are a vocabulary curator for language learners. Respond with ONLY a \
                     JSON array, no prose and no markdown fences. Each element must be an \
                     object with the string fields \"word\", \"definition\", \"example\", \
                     \"part_of_speech\" and optionally \"memory_aid\". Definitions are one \
                     sentence; examples are one natural sentence using the word.",
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "Produce {} vocabulary words for the topic: {}.\n\
                     Do NOT use any of these already-seen words: {}.",
                    count, topic, exclusions
                ))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected(
                    "Word generation LLM response contained no text content.".to_string(),
                )
            })?;

        let entries: Vec<RawGeneratedEntry> = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| {
                PortError::Unexpected(format!("Word generation response was not a JSON array: {e}"))
            })?;

        Ok(entries.into_iter().map(RawGeneratedEntry::to_port).collect())
    }
}
