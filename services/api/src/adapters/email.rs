//! services/api/src/adapters/email.rs
//!
//! This module contains the transactional email adapter, which implements the
//! `EmailService` port against a Resend-style HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use vocab_delivery_core::ports::{EmailService, ProviderReceipt, SendError};

use super::whatsapp::{classify_request_error, classify_status};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that sends transactional email over HTTP.
#[derive(Clone)]
pub struct HttpEmailAdapter {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    sender: String,
}

impl HttpEmailAdapter {
    /// Creates a new `HttpEmailAdapter`.
    pub fn new(
        http: reqwest::Client,
        api_base: String,
        api_key: Option<String>,
        sender: String,
    ) -> Self {
        Self {
            http,
            api_base,
            api_key,
            sender,
        }
    }
}

#[derive(Deserialize)]
struct EmailSendResponse {
    id: String,
}

//=========================================================================================
// `EmailService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EmailService for HttpEmailAdapter {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<ProviderReceipt, SendError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| SendError::Configuration("EMAIL_API_KEY is not set".to_string()))?;

        let url = format!("{}/emails", self.api_base);
        let payload = json!({
            "from": self.sender,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                format!("Email API returned {}: {}", status, detail),
            ));
        }

        let parsed: EmailSendResponse = response
            .json()
            .await
            .map_err(|e| SendError::Permanent(format!("Unparseable email response: {e}")))?;

        Ok(ProviderReceipt {
            provider_message_id: parsed.id,
        })
    }
}
