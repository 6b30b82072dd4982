//! services/api/src/adapters/whatsapp.rs
//!
//! This module contains the WhatsApp messaging adapter, which implements the
//! `WhatsAppService` port against the Meta Graph API.
//!
//! HTTP outcomes map onto `SendError` variants: 429 and 5xx (and timeouts)
//! are transient, other 4xx are permanent, missing credentials are a
//! configuration error.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use vocab_delivery_core::ports::{ProviderReceipt, SendError, WhatsAppService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that sends text messages through the WhatsApp Cloud API.
#[derive(Clone)]
pub struct GraphApiWhatsAppAdapter {
    http: reqwest::Client,
    api_base: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

impl GraphApiWhatsAppAdapter {
    /// Creates a new `GraphApiWhatsAppAdapter`. Credentials stay optional so
    /// the service can boot without them; sends then fail fast.
    pub fn new(
        http: reqwest::Client,
        api_base: String,
        access_token: Option<String>,
        phone_number_id: Option<String>,
    ) -> Self {
        Self {
            http,
            api_base,
            access_token,
            phone_number_id,
        }
    }
}

#[derive(Deserialize)]
struct GraphMessageId {
    id: String,
}

#[derive(Deserialize)]
struct GraphSendResponse {
    messages: Vec<GraphMessageId>,
}

pub(crate) fn classify_status(status: reqwest::StatusCode, detail: String) -> SendError {
    if status.as_u16() == 429 || status.is_server_error() {
        SendError::Transient(detail)
    } else {
        SendError::Permanent(detail)
    }
}

pub(crate) fn classify_request_error(e: reqwest::Error) -> SendError {
    if e.is_timeout() || e.is_connect() {
        SendError::Transient(e.to_string())
    } else {
        SendError::Permanent(e.to_string())
    }
}

//=========================================================================================
// `WhatsAppService` Trait Implementation
//=========================================================================================

#[async_trait]
impl WhatsAppService for GraphApiWhatsAppAdapter {
    async fn send_message(&self, to: &str, body: &str) -> Result<ProviderReceipt, SendError> {
        let token = self.access_token.as_ref().ok_or_else(|| {
            SendError::Configuration("WHATSAPP_ACCESS_TOKEN is not set".to_string())
        })?;
        let phone_number_id = self.phone_number_id.as_ref().ok_or_else(|| {
            SendError::Configuration("WHATSAPP_PHONE_NUMBER_ID is not set".to_string())
        })?;

        let url = format!("{}/{}/messages", self.api_base, phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                format!("WhatsApp API returned {}: {}", status, detail),
            ));
        }

        let parsed: GraphSendResponse = response
            .json()
            .await
            .map_err(|e| SendError::Permanent(format!("Unparseable WhatsApp response: {e}")))?;
        let message_id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| {
                SendError::Permanent("WhatsApp response contained no message id".to_string())
            })?;

        Ok(ProviderReceipt {
            provider_message_id: message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            SendError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            SendError::Transient(_)
        ));
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, String::new()),
            SendError::Permanent(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, String::new()),
            SendError::Permanent(_)
        ));
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast_without_a_request() {
        let adapter = GraphApiWhatsAppAdapter::new(
            reqwest::Client::new(),
            "https://graph.example".to_string(),
            None,
            None,
        );
        let result = adapter.send_message("+15551234567", "hello").await;
        assert!(matches!(result, Err(SendError::Configuration(_))));
    }
}
