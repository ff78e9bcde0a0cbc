//! SMS notifications
//!
//! Status changes notify the farmer fire-and-forget: a failed send is logged
//! and never fails the request that triggered it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::requests::{RequestStatus, SupportRequest};
use crate::types::KrishiError;

/// One outbound text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessage {
    pub phone: String,
    pub message: String,
}

impl SmsMessage {
    /// Build a message, checking the phone number and body
    pub fn new(phone: &str, message: &str) -> Result<Self, KrishiError> {
        let phone = normalize_phone(phone)?;
        let message = message.trim();
        if message.is_empty() {
            return Err(KrishiError::Validation("Message is required".into()));
        }
        Ok(Self {
            phone,
            message: message.to_string(),
        })
    }

    /// Text sent to the farmer when a request changes status
    pub fn status_update(
        phone: &str,
        req: &SupportRequest,
        status: RequestStatus,
        reason: Option<&str>,
    ) -> Result<Self, KrishiError> {
        let mut text = format!("Your request \"{}\" is now {}.", req.title, status);
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            text.push(' ');
            text.push_str(reason);
        }
        Self::new(phone, &text)
    }
}

/// Strip spaces and dashes; require 10 to 15 digits with an optional leading `+`
pub fn normalize_phone(raw: &str) -> Result<String, KrishiError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if digits.len() < 10 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(KrishiError::Validation(format!("Invalid phone number: {}", raw.trim())));
    }
    Ok(cleaned)
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, sms: &SmsMessage) -> Result<(), KrishiError>;

    fn name(&self) -> &'static str;
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, sms: &SmsMessage) -> Result<(), KrishiError> {
        info!(phone = %sms.phone, "SMS (not sent, no gateway configured): {}", sms.message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Posts `{to, message}` to an SMS gateway webhook
pub struct SmsWebhookNotifier {
    http_client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    message: &'a str,
}

impl SmsWebhookNotifier {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self, KrishiError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("krishi-desk/0.1")
            .build()
            .map_err(|e| KrishiError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            url,
            token,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for SmsWebhookNotifier {
    async fn send(&self, sms: &SmsMessage) -> Result<(), KrishiError> {
        let mut request = self.http_client.post(&self.url).json(&WebhookPayload {
            to: &sms.phone,
            message: &sms.message,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KrishiError::Upstream(format!(
                "SMS gateway returned {status}"
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{NewRequest, RequestCategory};
    use chrono::Utc;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("98765 43210").unwrap(), "9876543210");
        assert_eq!(normalize_phone("+91-98765-43210").unwrap(), "+919876543210");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("98765abcde").is_err());
    }

    #[test]
    fn test_blank_message_rejected() {
        assert!(matches!(
            SmsMessage::new("9876543210", "  "),
            Err(KrishiError::Validation(_))
        ));
    }

    #[test]
    fn test_status_update_text() {
        let req = SupportRequest::create(
            NewRequest {
                title: "Pump broken".into(),
                description: "No water".into(),
                category: RequestCategory::IrrigationIssue,
                priority: None,
                farmer_ref: None,
            },
            "f-1".into(),
            vec![],
            Utc::now(),
        )
        .unwrap();
        let sms = SmsMessage::status_update(
            "9876543210",
            &req,
            RequestStatus::Resolved,
            Some("Fixed pump"),
        )
        .unwrap();
        assert_eq!(sms.message, "Your request \"Pump broken\" is now resolved. Fixed pump");
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let sms = SmsMessage::new("9876543210", "Hello").unwrap();
        assert!(LogNotifier.send(&sms).await.is_ok());
    }

    #[test]
    fn test_unreachable_gateway_is_upstream_error() {
        let notifier = SmsWebhookNotifier::new(
            "http://127.0.0.1:9/sms".into(),
            Some("token".into()),
            Duration::from_millis(500),
        )
        .unwrap();
        let sms = SmsMessage::new("9876543210", "Hello").unwrap();

        let result = tokio_test::block_on(notifier.send(&sms));
        assert!(matches!(result, Err(KrishiError::Upstream(_))));
    }
}
