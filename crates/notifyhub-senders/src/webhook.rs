//! Generic webhook sender: HTTP POST with optional HMAC-SHA256 signing and
//! bearer auth. Signing scheme is timestamp + body, hex-encoded
//! HMAC-SHA256, carried in `X-NOTIFYHUB-SIGNATURE`/`X-NOTIFYHUB-TIMESTAMP`.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use notifyhub_common::{Format, Message, SendResult, Target, TargetType, ValidationError};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_dispatch::error::SenderError;
use notifyhub_dispatch::sender::{Capabilities, PlatformSender};
use serde::Serialize;
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "X-NOTIFYHUB-SIGNATURE";
pub const TIMESTAMP_HEADER: &str = "X-NOTIFYHUB-TIMESTAMP";

type HmacSha256 = Hmac<Sha256>;

/// `timestamp + body`, HMAC-SHA256 with `signing_secret`, hex-encoded.
pub fn sign_webhook(payload: &str, signing_secret: &str) -> (String, String) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let signature_payload = format!("{timestamp}{payload}");

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).expect("HMAC accepts a key of any size");
    mac.update(signature_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    (signature, timestamp)
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "messageId")]
    message_id: &'a str,
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub signing_secret: Option<String>,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

pub struct WebhookSender {
    name: String,
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookSender {
    pub fn new(name: impl Into<String>, config: WebhookConfig) -> Result<Self, SenderError> {
        let timeout = if config.timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            config.timeout
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SenderError::Config(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            client,
            config,
        })
    }

    fn signing_secret<'a>(&'a self, target: &'a Target) -> Option<&'a str> {
        target
            .metadata
            .get("signing_secret")
            .map(String::as_str)
            .or(self.config.signing_secret.as_deref())
    }

    fn auth_token<'a>(&'a self, target: &'a Target) -> Option<&'a str> {
        target
            .metadata
            .get("auth_token")
            .map(String::as_str)
            .or(self.config.auth_token.as_deref())
    }

    async fn post(&self, target: &Target, message: &Message) -> Result<(), SenderError> {
        let payload = WebhookPayload {
            message_id: &message.id,
            title: &message.title,
            body: &message.body,
        };
        let payload_json = serde_json::to_string(&payload).map_err(|e| SenderError::Config(e.to_string()))?;

        let mut request = self
            .client
            .post(&target.value)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        if let Some(secret) = self.signing_secret(target) {
            let (signature, timestamp) = sign_webhook(&payload_json, secret);
            request = request.header(SIGNATURE_HEADER, signature).header(TIMESTAMP_HEADER, timestamp);
        }
        if let Some(token) = self.auth_token(target) {
            request = request.bearer_auth(token);
        }

        let response = request
            .body(payload_json)
            .send()
            .await
            .map_err(|e| SenderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SenderError::Unreachable(format!("webhook returned status {status}")))
        }
    }
}

#[async_trait]
impl PlatformSender for WebhookSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, ctx: &DispatchContext, message: &Message, targets: &[Target]) -> Vec<SendResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            if ctx.is_cancelled() || ctx.is_expired() {
                results.push(SendResult::failure(target.clone(), &self.name, "cancelled", Duration::ZERO, 0));
                continue;
            }
            let started = Instant::now();
            let outcome = self.post(target, message).await;
            let duration = started.elapsed();
            results.push(match outcome {
                Ok(()) => SendResult::success(target.clone(), &self.name, duration, 1),
                Err(e) => SendResult::failure(target.clone(), &self.name, e.to_string(), duration, 1),
            });
        }
        results
    }

    fn validate_target(&self, target: &Target) -> Result<(), ValidationError> {
        if target.value.starts_with("http://") || target.value.starts_with("https://") {
            Ok(())
        } else {
            Err(ValidationError::EmptyTargetValue)
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            target_types: HashSet::from([TargetType::Webhook, TargetType::Channel]),
            formats: HashSet::from([Format::Text, Format::Markdown, Format::Html]),
            max_message_size: 1024 * 1024,
            supports_rich_content: true,
            ..Default::default()
        }
    }

    async fn is_healthy(&self, _ctx: &DispatchContext) -> Result<(), SenderError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SenderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_changes_with_payload() {
        let (sig_a, _) = sign_webhook("payload-a", "secret");
        let (sig_b, _) = sign_webhook("payload-b", "secret");
        assert_ne!(sig_a, sig_b);
    }

    #[test]
    fn validate_target_requires_http_scheme() {
        let sender = WebhookSender::new("webhook", WebhookConfig::default()).unwrap();
        let bad = Target::new(TargetType::Webhook, "not-a-url").unwrap();
        assert!(sender.validate_target(&bad).is_err());
        let good = Target::new(TargetType::Webhook, "https://example.com/hook").unwrap();
        assert!(sender.validate_target(&good).is_ok());
    }

    #[tokio::test]
    async fn webhook_posts_signed_payload_and_reports_success() {
        use wiremock::matchers::{header_exists, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(
            "webhook",
            WebhookConfig {
                signing_secret: Some("topsecret".into()),
                auth_token: None,
                timeout: Duration::from_secs(5),
            },
        )
        .unwrap();

        let message = Message::builder()
            .title("hi")
            .body("there")
            .target(Target::new(TargetType::Webhook, format!("{}/hook", server.uri())).unwrap())
            .build()
            .unwrap();

        let ctx = DispatchContext::new();
        let results = sender.send(&ctx, &message, &message.targets).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }
}
