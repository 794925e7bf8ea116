//! Feishu (Lark) group-bot webhook sender: posts a `msg_type: "text"` card
//! to a bot's incoming webhook URL, signed with the same HMAC-SHA256
//! convention as [`crate::webhook::sign_webhook`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notifyhub_common::{Format, Message, SendResult, Target, TargetType, ValidationError};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_dispatch::error::SenderError;
use notifyhub_dispatch::sender::{Capabilities, PlatformSender};
use serde::Serialize;

use crate::webhook::sign_webhook;

#[derive(Debug, Serialize)]
struct FeishuText<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct FeishuPayload<'a> {
    msg_type: &'static str,
    content: FeishuText<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct FeishuConfig {
    pub signing_secret: Option<String>,
    pub timeout: Duration,
}

pub struct FeishuSender {
    client: reqwest::Client,
    config: FeishuConfig,
}

impl FeishuSender {
    pub fn new(config: FeishuConfig) -> Result<Self, SenderError> {
        let timeout = if config.timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            config.timeout
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SenderError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn signing_secret<'a>(&'a self, target: &'a Target) -> Option<&'a str> {
        target
            .metadata
            .get("signing_secret")
            .map(String::as_str)
            .or(self.config.signing_secret.as_deref())
    }

    fn body_text(message: &Message) -> String {
        if message.title.is_empty() {
            message.body.clone()
        } else {
            format!("{}\n{}", message.title, message.body)
        }
    }

    async fn post(&self, target: &Target, message: &Message) -> Result<(), SenderError> {
        let text = Self::body_text(message);
        let payload = FeishuPayload {
            msg_type: "text",
            content: FeishuText { text: &text },
        };
        let payload_json = serde_json::to_string(&payload).map_err(|e| SenderError::Config(e.to_string()))?;

        let mut request = self.client.post(&target.value).header("Content-Type", "application/json");

        if let Some(secret) = self.signing_secret(target) {
            let (signature, timestamp) = sign_webhook(&payload_json, secret);
            request = request
                .header("X-FEISHU-SIGNATURE", signature)
                .header("X-FEISHU-TIMESTAMP", timestamp);
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
            Err(SenderError::Unreachable(format!("feishu webhook returned status {status}")))
        }
    }
}

#[async_trait]
impl PlatformSender for FeishuSender {
    fn name(&self) -> &str {
        "feishu"
    }

    async fn send(&self, ctx: &DispatchContext, message: &Message, targets: &[Target]) -> Vec<SendResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            if ctx.is_cancelled() || ctx.is_expired() {
                results.push(SendResult::failure(target.clone(), "feishu", "cancelled", Duration::ZERO, 0));
                continue;
            }
            let started = Instant::now();
            let outcome = self.post(target, message).await;
            let duration = started.elapsed();
            results.push(match outcome {
                Ok(()) => SendResult::success(target.clone(), "feishu", duration, 1),
                Err(e) => SendResult::failure(target.clone(), "feishu", e.to_string(), duration, 1),
            });
        }
        results
    }

    fn validate_target(&self, target: &Target) -> Result<(), ValidationError> {
        if target.value.contains("open.feishu.cn") || target.value.starts_with("https://") {
            Ok(())
        } else {
            Err(ValidationError::EmptyTargetValue)
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            target_types: HashSet::from([TargetType::Webhook, TargetType::Channel, TargetType::Group]),
            formats: HashSet::from([Format::Text]),
            max_message_size: 30 * 1024,
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
