//! Generic SMS gateway sender: POSTs a JSON payload to a provider's REST API
//! with bearer-token auth, following the same request-building shape as
//! [`crate::webhook::WebhookSender`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notifyhub_common::{Format, Message, SendResult, Target, TargetType, ValidationError};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_dispatch::error::SenderError;
use notifyhub_dispatch::sender::{Capabilities, PlatformSender};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_number: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    body: &'a str,
}

#[derive(Debug, Deserialize, Default)]
struct SmsResponse {
    #[serde(default)]
    message_id: Option<String>,
}

pub struct SmsSender {
    name: String,
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsSender {
    pub fn new(name: impl Into<String>, config: SmsConfig) -> Result<Self, SenderError> {
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

    async fn send_one(&self, message: &Message, target: &Target) -> Result<Option<String>, SenderError> {
        let request = SmsRequest {
            to: &target.value,
            from: self.config.from_number.as_deref(),
            body: &message.body,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SenderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::Unreachable(format!("sms gateway returned status {status}")));
        }

        let body: SmsResponse = response.json().await.unwrap_or_default();
        Ok(body.message_id)
    }
}

#[async_trait]
impl PlatformSender for SmsSender {
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
            let outcome = self.send_one(message, target).await;
            let duration = started.elapsed();
            results.push(match outcome {
                Ok(message_id) => {
                    let mut result = SendResult::success(target.clone(), &self.name, duration, 1);
                    if let Some(id) = message_id {
                        result = result.with_message_id(id);
                    }
                    result
                }
                Err(e) => SendResult::failure(target.clone(), &self.name, e.to_string(), duration, 1),
            });
        }
        results
    }

    fn validate_target(&self, target: &Target) -> Result<(), ValidationError> {
        let digits = target.value.chars().filter(|c| c.is_ascii_digit()).count();
        if target.value.starts_with('+') && digits >= 8 {
            Ok(())
        } else {
            Err(ValidationError::EmptyTargetValue)
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            target_types: HashSet::from([TargetType::Phone]),
            formats: HashSet::from([Format::Text]),
            max_message_size: 1600,
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
