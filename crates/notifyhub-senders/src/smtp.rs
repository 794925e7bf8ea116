//! SMTP sender built on `lettre`'s async transport, following the
//! workspace's `tokio1-rustls-tls` feature selection.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use notifyhub_common::{Format, Message, SendResult, Target, TargetType, ValidationError};
use notifyhub_dispatch::context::DispatchContext;
use notifyhub_dispatch::error::SenderError;
use notifyhub_dispatch::sender::{Capabilities, PlatformSender};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub use_tls: bool,
}

pub struct SmtpSender {
    name: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(name: impl Into<String>, config: SmtpConfig) -> Result<Self, SenderError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(|e| SenderError::Config(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder.port(config.port).credentials(creds).build();
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| SenderError::Config(format!("invalid from address: {e}")))?;

        Ok(Self {
            name: name.into(),
            transport,
            from,
        })
    }

    async fn send_one(&self, message: &Message, target: &Target) -> Result<(), SenderError> {
        let to: Mailbox = target
            .value
            .parse()
            .map_err(|e| SenderError::Config(format!("invalid target address: {e}")))?;

        let builder = LettreMessage::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.title);

        let content_type = if message.format == Format::Html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let email = builder
            .header(content_type)
            .body(message.body.clone())
            .map_err(|e| SenderError::Config(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| SenderError::Unreachable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformSender for SmtpSender {
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
                Ok(()) => SendResult::success(target.clone(), &self.name, duration, 1),
                Err(e) => SendResult::failure(target.clone(), &self.name, e.to_string(), duration, 1),
            });
        }
        results
    }

    fn validate_target(&self, target: &Target) -> Result<(), ValidationError> {
        target.value.parse::<Mailbox>().map(|_| ()).map_err(|_| ValidationError::EmptyTargetValue)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            target_types: HashSet::from([TargetType::Email]),
            formats: HashSet::from([Format::Text, Format::Html]),
            max_message_size: 25 * 1024 * 1024,
            supports_attachments: true,
            ..Default::default()
        }
    }

    async fn is_healthy(&self, _ctx: &DispatchContext) -> Result<(), SenderError> {
        if self.transport.test_connection().await.unwrap_or(false) {
            Ok(())
        } else {
            Err(SenderError::Unreachable("smtp connection test failed".into()))
        }
    }

    async fn close(&self) -> Result<(), SenderError> {
        Ok(())
    }
}
