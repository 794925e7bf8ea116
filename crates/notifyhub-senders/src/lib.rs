//! Built-in `PlatformSender` implementations: SMTP, generic webhook, Feishu
//! group bot, and a generic SMS gateway.

pub mod feishu;
pub mod smtp;
pub mod sms;
pub mod webhook;

pub use feishu::{FeishuConfig, FeishuSender};
pub use smtp::{SmtpConfig, SmtpSender};
pub use sms::{SmsConfig, SmsSender};
pub use webhook::{WebhookConfig, WebhookSender};
