//! Platform-sender contract: the only stability boundary the core commits
//! to. Every concrete provider (SMTP, webhook, SMS gateway, ...) implements
//! this trait; the registry and dispatcher only ever see it through here.

use std::collections::HashSet;

use async_trait::async_trait;
use notifyhub_common::{SendResult, Target, TargetType};

use crate::context::DispatchContext;
use crate::error::SenderError;

/// What a sender supports, queried once at registration and cached.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub target_types: HashSet<TargetType>,
    pub formats: HashSet<notifyhub_common::Format>,
    pub max_message_size: usize,
    pub supports_attachments: bool,
    pub supports_mentions: bool,
    pub supports_scheduling: bool,
    pub supports_rich_content: bool,
    pub required_settings: Vec<String>,
}

impl Capabilities {
    pub fn accepts(&self, target_type: TargetType) -> bool {
        self.target_types.contains(&target_type)
    }
}

/// A concrete provider: SMTP, a chat webhook, an SMS gateway, and so on.
/// Implementations must not panic; every failure surfaces as a
/// `SendResult { success: false, error, .. }` rather than an `Err`, except
/// for `validate_target`/`is_healthy`/`close`, which are explicit errors.
#[async_trait]
pub trait PlatformSender: Send + Sync {
    /// Stable identifier; also the registry key.
    fn name(&self) -> &str;

    /// Sends to every target, returning exactly one `SendResult` per input
    /// target, in the same order. Honors `ctx` cancellation/deadline: any
    /// target not attempted before cancellation/expiry gets
    /// `SendResult::failure(.., "cancelled", ..)`.
    async fn send(&self, ctx: &DispatchContext, message: &notifyhub_common::Message, targets: &[Target]) -> Vec<SendResult>;

    /// Pure, synchronous: rejects targets this sender cannot handle.
    fn validate_target(&self, target: &Target) -> Result<(), notifyhub_common::ValidationError>;

    fn capabilities(&self) -> Capabilities;

    /// Cheap reachability/config check.
    async fn is_healthy(&self, ctx: &DispatchContext) -> Result<(), SenderError>;

    /// Release connections. Idempotent.
    async fn close(&self) -> Result<(), SenderError>;
}
