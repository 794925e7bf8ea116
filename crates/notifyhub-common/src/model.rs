//! Core data model: the types that flow through NotifyHub end to end.
//!
//! `Message` is a serde-friendly value type that travels from the public
//! API down into the queue and out to senders without the core ever
//! mutating it after `build()`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery priority. Higher numeric value sorts first in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Minimal = 1,
    Low = 2,
    Normal = 3,
    High = 4,
    Urgent = 5,
}

impl Priority {
    /// Priority levels above `Normal` are routed to the queue's priority lane.
    pub fn is_elevated(self) -> bool {
        self > Priority::Normal
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Body content format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Text,
    Html,
    Markdown,
}

impl Default for Format {
    fn default() -> Self {
        Format::Text
    }
}

/// The kind of destination a `Target` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Email,
    Phone,
    User,
    Channel,
    Webhook,
    Group,
}

/// An addressable recipient: its type, address value, and optional explicit
/// sender binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub value: String,
    /// Explicit sender name. When set, the dispatcher skips capability
    /// resolution and routes directly to this sender.
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Target {
    pub fn new(target_type: TargetType, value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::EmptyTargetValue);
        }
        Ok(Self {
            target_type,
            value,
            platform: None,
            metadata: HashMap::new(),
        })
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Validation failures raised while building a `Message` or `Target`.
/// Surfaced synchronously at `send`/`send_async`, before anything is enqueued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target value must not be empty")]
    EmptyTargetValue,
    #[error("message must have at least one target")]
    NoTargets,
    #[error("message title and body are both empty")]
    EmptyContent,
    #[error("scheduled_at ({scheduled_at}) is before created_at ({created_at})")]
    ScheduledBeforeCreated {
        scheduled_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    },
}

/// The message sent through NotifyHub: title/body/payload plus the set of
/// targets it should fan out to. Immutable once built; senders never mutate
/// their input `Message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub title: String,
    pub body: String,
    pub format: Format,
    pub priority: Priority,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Opaque per-sender hints, keyed by sender name. Senders read the entry
    /// matching their own `name()`; the core never interprets the value.
    #[serde(default)]
    pub platform_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// The provider-facing hint payload for a given sender name, if any.
    pub fn platform_data_for(&self, sender_name: &str) -> Option<&serde_json::Value> {
        self.platform_data.get(sender_name)
    }
}

/// Builds a `Message`, enforcing spec invariants once at `build()` instead of
/// scattering validation across call sites.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    title: String,
    body: String,
    format: Format,
    priority: Priority,
    targets: Vec<Target>,
    metadata: HashMap<String, String>,
    platform_data: HashMap<String, serde_json::Value>,
    template: Option<String>,
    variables: HashMap<String, serde_json::Value>,
    delay: Option<Duration>,
    scheduled_at: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            format: Format::default(),
            priority: Priority::default(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn targets(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn platform_data(mut self, sender_name: impl Into<String>, value: serde_json::Value) -> Self {
        self.platform_data.insert(sender_name.into(), value);
        self
    }

    pub fn template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn build(self) -> Result<Message, ValidationError> {
        if self.targets.is_empty() {
            return Err(ValidationError::NoTargets);
        }
        if self.title.is_empty() && self.body.is_empty() {
            return Err(ValidationError::EmptyContent);
        }

        let created_at = Utc::now();
        let scheduled_at = self
            .scheduled_at
            .or_else(|| self.delay.map(|d| created_at + chrono::Duration::from_std(d).unwrap_or_default()));

        if let Some(scheduled_at) = scheduled_at {
            if scheduled_at < created_at {
                return Err(ValidationError::ScheduledBeforeCreated {
                    scheduled_at,
                    created_at,
                });
            }
        }

        Ok(Message {
            id: uuid::Uuid::new_v4().to_string(),
            title: self.title,
            body: self.body,
            format: self.format,
            priority: self.priority,
            targets: self.targets,
            metadata: self.metadata,
            platform_data: self.platform_data,
            template: self.template,
            variables: self.variables,
            scheduled_at,
            created_at,
            updated_at: created_at,
        })
    }
}

/// Per-target delivery outcome. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub target: Target,
    pub platform: String,
    pub success: bool,
    #[serde(default)]
    pub message_id: Option<String>,
    /// Human-readable error, empty on success.
    #[serde(default)]
    pub error: String,
    pub duration: Duration,
    pub sent_at: DateTime<Utc>,
    pub attempts: u32,
}

impl SendResult {
    pub fn success(target: Target, platform: impl Into<String>, duration: Duration, attempts: u32) -> Self {
        Self {
            target,
            platform: platform.into(),
            success: true,
            message_id: None,
            error: String::new(),
            duration,
            sent_at: Utc::now(),
            attempts: attempts.max(1),
        }
    }

    pub fn failure(
        target: Target,
        platform: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            target,
            platform: platform.into(),
            success: false,
            message_id: None,
            error: error.into(),
            duration,
            sent_at: Utc::now(),
            attempts: attempts.max(1),
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

/// Per-message aggregate of per-target outcomes. Not a success indicator on
/// its own — callers inspect individual `SendResult::success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub message_id: String,
    pub results: Vec<SendResult>,
    pub completed_at: DateTime<Utc>,
}

impl Receipt {
    pub fn new(message_id: impl Into<String>, results: Vec<SendResult>) -> Self {
        Self {
            message_id: message_id.into(),
            results,
            completed_at: Utc::now(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }
}

/// A `Message` wrapped with queue bookkeeping. Ordering key inside a lane is
/// (priority descending, timestamp ascending) — see `Ord` below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message: Message,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl QueueMessage {
    pub fn new(message: Message, max_retries: u32) -> Self {
        let scheduled_at = message.scheduled_at;
        Self {
            message,
            retry_count: 0,
            max_retries,
            scheduled_at,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.message.priority
    }

    /// Whether this message is still waiting for its scheduled time.
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_some_and(|t| t > now)
    }
}

impl PartialEq for QueueMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message.id == other.message.id && self.timestamp == other.timestamp
    }
}
impl Eq for QueueMessage {}

impl PartialOrd for QueueMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueMessage {
    /// Higher priority first; among equal priorities, earlier timestamp first
    /// (FIFO). This is the ordering a `BinaryHeap` (a max-heap) needs to pop
    /// the "most urgent, oldest" message first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| other.timestamp.cmp(&self.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(v: &str) -> Target {
        Target::new(TargetType::Email, v).unwrap()
    }

    #[test]
    fn builder_rejects_empty_targets() {
        let err = Message::builder().title("hi").body("there").build().unwrap_err();
        assert_eq!(err, ValidationError::NoTargets);
    }

    #[test]
    fn builder_rejects_empty_content() {
        let err = Message::builder().target(target("a@x.com")).build().unwrap_err();
        assert_eq!(err, ValidationError::EmptyContent);
    }

    #[test]
    fn builder_assigns_nonempty_id() {
        let msg = Message::builder()
            .title("hi")
            .target(target("a@x.com"))
            .build()
            .unwrap();
        assert!(!msg.id.is_empty());
        assert_eq!(msg.targets.len(), 1);
    }

    #[test]
    fn queue_message_orders_by_priority_then_fifo() {
        let mut heap = std::collections::BinaryHeap::new();
        let low = QueueMessage::new(
            Message::builder().title("a").priority(Priority::Low).target(target("a@x.com")).build().unwrap(),
            3,
        );
        std::thread::sleep(Duration::from_millis(2));
        let urgent = QueueMessage::new(
            Message::builder().title("b").priority(Priority::Urgent).target(target("b@x.com")).build().unwrap(),
            3,
        );
        std::thread::sleep(Duration::from_millis(2));
        let normal = QueueMessage::new(
            Message::builder().title("c").priority(Priority::Normal).target(target("c@x.com")).build().unwrap(),
            3,
        );

        heap.push(low.clone());
        heap.push(normal.clone());
        heap.push(urgent.clone());

        assert_eq!(heap.pop().unwrap().message.title, "b");
        assert_eq!(heap.pop().unwrap().message.title, "c");
        assert_eq!(heap.pop().unwrap().message.title, "a");
    }

    #[test]
    fn fifo_tiebreak_at_same_priority() {
        let mut heap = std::collections::BinaryHeap::new();
        let first = QueueMessage::new(
            Message::builder().title("first").target(target("a@x.com")).build().unwrap(),
            3,
        );
        std::thread::sleep(Duration::from_millis(2));
        let second = QueueMessage::new(
            Message::builder().title("second").target(target("b@x.com")).build().unwrap(),
            3,
        );

        heap.push(second.clone());
        heap.push(first.clone());

        assert_eq!(heap.pop().unwrap().message.title, "first");
        assert_eq!(heap.pop().unwrap().message.title, "second");
    }
}
