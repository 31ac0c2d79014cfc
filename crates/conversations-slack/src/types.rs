//! Slack wire-format type definitions
//!
//! Defines the Events API payload shapes this provider consumes, plus the
//! Web API request/response types used when sending, and the classification
//! step that turns a raw envelope into one of the closed set of sync actions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Slack Events API outer envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEventEnvelope {
    /// URL verification challenge from Slack
    UrlVerification { challenge: String, token: String },
    /// Event callback containing actual event data
    EventCallback {
        token: String,
        team_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        api_app_id: Option<String>,
        event: SlackEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_time: Option<i64>,
    },
    /// App rate limited notification
    AppRateLimited {
        token: String,
        team_id: String,
        minute_rate_limited: i64,
    },
}

/// Slack event types we care about
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    /// Message sent in a channel/DM
    Message(SlackMessageEvent),
    /// Emoji reaction added to a message
    ReactionAdded(SlackReactionEvent),
    /// Emoji reaction removed from a message
    ReactionRemoved(SlackReactionEvent),
    /// Catch-all for unknown events
    #[serde(other)]
    Unknown,
}

/// Slack message event payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SlackMessageEvent {
    /// Channel ID where the message was sent
    pub channel: String,
    /// User ID of the sender (optional for bot messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Message text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Timestamp (used as message ID)
    pub ts: String,
    /// Thread timestamp (if in a thread)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Subtype of message (e.g., "bot_message", "message_changed")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Bot ID if message is from a bot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    /// Additional properties
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SlackMessageEvent {
    /// A message is a thread reply only when its thread pointer exists and
    /// differs from its own ts; a thread parent carries `thread_ts == ts`.
    pub fn is_thread_reply(&self) -> bool {
        self.thread_ts
            .as_deref()
            .is_some_and(|thread_ts| thread_ts != self.ts)
    }
}

/// Slack reaction_added / reaction_removed event payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SlackReactionEvent {
    /// User who (un)reacted
    pub user: String,
    /// Emoji short name, without colons
    pub reaction: String,
    /// The message the reaction applies to
    pub item: SlackReactionItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_user: Option<String>,
    /// Additional properties
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The target of a reaction event
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SlackReactionItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub channel: String,
    pub ts: String,
}

/// The closed set of actions the sync engine takes in response to a webhook.
///
/// Classification is total: every deserializable envelope maps to exactly one
/// variant, and anything unrecognized lands in `Ignored` rather than an error.
#[derive(Debug, Clone)]
pub enum ClassifiedEvent {
    /// Echo the challenge back, before any verification.
    Handshake { challenge: String },
    /// A new root message to sync.
    NewMessage(SlackMessageEvent),
    /// A reply inside an existing thread.
    ThreadReply(SlackMessageEvent),
    ReactionAdded(SlackReactionEvent),
    ReactionRemoved(SlackReactionEvent),
    /// Bot echoes, message subtypes, and event types outside the sync set.
    Ignored,
}

/// Map a deserialized envelope to a sync action.
///
/// Bot-authored messages and messages with a subtype (edits, joins, bot
/// posts) are dropped here so the engine never re-ingests its own sends.
pub fn classify(envelope: SlackEventEnvelope) -> ClassifiedEvent {
    match envelope {
        SlackEventEnvelope::UrlVerification { challenge, .. } => {
            ClassifiedEvent::Handshake { challenge }
        }
        SlackEventEnvelope::EventCallback { event, .. } => match event {
            SlackEvent::Message(msg) => {
                if msg.bot_id.is_some() || msg.subtype.is_some() {
                    return ClassifiedEvent::Ignored;
                }
                if msg.is_thread_reply() {
                    ClassifiedEvent::ThreadReply(msg)
                } else {
                    ClassifiedEvent::NewMessage(msg)
                }
            }
            SlackEvent::ReactionAdded(reaction) => ClassifiedEvent::ReactionAdded(reaction),
            SlackEvent::ReactionRemoved(reaction) => ClassifiedEvent::ReactionRemoved(reaction),
            SlackEvent::Unknown => ClassifiedEvent::Ignored,
        },
        SlackEventEnvelope::AppRateLimited { .. } => ClassifiedEvent::Ignored,
    }
}

/// Request to send a message via Slack's chat.postMessage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackPostMessageRequest {
    /// Channel ID to post to
    pub channel: String,
    /// Message text
    pub text: String,
    /// Thread timestamp to reply in thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Display-name override, honored only for bot-token sends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Avatar override, honored only for bot-token sends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Response from Slack's chat.postMessage API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackPostMessageResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Profile block from Slack's users.info
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackUserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_192: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// User record from Slack's users.info
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackUserInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    #[serde(default)]
    pub profile: SlackUserProfile,
}

/// Channel record from Slack's conversations.info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackChannelInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
