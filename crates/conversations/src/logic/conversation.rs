//! Conversation domain model and reconciliation helpers
//!
//! A conversation is a synced platform message, keyed by the platform's
//! message timestamp string (globally unique per workspace), which doubles as
//! the idempotency key for redelivered events.
//!
//! Thread replies are deliberately dual-represented: a reply exists both as
//! its own standalone row (`thread_ts` pointing at the parent) and as a
//! record embedded in the parent's `thread_replies` list. The read path gets
//! a parent with its replies in one fetch; the standalone row keeps replies
//! addressable by their own key. Every mutation keeps both views in step.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shared::primitives::WrappedChronoDateTime;
use utoipa::ToSchema;

/// Aggregate of all users who reacted with one emoji to a message.
///
/// Invariant: `count == users.len()`, and an aggregate whose user set is
/// empty is removed from the list rather than retained with `count == 0`.
/// The mutation helpers below recompute `count` from the set on every change
/// so the two can never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ReactionAggregate {
    pub name: String,
    pub users: Vec<String>,
    pub count: usize,
}

impl ReactionAggregate {
    pub fn new(name: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: vec![user.into()],
            count: 1,
        }
    }
}

/// A reply record embedded in its parent conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ThreadReply {
    pub ts: String,
    pub user: String,
    pub text: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub thread_ts: String,
}

/// A synced conversation row (root message or standalone reply).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct Conversation {
    /// Platform message timestamp, the natural idempotency key.
    pub id: String,
    pub tenant_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    pub content: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub reactions: Vec<ReactionAggregate>,
    #[serde(default)]
    pub thread_replies: Vec<ThreadReply>,
    /// Present iff this row is itself a reply; points at the parent's id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub slack_timestamp: WrappedChronoDateTime,
    pub created_at: WrappedChronoDateTime,
    pub updated_at: WrappedChronoDateTime,
}

/// Parameters for materializing a new conversation row.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub id: String,
    pub tenant_id: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub content: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub thread_ts: Option<String>,
}

impl Conversation {
    pub fn new(params: NewConversation) -> Self {
        let now = WrappedChronoDateTime::now();
        Self {
            slack_timestamp: WrappedChronoDateTime::from_slack_ts(&params.id),
            id: params.id,
            tenant_id: params.tenant_id,
            channel_id: params.channel_id,
            channel_name: params.channel_name,
            content: params.content,
            user_id: params.user_id,
            user_name: params.user_name,
            reactions: Vec::new(),
            thread_replies: Vec::new(),
            thread_ts: params.thread_ts,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this row is a standalone reply linked to a parent.
    pub fn is_thread_reply(&self) -> bool {
        self.thread_ts.is_some()
    }

    /// Record a reaction by `user` with emoji `name`.
    ///
    /// Returns `true` if the aggregate list changed. A redelivered add from
    /// the same user is a no-op.
    pub fn apply_reaction_added(&mut self, name: &str, user: &str) -> bool {
        match self.reactions.iter_mut().find(|r| r.name == name) {
            Some(reaction) => {
                if reaction.users.iter().any(|u| u == user) {
                    return false;
                }
                reaction.users.push(user.to_string());
                reaction.count = reaction.users.len();
                true
            }
            None => {
                self.reactions.push(ReactionAggregate::new(name, user));
                true
            }
        }
    }

    /// Remove `user`'s reaction with emoji `name`, dropping the aggregate
    /// entirely once its user set empties.
    ///
    /// Returns `true` if the aggregate list changed. Removing an absent user
    /// or emoji is a no-op.
    pub fn apply_reaction_removed(&mut self, name: &str, user: &str) -> bool {
        let Some(index) = self.reactions.iter().position(|r| r.name == name) else {
            return false;
        };
        let reaction = &mut self.reactions[index];
        let before = reaction.users.len();
        reaction.users.retain(|u| u != user);
        if reaction.users.len() == before {
            return false;
        }
        reaction.count = reaction.users.len();
        if reaction.count == 0 {
            self.reactions.remove(index);
        }
        true
    }

    /// Append a reply record to the embedded list.
    ///
    /// Returns `false` (no mutation) if a reply with the same `ts` is
    /// already present, which is how redelivered reply events become no-ops.
    pub fn append_thread_reply(&mut self, reply: ThreadReply) -> bool {
        if self.thread_replies.iter().any(|r| r.ts == reply.ts) {
            return false;
        }
        self.thread_replies.push(reply);
        true
    }
}
