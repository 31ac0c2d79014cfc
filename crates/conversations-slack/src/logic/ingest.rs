//! Inbound event reconciliation
//!
//! Applies classified webhook events to the conversation store and notifies
//! live subscribers. Every handler is idempotent: Slack redelivers events,
//! and the message `ts` doubles as the store key, so a replay converges on
//! the same state instead of duplicating rows.
//!
//! Events referencing state this engine has never seen (a reaction to an
//! unsynced message, a reply to an unknown parent) are logged and dropped;
//! the webhook still acknowledges so Slack stops retrying.

use conversations::logic::conversation::{Conversation, NewConversation, ThreadReply};
use conversations::logic::event::{StreamEvent, StreamEventKind};
use conversations::logic::tenant::Tenant;
use shared::error::CommonError;
use tracing::{trace, warn};

use crate::SlackSyncService;
use crate::logic::users::get_or_create_slack_user;
use crate::types::{ClassifiedEvent, SlackMessageEvent, SlackReactionEvent};
use conversations::repository::ConversationRepositoryLike;

/// Apply one classified event to the store.
///
/// `Handshake` never reaches here; the webhook route answers it before
/// verification.
pub async fn handle_event(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    event: ClassifiedEvent,
) -> Result<(), CommonError> {
    match event {
        ClassifiedEvent::NewMessage(msg) => process_message(ctx, tenant, msg).await,
        ClassifiedEvent::ThreadReply(msg) => process_thread_reply(ctx, tenant, msg).await,
        ClassifiedEvent::ReactionAdded(reaction) => {
            process_reaction(ctx, tenant, reaction, true).await
        }
        ClassifiedEvent::ReactionRemoved(reaction) => {
            process_reaction(ctx, tenant, reaction, false).await
        }
        ClassifiedEvent::Handshake { .. } | ClassifiedEvent::Ignored => Ok(()),
    }
}

/// Sync a new root message.
async fn process_message(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    msg: SlackMessageEvent,
) -> Result<(), CommonError> {
    let Some(user_id) = msg.user.clone() else {
        trace!(ts = %msg.ts, "Message without author; skipping");
        return Ok(());
    };
    if ctx
        .repository()
        .get_conversation(&tenant.id, &msg.ts)
        .await?
        .is_some()
    {
        trace!(ts = %msg.ts, "Message already synced; skipping redelivery");
        return Ok(());
    }

    let author = get_or_create_slack_user(ctx.repository(), ctx.slack.as_ref(), tenant, &user_id)
        .await?;
    let channel_name = resolve_channel_name(ctx, tenant, &msg.channel).await;

    let conversation = Conversation::new(NewConversation {
        id: msg.ts.clone(),
        tenant_id: tenant.id.clone(),
        channel_id: msg.channel.clone(),
        channel_name,
        content: msg.text.unwrap_or_default(),
        user_id,
        user_name: author.map(|a| a.display_label().to_string()),
        thread_ts: None,
    });
    ctx.repository().create_conversation(&conversation).await?;

    trace!(tenant_id = %tenant.id, ts = %conversation.id, "Synced new message");
    ctx.sync.broadcaster.publish(
        &tenant.id,
        StreamEvent::new(
            StreamEventKind::NewMessage,
            serde_json::to_value(&conversation)?,
        ),
    );
    Ok(())
}

/// Sync a thread reply, keeping the standalone row and the parent's embedded
/// list in step.
async fn process_thread_reply(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    msg: SlackMessageEvent,
) -> Result<(), CommonError> {
    let Some(user_id) = msg.user.clone() else {
        trace!(ts = %msg.ts, "Reply without author; skipping");
        return Ok(());
    };
    // Classification guarantees the pointer exists.
    let Some(thread_ts) = msg.thread_ts.clone() else {
        return Ok(());
    };

    let Some(mut parent) = ctx
        .repository()
        .get_conversation(&tenant.id, &thread_ts)
        .await?
    else {
        warn!(
            tenant_id = %tenant.id,
            thread_ts = %thread_ts,
            "Reply to unknown parent; dropping"
        );
        return Ok(());
    };
    // Redelivery is detected against the parent's embedded list, not the
    // standalone row: if an earlier delivery wrote the row but lost the
    // parent update, the retry must still repair the embedded entry. The
    // standalone write below is a keyed upsert, so repeating it is harmless.
    if parent.thread_replies.iter().any(|r| r.ts == msg.ts) {
        trace!(ts = %msg.ts, "Reply already synced; skipping redelivery");
        return Ok(());
    }

    let author = get_or_create_slack_user(ctx.repository(), ctx.slack.as_ref(), tenant, &user_id)
        .await?;
    let text = msg.text.unwrap_or_default();

    let standalone = Conversation::new(NewConversation {
        id: msg.ts.clone(),
        tenant_id: tenant.id.clone(),
        channel_id: msg.channel.clone(),
        channel_name: parent.channel_name.clone(),
        content: text.clone(),
        user_id: user_id.clone(),
        user_name: author.map(|a| a.display_label().to_string()),
        thread_ts: Some(thread_ts.clone()),
    });
    ctx.repository().create_conversation(&standalone).await?;

    let reply = ThreadReply {
        ts: msg.ts.clone(),
        user: user_id,
        text,
        event_type: "message".to_string(),
        subtype: msg.subtype.clone(),
        thread_ts: thread_ts.clone(),
    };
    if parent.append_thread_reply(reply.clone()) {
        ctx.repository().save_conversation(&parent).await?;
    }

    trace!(tenant_id = %tenant.id, ts = %msg.ts, thread_ts = %thread_ts, "Synced thread reply");
    ctx.sync.broadcaster.publish(
        &tenant.id,
        StreamEvent::new(
            StreamEventKind::NewThreadReply,
            serde_json::json!({
                "conversation_id": thread_ts,
                "reply": reply,
            }),
        ),
    );
    Ok(())
}

/// Merge a reaction change into the target conversation's aggregates.
async fn process_reaction(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    reaction: SlackReactionEvent,
    added: bool,
) -> Result<(), CommonError> {
    let Some(mut conversation) = ctx
        .repository()
        .get_conversation(&tenant.id, &reaction.item.ts)
        .await?
    else {
        trace!(
            tenant_id = %tenant.id,
            ts = %reaction.item.ts,
            "Reaction to unsynced message; dropping"
        );
        return Ok(());
    };

    let changed = if added {
        conversation.apply_reaction_added(&reaction.reaction, &reaction.user)
    } else {
        conversation.apply_reaction_removed(&reaction.reaction, &reaction.user)
    };
    if !changed {
        trace!(ts = %reaction.item.ts, "Reaction change was a no-op");
        return Ok(());
    }

    ctx.repository().save_conversation(&conversation).await?;
    ctx.sync.broadcaster.publish(
        &tenant.id,
        StreamEvent::new(
            StreamEventKind::ReactionUpdate,
            serde_json::json!({
                "conversation_id": conversation.id,
                "reactions": conversation.reactions,
            }),
        ),
    );
    Ok(())
}

async fn resolve_channel_name(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    channel_id: &str,
) -> Option<String> {
    let bot_token = tenant.bot_token()?;
    match ctx.slack.fetch_channel_info(bot_token, channel_id).await {
        Ok(info) => info.name,
        Err(e) => {
            trace!(channel_id = %channel_id, error = %e, "Failed to resolve channel name");
            None
        }
    }
}
