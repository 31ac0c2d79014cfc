//! Outbound messaging gateway and token lifecycle
//!
//! Sends dashboard-originated messages into Slack with tiered credentials:
//! when the acting user has a usable token the send is attempted as them
//! (no overrides; Slack attributes the message natively), and any failure of
//! that attempt falls back to the bot token with the user's name and avatar
//! as display overrides. Sent messages are written back into the store and
//! broadcast, so the dashboard converges without waiting for Slack to echo
//! the message through the webhook (bot echoes are filtered on ingest).

use conversations::logic::conversation::{Conversation, NewConversation, ThreadReply};
use conversations::logic::event::{StreamEvent, StreamEventKind};
use conversations::logic::tenant::Tenant;
use conversations::logic::user::SlackUser;
use conversations::repository::{
    ConversationRepositoryLike, SlackUserRepositoryLike, TenantRepositoryLike,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shared::error::CommonError;
use tracing::{info, trace, warn};
use utoipa::ToSchema;

use crate::SlackSyncService;
use crate::types::SlackPostMessageRequest;

/// A dashboard-originated message to deliver into Slack.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct OutboundMessage {
    pub channel: String,
    pub text: String,
    /// Reply into this thread instead of posting a root message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Slack user to act as; absent means a plain bot send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_user: Option<String>,
}

/// Result of an outbound send.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct PostOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_ts: Option<String>,
    /// Whether the message was delivered under the user's own token.
    pub posted_as_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Platform error code when the final attempt was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Deliver an outbound message with user-then-bot credential fallback.
///
/// Transport failures surface as `Upstream` errors; a platform-level
/// rejection of the final attempt is reported in the outcome instead, since
/// the request itself was well-formed.
pub async fn post_outbound(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    outbound: OutboundMessage,
) -> Result<PostOutcome, CommonError> {
    let bot_token = tenant.bot_token().ok_or_else(|| CommonError::InvalidRequest {
        msg: "tenant has no workspace connected".to_string(),
        source: None,
    })?;

    let acting_user = match &outbound.as_user {
        Some(user_id) => ctx.repository().get_slack_user(&tenant.id, user_id).await?,
        None => None,
    };
    let user_name = acting_user.as_ref().map(|u| u.display_label().to_string());

    // Tier 1: the user's own token, no overrides.
    let mut attempted_as_user = false;
    if let Some(user) = acting_user.as_ref().filter(|u| u.has_valid_token()) {
        attempted_as_user = true;
        let token = user.user_token.as_deref().unwrap_or_default();
        let request = SlackPostMessageRequest {
            channel: outbound.channel.clone(),
            text: outbound.text.clone(),
            thread_ts: outbound.thread_ts.clone(),
            username: None,
            icon_url: None,
        };
        match ctx.slack.post_message(token, &request).await {
            Ok(posted) => {
                record_sent(ctx, tenant, &outbound, &posted.ts, user_name.clone()).await?;
                return Ok(PostOutcome {
                    ok: true,
                    message_ts: Some(posted.ts),
                    posted_as_user: true,
                    user_name,
                    error: None,
                });
            }
            Err(e) => {
                warn!(
                    tenant_id = %tenant.id,
                    user_id = %user.slack_user_id,
                    error = %e,
                    "User-token send failed; falling back to bot"
                );
            }
        }
    }

    // Tier 2: the bot token. Display overrides are attached only when a
    // user-token attempt actually preceded; a send that never had a usable
    // user token goes out as the plain bot identity.
    let (username, icon_url) = if attempted_as_user {
        (
            user_name.clone(),
            acting_user.as_ref().and_then(|u| u.profile_image.clone()),
        )
    } else {
        (None, None)
    };
    let request = SlackPostMessageRequest {
        channel: outbound.channel.clone(),
        text: outbound.text.clone(),
        thread_ts: outbound.thread_ts.clone(),
        username,
        icon_url,
    };
    match ctx.slack.post_message(bot_token, &request).await {
        Ok(posted) => {
            record_sent(ctx, tenant, &outbound, &posted.ts, user_name.clone()).await?;
            Ok(PostOutcome {
                ok: true,
                message_ts: Some(posted.ts),
                posted_as_user: false,
                user_name,
                error: None,
            })
        }
        Err(e) => {
            let code = e.api_error().map(str::to_string);
            match code {
                Some(code) => Ok(PostOutcome {
                    ok: false,
                    message_ts: None,
                    posted_as_user: false,
                    user_name,
                    error: Some(code),
                }),
                None => Err(CommonError::Upstream {
                    msg: "failed to deliver message".to_string(),
                    source: Some(anyhow::Error::new(e)),
                }),
            }
        }
    }
}

/// Write the sent message back into the store and notify subscribers, so
/// outbound traffic shows up in the dashboard the same way inbound does.
async fn record_sent(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    outbound: &OutboundMessage,
    ts: &str,
    user_name: Option<String>,
) -> Result<(), CommonError> {
    let user_id = outbound
        .as_user
        .clone()
        .unwrap_or_else(|| "bot".to_string());
    let conversation = Conversation::new(NewConversation {
        id: ts.to_string(),
        tenant_id: tenant.id.clone(),
        channel_id: outbound.channel.clone(),
        channel_name: None,
        content: outbound.text.clone(),
        user_id: user_id.clone(),
        user_name,
        thread_ts: outbound.thread_ts.clone(),
    });
    ctx.repository().create_conversation(&conversation).await?;

    if let Some(thread_ts) = &outbound.thread_ts {
        if let Some(mut parent) = ctx
            .repository()
            .get_conversation(&tenant.id, thread_ts)
            .await?
        {
            let reply = ThreadReply {
                ts: ts.to_string(),
                user: user_id,
                text: outbound.text.clone(),
                event_type: "message".to_string(),
                subtype: None,
                thread_ts: thread_ts.clone(),
            };
            if parent.append_thread_reply(reply.clone()) {
                ctx.repository().save_conversation(&parent).await?;
            }
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
            return Ok(());
        }
    }

    ctx.sync.broadcaster.publish(
        &tenant.id,
        StreamEvent::new(
            StreamEventKind::NewMessage,
            serde_json::to_value(&conversation)?,
        ),
    );
    Ok(())
}

/// Add an emoji reaction under the bot identity.
pub async fn send_reaction(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    channel: &str,
    ts: &str,
    emoji: &str,
) -> Result<(), CommonError> {
    let bot_token = tenant.bot_token().ok_or_else(|| CommonError::InvalidRequest {
        msg: "tenant has no workspace connected".to_string(),
        source: None,
    })?;
    ctx.slack
        .add_reaction(bot_token, channel, ts, emoji)
        .await
        .map_err(|e| CommonError::Upstream {
            msg: "failed to add reaction".to_string(),
            source: Some(anyhow::Error::new(e)),
        })
}

/// Whether a user's stored token is still accepted by Slack.
///
/// Local expiry is checked first; only a locally-plausible token spends an
/// auth.test call. Any token that fails the check is cleaned up on the spot
/// so a dead credential never lingers in the store.
pub async fn check_token_valid(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    slack_user_id: &str,
) -> Result<bool, CommonError> {
    let Some(user) = ctx.repository().get_slack_user(&tenant.id, slack_user_id).await? else {
        return Ok(false);
    };
    if user.user_token.is_none() {
        return Ok(false);
    }
    if !user.has_valid_token() {
        cleanup_user_token(ctx, tenant, slack_user_id).await?;
        return Ok(false);
    }
    let token = user.user_token.as_deref().unwrap_or_default();
    let valid = ctx
        .slack
        .auth_test(token)
        .await
        .map_err(|e| CommonError::Upstream {
            msg: "token validity check failed".to_string(),
            source: Some(anyhow::Error::new(e)),
        })?;
    if !valid {
        warn!(
            tenant_id = %tenant.id,
            slack_user_id = %slack_user_id,
            "Stored user token no longer accepted; cleaning up"
        );
        cleanup_user_token(ctx, tenant, slack_user_id).await?;
    }
    Ok(valid)
}

/// Revoke and forget a user's token.
///
/// Remote revocation is best-effort; the local credential triple is cleared
/// unconditionally so a failed revoke can't leave a token in circulation
/// locally.
pub async fn cleanup_user_token(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    slack_user_id: &str,
) -> Result<SlackUser, CommonError> {
    let mut user = ctx
        .repository()
        .get_slack_user(&tenant.id, slack_user_id)
        .await?
        .ok_or_else(|| CommonError::NotFound {
            msg: "slack user not found".to_string(),
            lookup_id: slack_user_id.to_string(),
            source: None,
        })?;

    if let Some(token) = user.user_token.as_deref() {
        if let Err(e) = ctx.slack.revoke_token(token).await {
            warn!(
                tenant_id = %tenant.id,
                slack_user_id = %slack_user_id,
                error = %e,
                "Remote token revocation failed; clearing locally anyway"
            );
        }
    }

    user.clear_token();
    ctx.repository().save_slack_user(&user).await?;
    info!(tenant_id = %tenant.id, slack_user_id = %slack_user_id, "User token cleaned up");

    ctx.sync.broadcaster.publish(
        &tenant.id,
        StreamEvent::new(
            StreamEventKind::UserTokensRevoked,
            serde_json::json!({ "slack_user_id": slack_user_id }),
        ),
    );
    Ok(user)
}

/// Disconnect a tenant's workspace: revoke the bot token (best-effort),
/// purge synced data, and clear the platform config.
pub async fn disconnect_tenant(ctx: &SlackSyncService, tenant: &Tenant) -> Result<(), CommonError> {
    if let Some(bot_token) = tenant.bot_token() {
        if let Err(e) = ctx.slack.revoke_token(bot_token).await {
            warn!(
                tenant_id = %tenant.id,
                error = %e,
                "Bot token revocation failed during disconnect"
            );
        }
    }

    ctx.repository().delete_tenant_data(&tenant.id).await?;
    ctx.repository().clear_slack_config(&tenant.id).await?;
    info!(tenant_id = %tenant.id, "Tenant workspace disconnected");

    ctx.sync.broadcaster.publish(
        &tenant.id,
        StreamEvent::new(
            StreamEventKind::AppUninstalled,
            serde_json::json!({ "tenant_id": tenant.id }),
        ),
    );
    trace!(tenant_id = %tenant.id, "Disconnect broadcast sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;
        use std::sync::Arc;

        use crate::logic::testing::FakeSlackApi;
        use conversations::logic::tenant::SlackConfig;
        use conversations::logic::user::{NewSlackUser, SlackUser};
        use conversations::repository::Repository;
        use conversations::service::{SyncService, SyncServiceParams};

        const BOT_TOKEN: &str = "xoxb-bot";
        const USER_TOKEN: &str = "xoxp-user";

        async fn ctx_with_tenant(
            slack: FakeSlackApi,
        ) -> (SlackSyncService, Tenant, Arc<FakeSlackApi>) {
            let sync = Arc::new(SyncService::new(SyncServiceParams {
                repository: Repository::new(),
            }));
            let mut tenant = Tenant::new("t-1", "Acme", "acme");
            tenant.slack_config = Some(SlackConfig {
                bot_token: BOT_TOKEN.to_string(),
                signing_secret: "secret".to_string(),
                team_id: "T1".to_string(),
                team_name: None,
                installed_by: None,
            });
            sync.repository.save_tenant(&tenant).await.unwrap();
            let slack = Arc::new(slack);
            (
                SlackSyncService::new(sync, slack.clone()),
                tenant,
                slack,
            )
        }

        async fn seed_user(ctx: &SlackSyncService, token: Option<&str>) {
            let mut user = SlackUser::from_profile(
                "t-1",
                "U1",
                NewSlackUser {
                    real_name: Some("Ada".to_string()),
                    profile_image: Some("https://img/ada.png".to_string()),
                    ..Default::default()
                },
            );
            user.user_token = token.map(String::from);
            ctx.repository().create_slack_user(&user).await.unwrap();
        }

        fn outbound(as_user: Option<&str>) -> OutboundMessage {
            OutboundMessage {
                channel: "C1".to_string(),
                text: "from the dashboard".to_string(),
                thread_ts: None,
                as_user: as_user.map(String::from),
            }
        }

        #[tokio::test]
        async fn test_valid_user_token_posts_without_overrides() {
            let (ctx, tenant, fake) = ctx_with_tenant(FakeSlackApi::new()).await;
            seed_user(&ctx, Some(USER_TOKEN)).await;

            let outcome = post_outbound(&ctx, &tenant, outbound(Some("U1"))).await.unwrap();
            assert!(outcome.ok);
            assert!(outcome.posted_as_user);

            let posted = fake.posted();
            assert_eq!(posted.len(), 1);
            assert_eq!(posted[0].0, USER_TOKEN);
            assert!(posted[0].1.username.is_none());
            assert!(posted[0].1.icon_url.is_none());
        }

        #[tokio::test]
        async fn test_rejected_user_token_falls_back_to_bot_with_overrides() {
            let (ctx, tenant, fake) =
                ctx_with_tenant(FakeSlackApi::new().rejecting_token(USER_TOKEN)).await;
            seed_user(&ctx, Some(USER_TOKEN)).await;

            let outcome = post_outbound(&ctx, &tenant, outbound(Some("U1"))).await.unwrap();
            assert!(outcome.ok);
            assert!(!outcome.posted_as_user);
            assert_eq!(outcome.user_name.as_deref(), Some("Ada"));

            let posted = fake.posted();
            assert_eq!(posted.len(), 2);
            assert_eq!(posted[1].0, BOT_TOKEN);
            assert_eq!(posted[1].1.username.as_deref(), Some("Ada"));
            assert_eq!(posted[1].1.icon_url.as_deref(), Some("https://img/ada.png"));
        }

        #[tokio::test]
        async fn test_user_without_token_goes_straight_to_bot() {
            let (ctx, tenant, fake) = ctx_with_tenant(FakeSlackApi::new()).await;
            seed_user(&ctx, None).await;

            let outcome = post_outbound(&ctx, &tenant, outbound(Some("U1"))).await.unwrap();
            assert!(outcome.ok);
            assert!(!outcome.posted_as_user);
            let posted = fake.posted();
            assert_eq!(posted.len(), 1);
            assert_eq!(posted[0].0, BOT_TOKEN);
            assert!(posted[0].1.username.is_none());
            assert!(posted[0].1.icon_url.is_none());
        }

        #[tokio::test]
        async fn test_expired_token_skips_user_tier_and_omits_overrides() {
            let (ctx, tenant, fake) = ctx_with_tenant(FakeSlackApi::new()).await;
            seed_user(&ctx, Some(USER_TOKEN)).await;
            let mut user = ctx
                .repository()
                .get_slack_user("t-1", "U1")
                .await
                .unwrap()
                .unwrap();
            user.token_expires_at =
                Some(shared::primitives::WrappedChronoDateTime::new(
                    chrono::Utc::now() - chrono::Duration::hours(1),
                ));
            ctx.repository().save_slack_user(&user).await.unwrap();

            let outcome = post_outbound(&ctx, &tenant, outbound(Some("U1"))).await.unwrap();
            assert!(outcome.ok);
            assert!(!outcome.posted_as_user);

            let posted = fake.posted();
            assert_eq!(posted.len(), 1);
            assert_eq!(posted[0].0, BOT_TOKEN);
            assert!(posted[0].1.username.is_none());
            assert!(posted[0].1.icon_url.is_none());
        }

        #[tokio::test]
        async fn test_sent_message_is_stored_and_broadcast() {
            let (ctx, tenant, _) = ctx_with_tenant(FakeSlackApi::new()).await;
            let mut sub = ctx.sync.broadcaster.subscribe("t-1");
            sub.recv().await.unwrap();

            let outcome = post_outbound(&ctx, &tenant, outbound(None)).await.unwrap();
            let ts = outcome.message_ts.unwrap();
            assert!(
                ctx.repository()
                    .get_conversation("t-1", &ts)
                    .await
                    .unwrap()
                    .is_some()
            );
            assert_eq!(
                sub.recv().await.unwrap().kind,
                StreamEventKind::NewMessage
            );
        }

        #[tokio::test]
        async fn test_outbound_reply_maintains_dual_view() {
            let (ctx, tenant, _) = ctx_with_tenant(FakeSlackApi::new()).await;
            let parent = Conversation::new(NewConversation {
                id: "100.000".to_string(),
                tenant_id: "t-1".to_string(),
                channel_id: "C1".to_string(),
                channel_name: None,
                content: "root".to_string(),
                user_id: "U9".to_string(),
                user_name: None,
                thread_ts: None,
            });
            ctx.repository().create_conversation(&parent).await.unwrap();

            let mut reply = outbound(None);
            reply.thread_ts = Some("100.000".to_string());
            let outcome = post_outbound(&ctx, &tenant, reply).await.unwrap();

            let parent = ctx
                .repository()
                .get_conversation("t-1", "100.000")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(parent.thread_replies.len(), 1);
            assert_eq!(parent.thread_replies[0].ts, outcome.message_ts.unwrap());
        }

        #[tokio::test]
        async fn test_bot_rejection_reported_in_outcome() {
            let (ctx, tenant, _) =
                ctx_with_tenant(FakeSlackApi::new().rejecting_token(BOT_TOKEN)).await;

            let outcome = post_outbound(&ctx, &tenant, outbound(None)).await.unwrap();
            assert!(!outcome.ok);
            assert_eq!(outcome.error.as_deref(), Some("invalid_auth"));
        }

        #[tokio::test]
        async fn test_check_token_valid_consults_platform() {
            let (ctx, tenant, _) =
                ctx_with_tenant(FakeSlackApi::new().with_valid_token(USER_TOKEN)).await;
            seed_user(&ctx, Some(USER_TOKEN)).await;
            assert!(check_token_valid(&ctx, &tenant, "U1").await.unwrap());
            assert!(!check_token_valid(&ctx, &tenant, "U-missing").await.unwrap());
        }

        #[tokio::test]
        async fn test_failed_check_cleans_up_stored_token() {
            // auth.test rejects every token by default.
            let (ctx, tenant, fake) = ctx_with_tenant(FakeSlackApi::new()).await;
            seed_user(&ctx, Some(USER_TOKEN)).await;

            assert!(!check_token_valid(&ctx, &tenant, "U1").await.unwrap());

            let stored = ctx
                .repository()
                .get_slack_user("t-1", "U1")
                .await
                .unwrap()
                .unwrap();
            assert!(stored.user_token.is_none());
            assert!(fake.revoked().contains(&USER_TOKEN.to_string()));
        }

        #[tokio::test]
        async fn test_cleanup_clears_locally_even_when_revoke_fails() {
            let (ctx, tenant, _) =
                ctx_with_tenant(FakeSlackApi::new().rejecting_token(USER_TOKEN)).await;
            seed_user(&ctx, Some(USER_TOKEN)).await;

            let user = cleanup_user_token(&ctx, &tenant, "U1").await.unwrap();
            assert!(user.user_token.is_none());
            let stored = ctx
                .repository()
                .get_slack_user("t-1", "U1")
                .await
                .unwrap()
                .unwrap();
            assert!(stored.user_token.is_none());
        }

        #[tokio::test]
        async fn test_disconnect_purges_data_and_config() {
            let (ctx, tenant, fake) = ctx_with_tenant(FakeSlackApi::new()).await;
            seed_user(&ctx, None).await;
            post_outbound(&ctx, &tenant, outbound(None)).await.unwrap();

            disconnect_tenant(&ctx, &tenant).await.unwrap();

            assert!(fake.revoked().contains(&BOT_TOKEN.to_string()));
            let rows = ctx.repository().list_conversations("t-1", 10).await.unwrap();
            assert!(rows.is_empty());
            assert!(
                ctx.repository()
                    .get_slack_user("t-1", "U1")
                    .await
                    .unwrap()
                    .is_none()
            );
            let tenant = ctx.sync.require_tenant("t-1").await.unwrap();
            assert!(tenant.slack_config.is_none());
        }
    }
}
