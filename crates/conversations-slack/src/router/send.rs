//! Outbound send, disconnect, and user admin HTTP endpoints

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::trace;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{API_VERSION_1, PATH_PREFIX, SERVICE_ROUTE_KEY};
use crate::SlackSyncService;
use crate::logic::gateway::{
    self, OutboundMessage, PostOutcome, check_token_valid, cleanup_user_token, disconnect_tenant,
};
use conversations::logic::user::SafeSlackUser;
use conversations::repository::{SlackUserFilter, SlackUserRepositoryLike};
use shared::{
    adapters::openapi::{API_VERSION_TAG, JsonResponse},
    error::CommonError,
    primitives::WrappedChronoDateTime,
};

/// Create the send/admin router
pub fn create_router() -> OpenApiRouter<Arc<SlackSyncService>> {
    OpenApiRouter::new()
        .routes(routes!(route_send))
        .routes(routes!(route_disconnect))
        .routes(routes!(route_list_users))
        .routes(routes!(route_update_user))
        .routes(routes!(route_token_status))
}

/// Outbound actions the dashboard can request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SendRequest {
    /// Post a root message to a channel.
    PostMessage {
        channel: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        as_user: Option<String>,
    },
    /// Reply into an existing thread.
    Reply {
        channel: String,
        text: String,
        thread_ts: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        as_user: Option<String>,
    },
    /// Add an emoji reaction under the bot identity.
    AddReaction {
        channel: String,
        ts: String,
        emoji: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct DisconnectRequest {
    /// Must be true; disconnecting purges all synced data for the tenant.
    pub confirm_disconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct DisconnectResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub include_inactive: bool,
    /// Case-insensitive match against name or email.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ListUsersResponse {
    pub users: Vec<SafeSlackUser>,
    /// Whole-directory counts, independent of the listing filter.
    pub stats: UserDirectoryStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct UserDirectoryStats {
    pub total: usize,
    pub active: usize,
    pub with_token: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Revoke and forget the user's token as part of the update.
    #[serde(default)]
    pub revoke_token: bool,
    /// Install a user token on the directory entry (e.g. pasted from an
    /// OAuth grant).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<WrappedChronoDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct TokenStatusResponse {
    pub valid: bool,
}

#[utoipa::path(
    post,
    path = format!("{}/{}/{}/{{tenant_id}}/send", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
    ),
    request_body = SendRequest,
    responses(
        (status = 200, description = "Send outcome", body = PostOutcome),
        (status = 400, description = "Bad Request", body = CommonError),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 502, description = "Upstream platform failure", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "Send into Slack",
    description = "Deliver a dashboard-originated message, thread reply, or reaction into the \
                   tenant's workspace, acting as the user when their token allows it",
    operation_id = "slack-send",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_send(
    State(ctx): State<Arc<SlackSyncService>>,
    Path(tenant_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> JsonResponse<PostOutcome, CommonError> {
    trace!(tenant_id = %tenant_id, "Sending into Slack");
    let res = send(&ctx, &tenant_id, request).await;
    trace!(success = res.is_ok(), "Sending into Slack completed");
    JsonResponse::from(res)
}

#[utoipa::path(
    post,
    path = format!("{}/{}/{}/{{tenant_id}}/disconnect", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
    ),
    request_body = DisconnectRequest,
    responses(
        (status = 200, description = "Workspace disconnected", body = DisconnectResponse),
        (status = 400, description = "Bad Request", body = CommonError),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "Disconnect workspace",
    description = "Revoke the bot token, purge the tenant's synced conversations and users, and \
                   clear its Slack configuration",
    operation_id = "slack-disconnect",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_disconnect(
    State(ctx): State<Arc<SlackSyncService>>,
    Path(tenant_id): Path<String>,
    Json(request): Json<DisconnectRequest>,
) -> JsonResponse<DisconnectResponse, CommonError> {
    trace!(tenant_id = %tenant_id, "Disconnecting workspace");
    let res = disconnect(&ctx, &tenant_id, request).await;
    trace!(success = res.is_ok(), "Disconnecting workspace completed");
    JsonResponse::from(res)
}

#[utoipa::path(
    get,
    path = format!("{}/{}/{}/{{tenant_id}}/users", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
        ListUsersQuery,
    ),
    responses(
        (status = 200, description = "Directory listing", body = ListUsersResponse),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "List Slack users",
    description = "Tenant's user directory with token material redacted",
    operation_id = "slack-list-users",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_list_users(
    State(ctx): State<Arc<SlackSyncService>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListUsersQuery>,
) -> JsonResponse<ListUsersResponse, CommonError> {
    trace!(tenant_id = %tenant_id, "Listing Slack users");
    let res = list_users(&ctx, &tenant_id, query).await;
    trace!(success = res.is_ok(), "Listing Slack users completed");
    JsonResponse::from(res)
}

#[utoipa::path(
    patch,
    path = format!("{}/{}/{}/{{tenant_id}}/users/{{user_id}}", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
        ("user_id" = String, Path, description = "Slack user ID"),
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated directory entry", body = SafeSlackUser),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "Update Slack user",
    description = "Toggle a directory entry's active flag and optionally revoke its token",
    operation_id = "slack-update-user",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_update_user(
    State(ctx): State<Arc<SlackSyncService>>,
    Path((tenant_id, user_id)): Path<(String, String)>,
    Json(request): Json<UpdateUserRequest>,
) -> JsonResponse<SafeSlackUser, CommonError> {
    trace!(tenant_id = %tenant_id, user_id = %user_id, "Updating Slack user");
    let res = update_user(&ctx, &tenant_id, &user_id, request).await;
    trace!(success = res.is_ok(), "Updating Slack user completed");
    JsonResponse::from(res)
}

#[utoipa::path(
    get,
    path = format!("{}/{}/{}/{{tenant_id}}/users/{{user_id}}/token", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
        ("user_id" = String, Path, description = "Slack user ID"),
    ),
    responses(
        (status = 200, description = "Token status", body = TokenStatusResponse),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 502, description = "Upstream platform failure", body = CommonError),
    ),
    summary = "Check user token",
    description = "Whether the user's stored token is still accepted by Slack",
    operation_id = "slack-token-status",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_token_status(
    State(ctx): State<Arc<SlackSyncService>>,
    Path((tenant_id, user_id)): Path<(String, String)>,
) -> JsonResponse<TokenStatusResponse, CommonError> {
    trace!(tenant_id = %tenant_id, user_id = %user_id, "Checking token status");
    let res = token_status(&ctx, &tenant_id, &user_id).await;
    trace!(success = res.is_ok(), "Checking token status completed");
    JsonResponse::from(res)
}

// --- Logic Functions ---

async fn send(
    ctx: &SlackSyncService,
    tenant_id: &str,
    request: SendRequest,
) -> Result<PostOutcome, CommonError> {
    let tenant = ctx.sync.require_tenant(tenant_id).await?;
    match request {
        SendRequest::PostMessage {
            channel,
            text,
            as_user,
        } => {
            gateway::post_outbound(
                ctx,
                &tenant,
                OutboundMessage {
                    channel,
                    text,
                    thread_ts: None,
                    as_user,
                },
            )
            .await
        }
        SendRequest::Reply {
            channel,
            text,
            thread_ts,
            as_user,
        } => {
            gateway::post_outbound(
                ctx,
                &tenant,
                OutboundMessage {
                    channel,
                    text,
                    thread_ts: Some(thread_ts),
                    as_user,
                },
            )
            .await
        }
        SendRequest::AddReaction { channel, ts, emoji } => {
            gateway::send_reaction(ctx, &tenant, &channel, &ts, &emoji).await?;
            Ok(PostOutcome {
                ok: true,
                message_ts: Some(ts),
                posted_as_user: false,
                user_name: None,
                error: None,
            })
        }
    }
}

async fn disconnect(
    ctx: &SlackSyncService,
    tenant_id: &str,
    request: DisconnectRequest,
) -> Result<DisconnectResponse, CommonError> {
    if !request.confirm_disconnect {
        return Err(CommonError::InvalidRequest {
            msg: "disconnect requires confirm_disconnect".to_string(),
            source: None,
        });
    }
    let tenant = ctx.sync.require_tenant(tenant_id).await?;
    disconnect_tenant(ctx, &tenant).await?;
    Ok(DisconnectResponse { success: true })
}

async fn list_users(
    ctx: &SlackSyncService,
    tenant_id: &str,
    query: ListUsersQuery,
) -> Result<ListUsersResponse, CommonError> {
    ctx.sync.require_tenant(tenant_id).await?;
    let filter = SlackUserFilter {
        include_inactive: query.include_inactive,
        search: query.search,
    };
    let users = ctx.repository().list_slack_users(tenant_id, &filter).await?;

    let everyone = ctx
        .repository()
        .list_slack_users(
            tenant_id,
            &SlackUserFilter {
                include_inactive: true,
                search: None,
            },
        )
        .await?;
    let stats = UserDirectoryStats {
        total: everyone.len(),
        active: everyone.iter().filter(|user| user.is_active).count(),
        with_token: everyone.iter().filter(|user| user.user_token.is_some()).count(),
    };

    Ok(ListUsersResponse {
        users: users.iter().map(|user| user.redacted()).collect(),
        stats,
    })
}

async fn update_user(
    ctx: &SlackSyncService,
    tenant_id: &str,
    user_id: &str,
    request: UpdateUserRequest,
) -> Result<SafeSlackUser, CommonError> {
    let tenant = ctx.sync.require_tenant(tenant_id).await?;

    if request.revoke_token {
        cleanup_user_token(ctx, &tenant, user_id).await?;
    }

    let mut user = ctx
        .repository()
        .get_slack_user(tenant_id, user_id)
        .await?
        .ok_or_else(|| CommonError::NotFound {
            msg: "slack user not found".to_string(),
            lookup_id: user_id.to_string(),
            source: None,
        })?;

    let mut dirty = false;
    if let Some(is_active) = request.is_active {
        user.is_active = is_active;
        dirty = true;
    }
    if let Some(token) = request.user_token {
        user.user_token = Some(token);
        user.scopes = request.scopes;
        user.token_expires_at = request.token_expires_at;
        dirty = true;
    }
    if dirty {
        ctx.repository().save_slack_user(&user).await?;
    }
    Ok(user.redacted())
}

async fn token_status(
    ctx: &SlackSyncService,
    tenant_id: &str,
    user_id: &str,
) -> Result<TokenStatusResponse, CommonError> {
    let tenant = ctx.sync.require_tenant(tenant_id).await?;
    let valid = check_token_valid(ctx, &tenant, user_id).await?;
    Ok(TokenStatusResponse { valid })
}
