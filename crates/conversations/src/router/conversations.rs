//! Conversation dashboard HTTP endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseFrame, Sse};
use futures::Stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::trace;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{API_VERSION_1, PATH_PREFIX, SERVICE_ROUTE_KEY};
use crate::{
    logic::{
        conversation::Conversation,
        event::StreamEvent,
        user::SafeSlackUser,
    },
    repository::{ConversationRepositoryLike, Repository, SlackUserRepositoryLike},
    service::SyncService,
};
use shared::{
    adapters::openapi::{API_VERSION_TAG, JsonResponse},
    error::CommonError,
    primitives::WrappedChronoDateTime,
};

/// Dashboards poll rarely; anything older than the latest page is fetched
/// through history backfill instead.
const CONVERSATION_PAGE_SIZE: usize = 50;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Create the conversations dashboard router
pub fn create_router() -> OpenApiRouter<Arc<SyncService>> {
    OpenApiRouter::new()
        .routes(routes!(route_list_conversations))
        .routes(routes!(route_stream_conversations))
}

/// A conversation joined with the directory entry of its author, token
/// material redacted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ConversationWithUser {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_user: Option<SafeSlackUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationWithUser>,
    pub last_updated: WrappedChronoDateTime,
}

#[utoipa::path(
    get,
    path = format!("{}/{}/{}/{{tenant_id}}", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
    ),
    responses(
        (status = 200, description = "List conversations", body = ConversationsResponse),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "List conversations",
    description = "Latest synced conversations for a tenant, newest first, joined with author directory entries",
    operation_id = "list-conversations",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_list_conversations(
    State(ctx): State<Arc<SyncService>>,
    Path(tenant_id): Path<String>,
) -> JsonResponse<ConversationsResponse, CommonError> {
    trace!(tenant_id = %tenant_id, "Listing conversations");
    let res = list_conversations(&ctx, &tenant_id).await;
    trace!(success = res.is_ok(), "Listing conversations completed");
    JsonResponse::from(res)
}

#[utoipa::path(
    get,
    path = format!("{}/{}/{}/{{tenant_id}}/stream", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
    ),
    responses(
        (status = 200, description = "Live conversation event stream", content_type = "text/event-stream"),
        (status = 404, description = "Not Found", body = CommonError),
    ),
    summary = "Stream conversation events",
    description = "Server-sent events for a tenant: connected handshake, sync updates, and periodic heartbeats",
    operation_id = "stream-conversations",
    security(
        (),
        ("api_key" = []),
        ("bearer_token" = [])
    )
)]
async fn route_stream_conversations(
    State(ctx): State<Arc<SyncService>>,
    Path(tenant_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseFrame, axum::Error>>>, CommonError> {
    ctx.require_tenant(&tenant_id).await?;
    trace!(tenant_id = %tenant_id, "Subscriber connected to conversation stream");

    let subscription = ctx.broadcaster.subscribe(&tenant_id);
    let heartbeats = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
        HEARTBEAT_INTERVAL,
    ))
    .map(|_| StreamEvent::heartbeat());

    // The subscription unregisters itself when the client disconnects and
    // axum drops the stream.
    let stream = subscription
        .merge(heartbeats)
        .map(|event| SseFrame::default().json_data(&event));
    Ok(Sse::new(stream))
}

// --- Logic Functions ---

/// Latest conversations for a tenant, each joined with its author's redacted
/// directory entry. Missing directory rows leave `slack_user` unset instead
/// of failing the listing.
async fn list_conversations(
    ctx: &SyncService,
    tenant_id: &str,
) -> Result<ConversationsResponse, CommonError> {
    ctx.require_tenant(tenant_id).await?;
    let conversations = ctx
        .repository
        .list_conversations(tenant_id, CONVERSATION_PAGE_SIZE)
        .await?;

    let mut joined = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let slack_user = lookup_author(&ctx.repository, tenant_id, &conversation.user_id).await?;
        joined.push(ConversationWithUser {
            conversation,
            slack_user,
        });
    }

    Ok(ConversationsResponse {
        conversations: joined,
        last_updated: WrappedChronoDateTime::now(),
    })
}

async fn lookup_author(
    repository: &Repository,
    tenant_id: &str,
    user_id: &str,
) -> Result<Option<SafeSlackUser>, CommonError> {
    let user = repository.get_slack_user(tenant_id, user_id).await?;
    Ok(user.map(|user| user.redacted()))
}
