//! Slack webhook ingress
//!
//! Receives Events API deliveries, authenticates them, and reconciles them
//! into the store before acknowledging. The body is taken as the raw string
//! Slack sent: the signature covers those exact bytes, so envelope
//! deserialization happens after (and the challenge short-circuit before)
//! any verification.
//!
//! Two ingress shapes are exposed: a tenant-scoped path for per-tenant
//! webhook URLs, and a global path that resolves the tenant from the
//! payload's workspace id for single-URL Slack app installs.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use http::HeaderMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shared::adapters::openapi::API_VERSION_TAG;
use shared::error::CommonError;
use tracing::{trace, warn};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use super::{API_VERSION_1, PATH_PREFIX, SERVICE_ROUTE_KEY};
use crate::SlackSyncService;
use crate::logic::{ingest, verify};
use crate::types::{ClassifiedEvent, SlackEventEnvelope, classify};
use conversations::logic::tenant::Tenant;
use conversations::repository::TenantRepositoryLike;

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Response for Slack URL verification challenge
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct UrlVerificationResponse {
    pub challenge: String,
}

/// Acknowledgement body for processed events
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Create the webhook router
pub fn create_router() -> OpenApiRouter<Arc<SlackSyncService>> {
    OpenApiRouter::new()
        .routes(routes!(route_tenant_events))
        .routes(routes!(route_global_events))
}

#[utoipa::path(
    post,
    path = format!("{}/{}/{}/{{tenant_id}}/events", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    params(
        ("tenant_id" = String, Path, description = "Tenant ID"),
    ),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Bad Request", body = CommonError),
        (status = 401, description = "Unauthorized", body = CommonError),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "Tenant-scoped Slack events webhook",
    description = "Receives Slack Events API deliveries for one tenant: echoes URL verification \
                   challenges, verifies request signatures against the tenant's signing secret, \
                   and syncs message and reaction events.",
    operation_id = "slack-tenant-events",
)]
async fn route_tenant_events(
    State(ctx): State<Arc<SlackSyncService>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, CommonError> {
    trace!(tenant_id = %tenant_id, "Received Slack webhook");
    let envelope = match parse_envelope(&body)? {
        SlackEventEnvelope::UrlVerification { challenge, .. } => {
            trace!("Responding to Slack URL verification challenge");
            return Ok(Json(UrlVerificationResponse { challenge }).into_response());
        }
        envelope => envelope,
    };

    let tenant = ctx.sync.require_tenant(&tenant_id).await?;
    process_verified(&ctx, &tenant, &headers, &body, envelope).await
}

#[utoipa::path(
    post,
    path = format!("{}/{}/{}/events", PATH_PREFIX, SERVICE_ROUTE_KEY, API_VERSION_1),
    tags = [SERVICE_ROUTE_KEY, API_VERSION_TAG],
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Bad Request", body = CommonError),
        (status = 401, description = "Unauthorized", body = CommonError),
        (status = 404, description = "Not Found", body = CommonError),
        (status = 500, description = "Internal Server Error", body = CommonError),
    ),
    summary = "Global Slack events webhook",
    description = "Single-URL ingress for Slack app installs: resolves the tenant from the \
                   payload's team_id, then verifies and syncs like the tenant-scoped route.",
    operation_id = "slack-global-events",
)]
async fn route_global_events(
    State(ctx): State<Arc<SlackSyncService>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, CommonError> {
    trace!("Received Slack webhook on global ingress");
    let envelope = match parse_envelope(&body)? {
        SlackEventEnvelope::UrlVerification { challenge, .. } => {
            trace!("Responding to Slack URL verification challenge");
            return Ok(Json(UrlVerificationResponse { challenge }).into_response());
        }
        envelope => envelope,
    };

    let team_id = envelope_team_id(&envelope).ok_or_else(|| CommonError::InvalidRequest {
        msg: "payload carries no team_id".to_string(),
        source: None,
    })?;
    let tenant = ctx
        .repository()
        .get_tenant_by_team_id(team_id)
        .await?
        .ok_or_else(|| CommonError::NotFound {
            msg: "no tenant connected to this workspace".to_string(),
            lookup_id: team_id.to_string(),
            source: None,
        })?;
    process_verified(&ctx, &tenant, &headers, &body, envelope).await
}

// --- Logic Functions ---

fn parse_envelope(body: &str) -> Result<SlackEventEnvelope, CommonError> {
    serde_json::from_str(body).map_err(|e| CommonError::InvalidRequest {
        msg: "payload is not a Slack events envelope".to_string(),
        source: Some(e.into()),
    })
}

fn envelope_team_id(envelope: &SlackEventEnvelope) -> Option<&str> {
    match envelope {
        SlackEventEnvelope::EventCallback { team_id, .. }
        | SlackEventEnvelope::AppRateLimited { team_id, .. } => Some(team_id),
        SlackEventEnvelope::UrlVerification { .. } => None,
    }
}

/// Authenticate the delivery against the tenant's signing secret, then apply
/// it to the store.
async fn process_verified(
    ctx: &SlackSyncService,
    tenant: &Tenant,
    headers: &HeaderMap,
    body: &str,
    envelope: SlackEventEnvelope,
) -> Result<Response, CommonError> {
    // A tenant with no workspace connected has nothing to verify against;
    // indistinguishable from an absent tenant.
    let signing_secret = tenant.signing_secret().ok_or_else(|| CommonError::NotFound {
        msg: "tenant has no workspace connected".to_string(),
        lookup_id: tenant.id.clone(),
        source: None,
    })?;

    let timestamp = header_str(headers, TIMESTAMP_HEADER);
    let signature = header_str(headers, SIGNATURE_HEADER);
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        warn!(tenant_id = %tenant.id, "Webhook missing signature headers");
        return Err(CommonError::InvalidRequest {
            msg: "missing signature headers".to_string(),
            source: None,
        });
    };

    if !verify::verify_signature(signing_secret, timestamp, body, signature) {
        warn!(tenant_id = %tenant.id, "Webhook signature verification failed");
        return Err(CommonError::Authentication {
            msg: "signature verification failed".to_string(),
            source: None,
        });
    }

    let classified = classify(envelope);
    if matches!(classified, ClassifiedEvent::Ignored) {
        trace!(tenant_id = %tenant.id, "Ignoring out-of-scope event");
        return Ok(Json(WebhookAck::ok()).into_response());
    }

    ingest::handle_event(ctx, tenant, classified).await?;
    Ok(Json(WebhookAck::ok()).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
