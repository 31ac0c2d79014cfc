//! Router layer for the Slack sync provider
//! Webhook ingress plus the outbound send, disconnect, and user admin routes

pub mod send;
pub mod webhook;

use std::sync::Arc;
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa_axum::router::OpenApiRouter;

use crate::SlackSyncService;

pub const PATH_PREFIX: &str = "/api";
pub const API_VERSION_1: &str = "v1";
pub const SERVICE_ROUTE_KEY: &str = "slack";

/// Create the combined Slack router
pub fn create_router() -> OpenApiRouter<Arc<SlackSyncService>> {
    OpenApiRouter::new()
        .merge(webhook::create_router())
        .merge(send::create_router())
}

/// Get the combined OpenAPI spec for the Slack provider
pub fn get_openapi_spec() -> OpenApiDoc {
    let (_, webhook_spec) = webhook::create_router().split_for_parts();
    let (_, send_spec) = send::create_router().split_for_parts();

    let mut spec = webhook_spec;
    spec.merge(send_spec);
    spec
}
