//! Router layer for the conversations crate
//! Contains the dashboard read endpoints: conversation listing and the live
//! event stream

pub mod conversations;

use std::sync::Arc;
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa_axum::router::OpenApiRouter;

use crate::service::SyncService;

pub const PATH_PREFIX: &str = "/api";
pub const API_VERSION_1: &str = "v1";
pub const SERVICE_ROUTE_KEY: &str = "conversations";

/// Create the combined conversations router
pub fn create_router() -> OpenApiRouter<Arc<SyncService>> {
    OpenApiRouter::new().merge(conversations::create_router())
}

/// Get the combined OpenAPI spec for the conversations crate
pub fn get_openapi_spec() -> OpenApiDoc {
    let (_, spec) = conversations::create_router().split_for_parts();
    spec
}
