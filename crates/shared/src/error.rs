use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use utoipa::{PartialSchema, ToSchema};

pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug, Serialize)]
pub enum CommonError {
    #[error("request is not authenticated.")]
    Authentication {
        msg: String,
        #[serde(skip)]
        #[source]
        source: Option<anyhow::Error>,
    },
    #[error("could not find resource")]
    NotFound {
        msg: String,
        lookup_id: String,
        #[serde(skip)]
        #[source]
        source: Option<anyhow::Error>,
    },
    #[error("invalid request")]
    InvalidRequest {
        msg: String,
        #[serde(skip)]
        #[source]
        source: Option<anyhow::Error>,
    },
    #[error("upstream platform call failed")]
    Upstream {
        msg: String,
        #[serde(skip)]
        #[source]
        source: Option<anyhow::Error>,
    },
    #[error("repository error")]
    Repository {
        msg: String,
        #[serde(skip)]
        #[source]
        source: Option<anyhow::Error>,
    },
    #[error("serde json error")]
    SerdeSerializationError {
        #[serde(skip)]
        #[from]
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown error")]
    Unknown(
        #[serde(skip)]
        #[from]
        anyhow::Error,
    ),
}

impl IntoResponse for CommonError {
    fn into_response(self) -> Response {
        let status = match self {
            CommonError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            CommonError::NotFound { .. } => StatusCode::NOT_FOUND,
            CommonError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            CommonError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            CommonError::Repository { .. }
            | CommonError::SerdeSerializationError { .. }
            | CommonError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            name: match self {
                CommonError::Authentication { .. } => "Authentication",
                CommonError::NotFound { .. } => "NotFound",
                CommonError::InvalidRequest { .. } => "InvalidRequest",
                CommonError::Upstream { .. } => "Upstream",
                CommonError::Repository { .. } => "Repository",
                CommonError::SerdeSerializationError { .. } => "InternalServerError",
                CommonError::Unknown(_) => "InternalServerError",
            }
            .to_string(),
            // Variant display strings only; messages with internal detail
            // (signatures, tokens) are never placed in `msg` by callers.
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl ToSchema for CommonError {
    fn name() -> std::borrow::Cow<'static, str> {
        std::borrow::Cow::Borrowed("Error")
    }

    fn schemas(
        _schemas: &mut Vec<(
            String,
            utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
        )>,
    ) {
        // nothing by default
    }
}

impl PartialSchema for CommonError {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        utoipa::openapi::ObjectBuilder::new()
            .property(
                "name",
                utoipa::openapi::ObjectBuilder::new()
                    .schema_type(utoipa::openapi::schema::Type::String),
            )
            .required("name")
            .property(
                "message",
                utoipa::openapi::ObjectBuilder::new()
                    .schema_type(utoipa::openapi::schema::Type::String),
            )
            .required("message")
            .into()
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    name: String,
    message: String,
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;

        #[test]
        fn test_not_found_maps_to_404() {
            let err = CommonError::NotFound {
                msg: "tenant missing".to_string(),
                lookup_id: "t-1".to_string(),
                source: None,
            };
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[test]
        fn test_authentication_maps_to_401() {
            let err = CommonError::Authentication {
                msg: "bad signature".to_string(),
                source: None,
            };
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        #[test]
        fn test_upstream_maps_to_502() {
            let err = CommonError::Upstream {
                msg: "slack api error".to_string(),
                source: None,
            };
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }

        #[test]
        fn test_display_does_not_leak_msg_detail() {
            let err = CommonError::Authentication {
                msg: "computed=v0=deadbeef".to_string(),
                source: None,
            };
            assert!(!err.to_string().contains("deadbeef"));
        }
    }
}
