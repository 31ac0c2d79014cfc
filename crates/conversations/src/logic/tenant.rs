//! Tenant domain model
//!
//! A tenant maps 1:1 to one connected platform workspace. Until a workspace
//! install populates `slack_config`, the tenant can neither receive nor send
//! platform events.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shared::primitives::WrappedChronoDateTime;
use utoipa::ToSchema;

/// Platform credentials held per tenant once a workspace is connected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SlackConfig {
    /// Bot token (xoxb-) used for workspace-level API calls.
    pub bot_token: String,
    /// Shared secret for authenticating inbound webhook payloads.
    pub signing_secret: String,
    /// The platform workspace ("team") this tenant is bound to.
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    /// Cleared in full on disconnect; never partially populated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_config: Option<SlackConfig>,
    pub is_active: bool,
    pub created_at: WrappedChronoDateTime,
    pub updated_at: WrappedChronoDateTime,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = WrappedChronoDateTime::now();
        Self {
            id: id.into(),
            name: name.into(),
            slug: slug.into(),
            slack_config: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The signing secret, if this tenant is configured to receive events.
    pub fn signing_secret(&self) -> Option<&str> {
        self.slack_config
            .as_ref()
            .map(|config| config.signing_secret.as_str())
    }

    /// The bot token, if this tenant is configured to send.
    pub fn bot_token(&self) -> Option<&str> {
        self.slack_config
            .as_ref()
            .map(|config| config.bot_token.as_str())
    }
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;

        #[test]
        fn test_unconfigured_tenant_has_no_credentials() {
            let tenant = Tenant::new("t-1", "Acme", "acme");
            assert!(tenant.signing_secret().is_none());
            assert!(tenant.bot_token().is_none());
        }

        #[test]
        fn test_configured_tenant_exposes_credentials() {
            let mut tenant = Tenant::new("t-1", "Acme", "acme");
            tenant.slack_config = Some(SlackConfig {
                bot_token: "xoxb-1".to_string(),
                signing_secret: "secret".to_string(),
                team_id: "T123".to_string(),
                team_name: None,
                installed_by: None,
            });
            assert_eq!(tenant.signing_secret(), Some("secret"));
            assert_eq!(tenant.bot_token(), Some("xoxb-1"));
        }
    }
}
