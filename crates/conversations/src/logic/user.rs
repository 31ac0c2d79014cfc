//! Platform-user directory cache
//!
//! One row per `(tenant, platform user)` pair, created the first time a user
//! is observed in an event or completes an OAuth grant, refreshed on every
//! subsequent sighting. The optional `user_token` triple is only ever written
//! by the token-management flows; passive directory lookups never touch it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shared::primitives::WrappedChronoDateTime;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SlackUser {
    /// Composite row id: `"{tenant_id}-{slack_user_id}"`.
    pub id: String,
    pub tenant_id: String,
    pub slack_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_bot: bool,
    pub is_admin: bool,
    pub is_owner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Present only when the user has authorized posting-as-self.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<WrappedChronoDateTime>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<WrappedChronoDateTime>,
    pub created_at: WrappedChronoDateTime,
    pub updated_at: WrappedChronoDateTime,
}

impl SlackUser {
    pub fn composite_id(tenant_id: &str, slack_user_id: &str) -> String {
        format!("{tenant_id}-{slack_user_id}")
    }

    /// Best display label, falling back to the raw platform user id.
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.real_name.as_deref())
            .unwrap_or(&self.slack_user_id)
    }

    pub fn token_expired(&self) -> bool {
        match &self.token_expires_at {
            Some(expires_at) => *expires_at.get_inner() < chrono::Utc::now(),
            None => false,
        }
    }

    /// Whether the cached user token is usable for a posting attempt.
    pub fn has_valid_token(&self) -> bool {
        self.is_active && self.user_token.is_some() && !self.token_expired()
    }

    /// Clear the credential triple in place. The row itself is retained so
    /// the directory cache survives token revocation.
    pub fn clear_token(&mut self) {
        self.user_token = None;
        self.scopes = None;
        self.token_expires_at = None;
    }

    /// API view with the raw token reduced to presence/expiry flags.
    pub fn redacted(&self) -> SafeSlackUser {
        SafeSlackUser {
            id: self.id.clone(),
            slack_user_id: self.slack_user_id.clone(),
            real_name: self.real_name.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            profile_image: self.profile_image.clone(),
            title: self.title.clone(),
            is_bot: self.is_bot,
            is_admin: self.is_admin,
            is_owner: self.is_owner,
            timezone: self.timezone.clone(),
            has_user_token: self.user_token.is_some(),
            token_expired: self.token_expired(),
            scopes: self.scopes.clone().unwrap_or_default(),
            is_active: self.is_active,
            last_seen_at: self.last_seen_at,
            created_at: self.created_at,
        }
    }
}

/// Directory entry as exposed over the API; never carries the raw token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SafeSlackUser {
    pub id: String,
    pub slack_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_bot: bool,
    pub is_admin: bool,
    pub is_owner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub has_user_token: bool,
    pub token_expired: bool,
    pub scopes: Vec<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<WrappedChronoDateTime>,
    pub created_at: WrappedChronoDateTime,
}

/// Profile fields observed from the platform, used to seed a directory row.
#[derive(Debug, Clone, Default)]
pub struct NewSlackUser {
    pub real_name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub profile_image: Option<String>,
    pub title: Option<String>,
    pub is_bot: bool,
    pub is_admin: bool,
    pub is_owner: bool,
    pub timezone: Option<String>,
}

impl SlackUser {
    pub fn from_profile(tenant_id: &str, slack_user_id: &str, profile: NewSlackUser) -> Self {
        let now = WrappedChronoDateTime::now();
        Self {
            id: Self::composite_id(tenant_id, slack_user_id),
            tenant_id: tenant_id.to_string(),
            slack_user_id: slack_user_id.to_string(),
            real_name: profile.real_name,
            display_name: profile.display_name,
            email: profile.email,
            profile_image: profile.profile_image,
            title: profile.title,
            is_bot: profile.is_bot,
            is_admin: profile.is_admin,
            is_owner: profile.is_owner,
            timezone: profile.timezone,
            user_token: None,
            scopes: None,
            token_expires_at: None,
            is_active: true,
            last_seen_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}
