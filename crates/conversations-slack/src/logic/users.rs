//! User directory resolution
//!
//! Cache-first lookup of message authors. A hit only refreshes the
//! last-seen marker; a miss fetches the profile from Slack and seeds a
//! directory row. Lookup failures degrade to an anonymous author instead of
//! failing the event that triggered them.

use conversations::logic::tenant::Tenant;
use conversations::logic::user::{NewSlackUser, SlackUser};
use conversations::repository::{Repository, SlackUserRepositoryLike};
use shared::error::CommonError;
use shared::primitives::WrappedChronoDateTime;
use tracing::{trace, warn};

use crate::logic::client::SlackApi;

/// Resolve a platform user to a directory row, creating one on first
/// sighting.
///
/// `Ok(None)` means the author could not be resolved (no bot token, or the
/// profile fetch failed); callers fall back to the raw user id. Token fields
/// on an existing row are never touched here.
pub async fn get_or_create_slack_user(
    repository: &Repository,
    slack: &dyn SlackApi,
    tenant: &Tenant,
    slack_user_id: &str,
) -> Result<Option<SlackUser>, CommonError> {
    if let Some(mut user) = repository.get_slack_user(&tenant.id, slack_user_id).await? {
        user.last_seen_at = Some(WrappedChronoDateTime::now());
        repository.save_slack_user(&user).await?;
        return Ok(Some(user));
    }

    let Some(bot_token) = tenant.bot_token() else {
        trace!(tenant_id = %tenant.id, "No bot token; skipping user resolution");
        return Ok(None);
    };

    let info = match slack.fetch_user_info(bot_token, slack_user_id).await {
        Ok(info) => info,
        Err(e) => {
            warn!(
                tenant_id = %tenant.id,
                slack_user_id = %slack_user_id,
                error = %e,
                "Failed to fetch user profile"
            );
            return Ok(None);
        }
    };

    let user = SlackUser::from_profile(
        &tenant.id,
        slack_user_id,
        NewSlackUser {
            real_name: info.profile.real_name.or(info.real_name),
            display_name: info.profile.display_name,
            email: info.profile.email,
            profile_image: info.profile.image_192,
            title: info.profile.title,
            is_bot: info.is_bot,
            is_admin: info.is_admin,
            is_owner: info.is_owner,
            timezone: info.tz,
        },
    );
    repository.create_slack_user(&user).await?;
    trace!(
        tenant_id = %tenant.id,
        slack_user_id = %slack_user_id,
        "Created directory entry for new user"
    );
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;
        use crate::logic::testing::FakeSlackApi;
        use conversations::logic::tenant::SlackConfig;
        use conversations::repository::TenantRepositoryLike;
        use crate::types::{SlackUserInfo, SlackUserProfile};

        fn tenant() -> Tenant {
            let mut tenant = Tenant::new("t-1", "Acme", "acme");
            tenant.slack_config = Some(SlackConfig {
                bot_token: "xoxb-1".to_string(),
                signing_secret: "secret".to_string(),
                team_id: "T1".to_string(),
                team_name: None,
                installed_by: None,
            });
            tenant
        }

        #[tokio::test]
        async fn test_cache_miss_fetches_and_creates() {
            let repository = Repository::new();
            repository.save_tenant(&tenant()).await.unwrap();
            let slack = FakeSlackApi::new().with_user(SlackUserInfo {
                id: "U1".to_string(),
                profile: SlackUserProfile {
                    real_name: Some("Ada Lovelace".to_string()),
                    display_name: Some("ada".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            });

            let user = get_or_create_slack_user(&repository, &slack, &tenant(), "U1")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(user.display_name.as_deref(), Some("ada"));
            assert!(repository.get_slack_user("t-1", "U1").await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_cache_hit_refreshes_last_seen_without_touching_token() {
            let repository = Repository::new();
            let mut existing = SlackUser::from_profile("t-1", "U1", NewSlackUser::default());
            existing.user_token = Some("xoxp-1".to_string());
            existing.last_seen_at = None;
            repository.create_slack_user(&existing).await.unwrap();

            // No fetch configured; a hit must not reach for the API.
            let slack = FakeSlackApi::new();
            let user = get_or_create_slack_user(&repository, &slack, &tenant(), "U1")
                .await
                .unwrap()
                .unwrap();
            assert!(user.last_seen_at.is_some());
            assert_eq!(user.user_token.as_deref(), Some("xoxp-1"));
            assert!(slack.user_info_calls() == 0);
        }

        #[tokio::test]
        async fn test_fetch_failure_degrades_to_none() {
            let repository = Repository::new();
            let slack = FakeSlackApi::new(); // knows no users
            let resolved = get_or_create_slack_user(&repository, &slack, &tenant(), "U-unknown")
                .await
                .unwrap();
            assert!(resolved.is_none());
            assert!(
                repository
                    .get_slack_user("t-1", "U-unknown")
                    .await
                    .unwrap()
                    .is_none()
            );
        }
    }
}
