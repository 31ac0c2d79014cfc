//! In-memory repository implementation
//!
//! Backs the repository traits with process-local maps that mimic the
//! semantics the external persistence engine is assumed to provide: durable
//! key-based upsert, simple filtered scans, and atomic single-row save.
//! `updated_at` is refreshed on save, mirroring an update-column trigger.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use shared::{error::CommonError, primitives::WrappedChronoDateTime};
use tracing::trace;

use crate::logic::{conversation::Conversation, tenant::Tenant, user::SlackUser};
use crate::repository::{
    ConversationRepositoryLike, SlackUserFilter, SlackUserRepositoryLike, TenantRepositoryLike,
};

/// Keys are `(tenant_id, row_id)`; tenant partitions are never scanned
/// across.
type TenantScopedKey = (String, String);

#[derive(Clone, Default)]
pub struct Repository {
    tenants: Arc<DashMap<String, Tenant>>,
    conversations: Arc<DashMap<TenantScopedKey, Conversation>>,
    slack_users: Arc<DashMap<TenantScopedKey, SlackUser>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepositoryLike for Repository {
    async fn get_tenant_by_id(&self, id: &str) -> Result<Option<Tenant>, CommonError> {
        Ok(self
            .tenants
            .get(id)
            .filter(|tenant| tenant.is_active)
            .map(|tenant| tenant.clone()))
    }

    async fn get_tenant_by_team_id(&self, team_id: &str) -> Result<Option<Tenant>, CommonError> {
        Ok(self
            .tenants
            .iter()
            .find(|tenant| {
                tenant.is_active
                    && tenant
                        .slack_config
                        .as_ref()
                        .is_some_and(|config| config.team_id == team_id)
            })
            .map(|tenant| tenant.clone()))
    }

    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), CommonError> {
        let mut row = tenant.clone();
        row.updated_at = WrappedChronoDateTime::now();
        self.tenants.insert(row.id.clone(), row);
        Ok(())
    }

    async fn clear_slack_config(&self, tenant_id: &str) -> Result<(), CommonError> {
        match self.tenants.get_mut(tenant_id) {
            Some(mut tenant) => {
                tenant.slack_config = None;
                tenant.updated_at = WrappedChronoDateTime::now();
                Ok(())
            }
            None => Err(CommonError::NotFound {
                msg: "tenant not found".to_string(),
                lookup_id: tenant_id.to_string(),
                source: None,
            }),
        }
    }

    async fn delete_tenant_data(&self, tenant_id: &str) -> Result<(), CommonError> {
        let conversations_before = self.conversations.len();
        self.conversations
            .retain(|(tenant, _), _| tenant != tenant_id);
        let users_before = self.slack_users.len();
        self.slack_users.retain(|(tenant, _), _| tenant != tenant_id);
        trace!(
            tenant_id = %tenant_id,
            conversations = conversations_before - self.conversations.len(),
            users = users_before - self.slack_users.len(),
            "Deleted tenant data"
        );
        Ok(())
    }
}

#[async_trait]
impl ConversationRepositoryLike for Repository {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), CommonError> {
        self.conversations.insert(
            (conversation.tenant_id.clone(), conversation.id.clone()),
            conversation.clone(),
        );
        Ok(())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), CommonError> {
        let mut row = conversation.clone();
        row.updated_at = WrappedChronoDateTime::now();
        self.conversations
            .insert((row.tenant_id.clone(), row.id.clone()), row);
        Ok(())
    }

    async fn get_conversation(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<Conversation>, CommonError> {
        Ok(self
            .conversations
            .get(&(tenant_id.to_string(), id.to_string()))
            .map(|row| row.clone()))
    }

    async fn list_conversations(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, CommonError> {
        let mut rows: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| b.slack_timestamp.cmp(&a.slack_timestamp));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_thread_replies(
        &self,
        tenant_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<Conversation>, CommonError> {
        let mut rows: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| {
                entry.key().0 == tenant_id
                    && entry.value().thread_ts.as_deref() == Some(thread_ts)
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| a.slack_timestamp.cmp(&b.slack_timestamp));
        Ok(rows)
    }
}

#[async_trait]
impl SlackUserRepositoryLike for Repository {
    async fn get_slack_user(
        &self,
        tenant_id: &str,
        slack_user_id: &str,
    ) -> Result<Option<SlackUser>, CommonError> {
        Ok(self
            .slack_users
            .get(&(tenant_id.to_string(), slack_user_id.to_string()))
            .map(|row| row.clone()))
    }

    async fn create_slack_user(&self, user: &SlackUser) -> Result<(), CommonError> {
        self.slack_users.insert(
            (user.tenant_id.clone(), user.slack_user_id.clone()),
            user.clone(),
        );
        Ok(())
    }

    async fn save_slack_user(&self, user: &SlackUser) -> Result<(), CommonError> {
        let mut row = user.clone();
        row.updated_at = WrappedChronoDateTime::now();
        self.slack_users
            .insert((row.tenant_id.clone(), row.slack_user_id.clone()), row);
        Ok(())
    }

    async fn list_slack_users(
        &self,
        tenant_id: &str,
        filter: &SlackUserFilter,
    ) -> Result<Vec<SlackUser>, CommonError> {
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut rows: Vec<SlackUser> = self
            .slack_users
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .filter(|user| filter.include_inactive || user.is_active)
            .filter(|user| match &needle {
                Some(needle) => [&user.real_name, &user.display_name, &user.email]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(needle)),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then_with(|| a.real_name.cmp(&b.real_name))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;
        use crate::logic::conversation::NewConversation;
        use crate::logic::tenant::SlackConfig;
        use crate::logic::user::NewSlackUser;

        fn tenant_with_team(id: &str, team_id: &str) -> Tenant {
            let mut tenant = Tenant::new(id, "Acme", "acme");
            tenant.slack_config = Some(SlackConfig {
                bot_token: "xoxb-1".to_string(),
                signing_secret: "secret".to_string(),
                team_id: team_id.to_string(),
                team_name: None,
                installed_by: None,
            });
            tenant
        }

        fn conversation(tenant_id: &str, id: &str) -> Conversation {
            Conversation::new(NewConversation {
                id: id.to_string(),
                tenant_id: tenant_id.to_string(),
                channel_id: "C1".to_string(),
                channel_name: None,
                content: "hi".to_string(),
                user_id: "U1".to_string(),
                user_name: None,
                thread_ts: None,
            })
        }

        #[tokio::test]
        async fn test_tenant_lookup_by_team_id() {
            let repo = Repository::new();
            repo.save_tenant(&tenant_with_team("t-1", "T111")).await.unwrap();
            repo.save_tenant(&tenant_with_team("t-2", "T222")).await.unwrap();

            let found = repo.get_tenant_by_team_id("T222").await.unwrap().unwrap();
            assert_eq!(found.id, "t-2");
            assert!(repo.get_tenant_by_team_id("T999").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_inactive_tenant_is_invisible() {
            let repo = Repository::new();
            let mut tenant = tenant_with_team("t-1", "T111");
            tenant.is_active = false;
            repo.save_tenant(&tenant).await.unwrap();
            assert!(repo.get_tenant_by_id("t-1").await.unwrap().is_none());
            assert!(repo.get_tenant_by_team_id("T111").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_clear_slack_config_is_total() {
            let repo = Repository::new();
            repo.save_tenant(&tenant_with_team("t-1", "T111")).await.unwrap();
            repo.clear_slack_config("t-1").await.unwrap();
            let tenant = repo.get_tenant_by_id("t-1").await.unwrap().unwrap();
            assert!(tenant.slack_config.is_none());
        }

        #[tokio::test]
        async fn test_list_conversations_newest_first_with_limit() {
            let repo = Repository::new();
            for ts in ["1700000001.0", "1700000003.0", "1700000002.0"] {
                repo.create_conversation(&conversation("t-1", ts)).await.unwrap();
            }
            repo.create_conversation(&conversation("t-other", "1700000009.0"))
                .await
                .unwrap();

            let rows = repo.list_conversations("t-1", 2).await.unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].id, "1700000003.0");
            assert_eq!(rows[1].id, "1700000002.0");
        }

        #[tokio::test]
        async fn test_list_thread_replies_scans_by_pointer() {
            let repo = Repository::new();
            let parent = conversation("t-1", "1700000000.0");
            repo.create_conversation(&parent).await.unwrap();
            for ts in ["1700000001.0", "1700000002.0"] {
                let mut reply = conversation("t-1", ts);
                reply.thread_ts = Some(parent.id.clone());
                repo.create_conversation(&reply).await.unwrap();
            }

            let replies = repo.list_thread_replies("t-1", &parent.id).await.unwrap();
            assert_eq!(replies.len(), 2);
            assert_eq!(replies[0].id, "1700000001.0");
        }

        #[tokio::test]
        async fn test_delete_tenant_data_scopes_to_tenant() {
            let repo = Repository::new();
            repo.create_conversation(&conversation("t-1", "1.0")).await.unwrap();
            repo.create_conversation(&conversation("t-2", "2.0")).await.unwrap();
            let user = SlackUser::from_profile("t-1", "U1", NewSlackUser::default());
            repo.create_slack_user(&user).await.unwrap();

            repo.delete_tenant_data("t-1").await.unwrap();
            assert!(repo.get_conversation("t-1", "1.0").await.unwrap().is_none());
            assert!(repo.get_conversation("t-2", "2.0").await.unwrap().is_some());
            assert!(repo.get_slack_user("t-1", "U1").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_slack_user_search_filter() {
            let repo = Repository::new();
            let mut ada = SlackUser::from_profile(
                "t-1",
                "U1",
                NewSlackUser {
                    real_name: Some("Ada Lovelace".to_string()),
                    ..Default::default()
                },
            );
            repo.create_slack_user(&ada).await.unwrap();
            let mut bob = SlackUser::from_profile(
                "t-1",
                "U2",
                NewSlackUser {
                    real_name: Some("Bob".to_string()),
                    ..Default::default()
                },
            );
            bob.is_active = false;
            repo.save_slack_user(&bob).await.unwrap();
            ada.email = Some("ada@example.com".to_string());
            repo.save_slack_user(&ada).await.unwrap();

            let filter = SlackUserFilter {
                include_inactive: false,
                search: Some("lovelace".to_string()),
            };
            let rows = repo.list_slack_users("t-1", &filter).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].slack_user_id, "U1");

            let all = repo
                .list_slack_users(
                    "t-1",
                    &SlackUserFilter {
                        include_inactive: true,
                        search: None,
                    },
                )
                .await
                .unwrap();
            assert_eq!(all.len(), 2);
        }
    }
}
