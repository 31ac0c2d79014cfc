//! Repository layer for the conversation sync engine
//!
//! Trait definitions for tenant, conversation, and platform-user storage.
//! The durable persistence engine itself is an external collaborator; these
//! traits capture the operations the engine is assumed to provide (key-based
//! upsert, simple filtered scans, transactional save of a single row). The
//! bundled [`memory::Repository`] implements them over in-process maps.

pub mod memory;

use async_trait::async_trait;
use shared::error::CommonError;

pub use memory::Repository;

use crate::logic::{conversation::Conversation, tenant::Tenant, user::SlackUser};

/// Filter for directory listings.
#[derive(Debug, Clone, Default)]
pub struct SlackUserFilter {
    pub include_inactive: bool,
    /// Case-insensitive match against real name, display name, or email.
    pub search: Option<String>,
}

/// Repository trait for tenant operations.
///
/// Lookups return `Ok(None)` for missing or inactive tenants; they never
/// error on absence.
#[async_trait]
pub trait TenantRepositoryLike: Send + Sync {
    /// Get an active tenant by id.
    async fn get_tenant_by_id(&self, id: &str) -> Result<Option<Tenant>, CommonError>;

    /// Get an active tenant by the platform workspace id it is bound to.
    async fn get_tenant_by_team_id(&self, team_id: &str) -> Result<Option<Tenant>, CommonError>;

    /// Insert or replace a tenant row.
    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), CommonError>;

    /// Atomically clear the whole platform config of a tenant.
    async fn clear_slack_config(&self, tenant_id: &str) -> Result<(), CommonError>;

    /// Delete all conversations and platform users of a tenant.
    async fn delete_tenant_data(&self, tenant_id: &str) -> Result<(), CommonError>;
}

/// Repository trait for conversation operations.
#[async_trait]
pub trait ConversationRepositoryLike: Send + Sync {
    /// Insert a new conversation row (upsert by key).
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), CommonError>;

    /// Replace an existing row wholesale, embedded arrays included.
    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), CommonError>;

    /// Get a conversation by tenant and message key.
    async fn get_conversation(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<Conversation>, CommonError>;

    /// Latest conversations for a tenant, newest first.
    async fn list_conversations(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, CommonError>;

    /// Standalone reply rows whose thread pointer matches `thread_ts`.
    async fn list_thread_replies(
        &self,
        tenant_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<Conversation>, CommonError>;
}

/// Repository trait for the platform-user directory cache.
#[async_trait]
pub trait SlackUserRepositoryLike: Send + Sync {
    async fn get_slack_user(
        &self,
        tenant_id: &str,
        slack_user_id: &str,
    ) -> Result<Option<SlackUser>, CommonError>;

    async fn create_slack_user(&self, user: &SlackUser) -> Result<(), CommonError>;

    async fn save_slack_user(&self, user: &SlackUser) -> Result<(), CommonError>;

    async fn list_slack_users(
        &self,
        tenant_id: &str,
        filter: &SlackUserFilter,
    ) -> Result<Vec<SlackUser>, CommonError>;
}
