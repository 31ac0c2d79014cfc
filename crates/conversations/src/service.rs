//! Service layer for the conversation sync engine
//! Holds the shared dependencies handed to every request handler

use std::sync::Arc;

use shared::error::CommonError;

use crate::{
    logic::{
        event::Broadcaster,
        tenant::Tenant,
    },
    repository::{Repository, TenantRepositoryLike},
};

/// Main service struct for conversation operations.
///
/// Cloning is cheap; all state is shared behind the repository's maps and the
/// broadcaster's registry.
#[derive(Clone)]
pub struct SyncService {
    pub repository: Repository,
    /// In-memory registry of live dashboard subscribers, per tenant.
    pub broadcaster: Arc<Broadcaster>,
}

/// Parameters for creating a SyncService
pub struct SyncServiceParams {
    pub repository: Repository,
}

impl SyncService {
    /// Create a new SyncService instance
    pub fn new(params: SyncServiceParams) -> Self {
        Self {
            repository: params.repository,
            broadcaster: Arc::new(Broadcaster::new()),
        }
    }

    /// Resolve an active tenant or fail with a 404-mapping error.
    ///
    /// Used by every tenant-scoped route; inactive tenants are
    /// indistinguishable from absent ones.
    pub async fn require_tenant(&self, tenant_id: &str) -> Result<Tenant, CommonError> {
        self.repository
            .get_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| CommonError::NotFound {
                msg: "tenant not found".to_string(),
                lookup_id: tenant_id.to_string(),
                source: None,
            })
    }
}
