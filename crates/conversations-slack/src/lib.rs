//! Slack provider for the conversation sync engine
//!
//! This crate provides:
//! - Events API webhook handling with signature verification (`router` module)
//! - Event classification and conversation reconciliation (`logic` module)
//! - Outbound message sending with user/bot credential fallback
//! - Token lifecycle: validity checks, revocation, tenant disconnect
//!
//! The webhook endpoint verifies, classifies, and reconciles synchronously,
//! then acknowledges; live dashboard subscribers are notified through the
//! broadcaster owned by the core `conversations` crate.

pub mod logic;
pub mod router;
pub mod types;

use std::sync::Arc;

use conversations::repository::Repository;
use conversations::service::SyncService;

use crate::logic::client::SlackApi;

pub use logic::client::SlackClient;

/// Shared state handed to every Slack route: the core sync service plus the
/// Web API client.
#[derive(Clone)]
pub struct SlackSyncService {
    pub sync: Arc<SyncService>,
    pub slack: Arc<dyn SlackApi>,
}

impl SlackSyncService {
    pub fn new(sync: Arc<SyncService>, slack: Arc<dyn SlackApi>) -> Self {
        Self { sync, slack }
    }

    pub fn repository(&self) -> &Repository {
        &self.sync.repository
    }
}
