//! Conversation sync engine core
//!
//! This crate owns the per-tenant conversation store and the live fan-out
//! layer that platform providers (e.g. Slack) write into.
//!
//! ## Core Concepts
//!
//! - **Tenant**: a customer workspace; holds the optional platform
//!   configuration (tokens, signing secret) a provider needs.
//!
//! - **Conversation**: a synced message keyed by the platform's message
//!   timestamp, carrying reaction aggregates and embedded thread replies.
//!
//! - **SlackUser**: the cached platform-user directory entry for a tenant,
//!   including the optional user-granted posting token.
//!
//! - **Broadcaster**: the per-tenant subscriber registry that pushes tagged
//!   state-change events to live dashboard streams.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conversations::service::{SyncService, SyncServiceParams};
//! use conversations::repository::Repository;
//! use std::sync::Arc;
//!
//! let service = Arc::new(SyncService::new(SyncServiceParams {
//!     repository: Repository::new(),
//! }));
//! let router = conversations::router::create_router().with_state(service);
//! ```

pub mod logic;
pub mod repository;
pub mod router;
pub mod service;
