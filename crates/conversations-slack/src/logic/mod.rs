//! Logic layer for the Slack sync provider

pub mod client;
pub mod gateway;
pub mod ingest;
pub mod users;
pub mod verify;

#[cfg(test)]
pub mod testing;

pub use client::{SlackApi, SlackClient};
