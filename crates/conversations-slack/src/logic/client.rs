//! Slack Web API client
//!
//! HTTP client for the handful of Web API methods the sync engine calls.
//! Tokens are per-call arguments rather than client state because one client
//! serves every tenant, and a single send may try a user token first and a
//! bot token second.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, trace};

use crate::types::{
    SlackChannelInfo, SlackPostMessageRequest, SlackPostMessageResponse, SlackUserInfo,
};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// A successfully posted message.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub ts: String,
    pub channel: String,
}

/// Errors that can occur when interacting with the Slack API
#[derive(Debug, thiserror::Error)]
pub enum SlackApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse response: {error}, body: {body}")]
    Parse {
        body: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("Slack API error: {error}")]
    Api { error: String },
}

impl SlackApiError {
    /// The platform-reported error code, when the call reached Slack.
    pub fn api_error(&self) -> Option<&str> {
        match self {
            SlackApiError::Api { error } => Some(error),
            _ => None,
        }
    }
}

/// The Web API surface the sync engine depends on.
///
/// The seam exists so reconciliation and outbound logic can be exercised
/// against a scripted platform in tests.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// chat.postMessage with the given token. Overrides in the request are
    /// only honored by Slack for bot tokens.
    async fn post_message(
        &self,
        token: &str,
        request: &SlackPostMessageRequest,
    ) -> Result<PostedMessage, SlackApiError>;

    /// users.info
    async fn fetch_user_info(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<SlackUserInfo, SlackApiError>;

    /// conversations.info
    async fn fetch_channel_info(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<SlackChannelInfo, SlackApiError>;

    /// reactions.add; `already_reacted` is treated as success.
    async fn add_reaction(
        &self,
        token: &str,
        channel: &str,
        ts: &str,
        emoji: &str,
    ) -> Result<(), SlackApiError>;

    /// auth.test; `Ok(true)` means the token is currently accepted.
    async fn auth_test(&self, token: &str) -> Result<bool, SlackApiError>;

    /// auth.revoke
    async fn revoke_token(&self, token: &str) -> Result<(), SlackApiError>;
}

/// reqwest-backed [`SlackApi`] implementation
#[derive(Clone, Default)]
pub struct SlackClient {
    client: Client,
}

impl SlackClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn call(
        &self,
        token: &str,
        method: &str,
        payload: &Value,
    ) -> Result<Value, SlackApiError> {
        let response = self
            .client
            .post(format!("{SLACK_API_BASE}/{method}"))
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json; charset=utf-8")
            .json(payload)
            .send()
            .await
            .map_err(SlackApiError::Request)?;

        let status = response.status();
        let body = response.text().await.map_err(SlackApiError::Request)?;
        let result: Value = serde_json::from_str(&body).map_err(|e| SlackApiError::Parse {
            body: body.clone(),
            error: e,
        })?;

        if result["ok"].as_bool() != Some(true) {
            let error = result["error"].as_str().unwrap_or("unknown").to_string();
            error!(method = %method, error = %error, status = %status, "Slack API error");
            return Err(SlackApiError::Api { error });
        }
        Ok(result)
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn post_message(
        &self,
        token: &str,
        request: &SlackPostMessageRequest,
    ) -> Result<PostedMessage, SlackApiError> {
        trace!(channel = %request.channel, "Posting message to Slack");

        let payload = serde_json::to_value(request).map_err(|e| SlackApiError::Parse {
            body: String::new(),
            error: e,
        })?;
        let result = self.call(token, "chat.postMessage", &payload).await?;
        let response: SlackPostMessageResponse =
            serde_json::from_value(result).map_err(|e| SlackApiError::Parse {
                body: String::new(),
                error: e,
            })?;

        let ts = response.ts.unwrap_or_default();
        trace!(ts = %ts, "Message posted successfully");
        Ok(PostedMessage {
            ts,
            channel: response.channel.unwrap_or_else(|| request.channel.clone()),
        })
    }

    async fn fetch_user_info(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<SlackUserInfo, SlackApiError> {
        trace!(user_id = %user_id, "Fetching user info");
        let result = self
            .call(token, "users.info", &serde_json::json!({ "user": user_id }))
            .await?;
        serde_json::from_value(result["user"].clone()).map_err(|e| SlackApiError::Parse {
            body: result.to_string(),
            error: e,
        })
    }

    async fn fetch_channel_info(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<SlackChannelInfo, SlackApiError> {
        trace!(channel_id = %channel_id, "Fetching channel info");
        let result = self
            .call(
                token,
                "conversations.info",
                &serde_json::json!({ "channel": channel_id }),
            )
            .await?;
        serde_json::from_value(result["channel"].clone()).map_err(|e| SlackApiError::Parse {
            body: result.to_string(),
            error: e,
        })
    }

    async fn add_reaction(
        &self,
        token: &str,
        channel: &str,
        ts: &str,
        emoji: &str,
    ) -> Result<(), SlackApiError> {
        trace!(channel = %channel, ts = %ts, emoji = %emoji, "Adding reaction");
        let result = self
            .call(
                token,
                "reactions.add",
                &serde_json::json!({
                    "channel": channel,
                    "timestamp": ts,
                    "name": emoji
                }),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // The reaction is already on the message; the goal state holds.
            Err(ref e) if e.api_error() == Some("already_reacted") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn auth_test(&self, token: &str) -> Result<bool, SlackApiError> {
        match self.call(token, "auth.test", &serde_json::json!({})).await {
            Ok(_) => Ok(true),
            Err(SlackApiError::Api { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn revoke_token(&self, token: &str) -> Result<(), SlackApiError> {
        trace!("Revoking token");
        self.call(token, "auth.revoke", &serde_json::json!({}))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;

        #[test]
        fn test_api_error_code_extraction() {
            let err = SlackApiError::Api {
                error: "invalid_auth".to_string(),
            };
            assert_eq!(err.api_error(), Some("invalid_auth"));

            let err = SlackApiError::Parse {
                body: "{}".to_string(),
                error: serde_json::from_str::<Value>("").unwrap_err(),
            };
            assert_eq!(err.api_error(), None);
        }
    }
}
