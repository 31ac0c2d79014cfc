//! Scripted [`SlackApi`] double for exercising sync logic without a network.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::logic::client::{PostedMessage, SlackApi, SlackApiError};
use crate::types::{
    SlackChannelInfo, SlackPostMessageRequest, SlackUserInfo,
};

#[derive(Default)]
pub struct FakeSlackApi {
    users: Mutex<HashMap<String, SlackUserInfo>>,
    channels: Mutex<HashMap<String, SlackChannelInfo>>,
    valid_tokens: Mutex<HashSet<String>>,
    rejected_tokens: Mutex<HashSet<String>>,
    posted: Mutex<Vec<(String, SlackPostMessageRequest)>>,
    reactions: Mutex<Vec<(String, String, String)>>,
    revoked: Mutex<Vec<String>>,
    user_info_calls: AtomicUsize,
    next_ts: AtomicU64,
}

impl FakeSlackApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, info: SlackUserInfo) -> Self {
        self.users.lock().unwrap().insert(info.id.clone(), info);
        self
    }

    pub fn with_channel(self, id: &str, name: &str) -> Self {
        self.channels.lock().unwrap().insert(
            id.to_string(),
            SlackChannelInfo {
                id: id.to_string(),
                name: Some(name.to_string()),
            },
        );
        self
    }

    /// Mark a token as accepted by auth.test.
    pub fn with_valid_token(self, token: &str) -> Self {
        self.valid_tokens.lock().unwrap().insert(token.to_string());
        self
    }

    /// Make every call using this token fail with `invalid_auth`.
    pub fn rejecting_token(self, token: &str) -> Self {
        self.rejected_tokens
            .lock()
            .unwrap()
            .insert(token.to_string());
        self
    }

    pub fn posted(&self) -> Vec<(String, SlackPostMessageRequest)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<(String, String, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::Relaxed)
    }

    fn reject_if_configured(&self, token: &str) -> Result<(), SlackApiError> {
        if self.rejected_tokens.lock().unwrap().contains(token) {
            return Err(SlackApiError::Api {
                error: "invalid_auth".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SlackApi for FakeSlackApi {
    async fn post_message(
        &self,
        token: &str,
        request: &SlackPostMessageRequest,
    ) -> Result<PostedMessage, SlackApiError> {
        // Record the attempt even when the token is rejected so tests can
        // observe which credentials each tier tried.
        self.posted
            .lock()
            .unwrap()
            .push((token.to_string(), request.clone()));
        self.reject_if_configured(token)?;
        let n = self.next_ts.fetch_add(1, Ordering::Relaxed);
        Ok(PostedMessage {
            ts: format!("{}.{:06}", 1_800_000_000 + n, n),
            channel: request.channel.clone(),
        })
    }

    async fn fetch_user_info(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<SlackUserInfo, SlackApiError> {
        self.user_info_calls.fetch_add(1, Ordering::Relaxed);
        self.reject_if_configured(token)?;
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| SlackApiError::Api {
                error: "user_not_found".to_string(),
            })
    }

    async fn fetch_channel_info(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<SlackChannelInfo, SlackApiError> {
        self.reject_if_configured(token)?;
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| SlackApiError::Api {
                error: "channel_not_found".to_string(),
            })
    }

    async fn add_reaction(
        &self,
        token: &str,
        channel: &str,
        ts: &str,
        emoji: &str,
    ) -> Result<(), SlackApiError> {
        self.reject_if_configured(token)?;
        self.reactions.lock().unwrap().push((
            channel.to_string(),
            ts.to_string(),
            emoji.to_string(),
        ));
        Ok(())
    }

    async fn auth_test(&self, token: &str) -> Result<bool, SlackApiError> {
        Ok(self.valid_tokens.lock().unwrap().contains(token))
    }

    async fn revoke_token(&self, token: &str) -> Result<(), SlackApiError> {
        self.reject_if_configured(token)?;
        self.revoked.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
