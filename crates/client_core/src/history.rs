use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use shared::{
    domain::RoomId,
    protocol::{ChatMessage, ChatSession},
};
use tracing::debug;

use crate::inbound::room_message_from_value;

/// REST side of the chat backend: conversation list, stored history and
/// read receipts. Unlike the realtime client, failures are returned.
#[derive(Clone)]
pub struct HistoryClient {
    http: Client,
    api_base_url: String,
    token: String,
}

impl HistoryClient {
    pub fn new(api_base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), api_base_url, token)
    }

    pub fn with_http_client(
        http: Client,
        api_base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let url = format!("{}/chat/rooms", self.api_base_url);
        let sessions: Vec<ChatSession> = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("chat room list has unexpected shape")?;
        debug!(count = sessions.len(), "history: loaded sessions");
        Ok(sessions)
    }

    pub async fn list_messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>> {
        let url = format!("{}/chat/rooms/{room_id}/messages", self.api_base_url);
        let raw: Vec<Value> = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("room history is not a JSON array")?;
        let messages = raw
            .into_iter()
            .map(|value| room_message_from_value(value, room_id))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid history for room {room_id}"))?;
        debug!(room_id = %room_id, count = messages.len(), "history: loaded messages");
        Ok(messages)
    }

    pub async fn mark_read(&self, room_id: &RoomId) -> Result<()> {
        let url = format!("{}/chat/rooms/{room_id}/read", self.api_base_url);
        self.http
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()?;
        debug!(room_id = %room_id, "history: marked room read");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
