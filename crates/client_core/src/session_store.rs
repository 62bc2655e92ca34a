use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::{
    domain::{MessageKey, RoomId},
    protocol::{ChatMessage, ChatNotification, ChatSession, MessageType},
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub key: MessageKey,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Appended,
    /// Our own echo replaced an optimistic copy.
    Confirmed,
    Duplicate,
}

/// Conversation list and per-room message cache behind a chat dashboard.
///
/// Fed by history loads and by the realtime handlers; it never talks to the
/// network itself.
#[derive(Debug, Default)]
pub struct ChatSessionStore {
    sessions: HashMap<RoomId, ChatSession>,
    messages: HashMap<RoomId, Vec<StoredMessage>>,
    active: Option<RoomId>,
}

impl ChatSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server copies win for metadata. The active room keeps a zero unread
    /// count.
    pub fn upsert_sessions(&mut self, sessions: Vec<ChatSession>) {
        for mut session in sessions {
            if self.active.as_ref() == Some(&session.id) {
                session.unread_count = 0;
            }
            self.sessions.insert(session.id.clone(), session);
        }
    }

    /// Swaps the cached messages for a freshly loaded history, keeping any
    /// optimistic messages still waiting for their echo.
    pub fn replace_history(&mut self, room_id: &RoomId, history: Vec<ChatMessage>) {
        let pending: Vec<StoredMessage> = self
            .messages
            .remove(room_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|stored| stored.key.is_pending())
            .collect();
        let mut stored: Vec<StoredMessage> = history
            .into_iter()
            .map(|message| StoredMessage {
                key: MessageKey::received(message.id.clone()),
                message,
            })
            .collect();
        stored.extend(pending);
        self.messages.insert(room_id.clone(), stored);
    }

    /// Makes `room_id` active and returns the unread count it had.
    pub fn select(&mut self, room_id: &RoomId) -> u32 {
        self.active = Some(room_id.clone());
        let session = self.session_entry(room_id);
        std::mem::take(&mut session.unread_count)
    }

    pub fn clear_selection(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&RoomId> {
        self.active.as_ref()
    }

    /// Records a message we are about to send so it shows before the
    /// broker echoes it back.
    pub fn push_optimistic(
        &mut self,
        room_id: &RoomId,
        sender: &str,
        content: &str,
    ) -> ChatMessage {
        let message = ChatMessage::chat(room_id.clone(), sender, content);
        self.touch_session(&message);
        self.messages
            .entry(room_id.clone())
            .or_default()
            .push(StoredMessage {
                key: MessageKey::pending(),
                message: message.clone(),
            });
        message
    }

    /// Drops optimistic copies that will never be confirmed, e.g. after the
    /// send was refused.
    pub fn discard_pending(&mut self, room_id: &RoomId) -> usize {
        let Some(messages) = self.messages.get_mut(room_id) else {
            return 0;
        };
        let before = messages.len();
        messages.retain(|stored| !stored.key.is_pending());
        before - messages.len()
    }

    pub fn apply_message(&mut self, message: ChatMessage, own_identity: &str) -> MessageOutcome {
        let room_id = message.room_id.clone();
        let own = message.sender == own_identity;
        let messages = self.messages.entry(room_id.clone()).or_default();

        if let Some(id) = &message.id {
            if messages
                .iter()
                .any(|stored| matches!(&stored.key, MessageKey::Server(known) if known == id))
            {
                debug!(room_id = %room_id, message_id = %id, "store: duplicate message ignored");
                return MessageOutcome::Duplicate;
            }
        }

        let outcome = match own
            .then(|| {
                messages.iter().position(|stored| {
                    stored.key.is_pending()
                        && stored.message.sender == message.sender
                        && stored.message.content == message.content
                })
            })
            .flatten()
        {
            Some(index) => {
                messages[index] = StoredMessage {
                    key: MessageKey::received(message.id.clone()),
                    message: message.clone(),
                };
                MessageOutcome::Confirmed
            }
            None => {
                messages.push(StoredMessage {
                    key: MessageKey::received(message.id.clone()),
                    message: message.clone(),
                });
                MessageOutcome::Appended
            }
        };

        if message.kind == MessageType::Chat {
            self.touch_session(&message);
            if outcome == MessageOutcome::Appended && !own && !self.is_active(&room_id) {
                self.session_entry(&room_id).unread_count += 1;
            }
        }
        outcome
    }

    pub fn apply_notification(&mut self, notification: &ChatNotification, own_identity: &str) {
        let bump = notification.sender != own_identity && !self.is_active(&notification.room_id);
        let session = self.session_entry(&notification.room_id);
        session.last_message = Some(notification.content_preview.clone());
        session.last_message_time = Some(notification.timestamp.unwrap_or_else(Utc::now));
        if bump {
            session.unread_count += 1;
        }
    }

    pub fn messages(&self, room_id: &RoomId) -> &[StoredMessage] {
        self.messages.get(room_id).map_or(&[], Vec::as_slice)
    }

    pub fn session(&self, room_id: &RoomId) -> Option<&ChatSession> {
        self.sessions.get(room_id)
    }

    /// Most recent activity first; sessions without any activity last.
    pub fn sessions_by_recency(&self) -> Vec<&ChatSession> {
        let mut sessions: Vec<&ChatSession> = self.sessions.values().collect();
        sessions.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    pub fn total_unread(&self) -> u32 {
        self.sessions.values().map(|session| session.unread_count).sum()
    }

    fn is_active(&self, room_id: &RoomId) -> bool {
        self.active.as_ref() == Some(room_id)
    }

    fn session_entry(&mut self, room_id: &RoomId) -> &mut ChatSession {
        self.sessions
            .entry(room_id.clone())
            .or_insert_with(|| ChatSession::new(room_id.clone()))
    }

    fn touch_session(&mut self, message: &ChatMessage) {
        let time: Option<DateTime<Utc>> = message.timestamp.or_else(|| Some(Utc::now()));
        let session = self.session_entry(&message.room_id);
        session.last_message = Some(message.content.clone());
        session.last_message_time = time;
    }
}

#[cfg(test)]
#[path = "tests/session_store_tests.rs"]
mod tests;
