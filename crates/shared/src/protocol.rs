use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{RoomId, ServerMessageId};

pub fn room_topic(room_id: &RoomId) -> String {
    format!("/topic/public/{room_id}")
}

pub fn user_notification_topic(identity: &str) -> String {
    format!("/topic/user/{identity}/notifications")
}

pub fn send_message_destination(room_id: &RoomId) -> String {
    format!("/app/chat.sendMessage/{room_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Chat,
    Join,
    Leave,
    Notification,
    Unknown,
}

impl MessageType {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CHAT" => Self::Chat,
            "JOIN" => Self::Join,
            "LEAVE" => Self::Leave,
            "NOTIFICATION" => Self::Notification,
            _ => Self::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

/// Backends serialize unset fields as explicit `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerMessageId>,
    pub room_id: RoomId,
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageType,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn chat(room_id: RoomId, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            room_id,
            sender: sender.into(),
            content: content.into(),
            kind: MessageType::Chat,
            timestamp: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNotification {
    pub room_id: RoomId,
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_preview: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageType,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_count: u32,
}

impl ChatSession {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            participant_name: None,
            participant_email: None,
            last_message: None,
            last_message_time: None,
            unread_count: 0,
        }
    }
}

pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer};

    const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        EpochMillis(i64),
    }

    /// Accepts RFC 3339 or a zone-less local date-time, which is read as UTC.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        LOCAL_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawTimestamp>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawTimestamp::Text(text)) => parse(&text)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {text}"))),
            Some(RawTimestamp::EpochMillis(millis)) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {millis}"))),
        }
    }
}
