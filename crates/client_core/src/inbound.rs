use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use shared::{
    domain::RoomId,
    protocol::{ChatMessage, ChatNotification},
};

/// Room topics do not always repeat the room id in the body; fill it from
/// the subscription the frame arrived on.
pub(crate) fn room_message_from_value(mut value: Value, room_id: &RoomId) -> Result<ChatMessage> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| anyhow!("room message body is not a JSON object"))?;
    let entry = object.entry("roomId").or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::String(room_id.to_string());
    }
    serde_json::from_value(value).context("room message does not match the chat message shape")
}

pub(crate) fn decode_room_message(body: &str, room_id: &RoomId) -> Result<ChatMessage> {
    let value: Value = serde_json::from_str(body).context("room message body is not JSON")?;
    room_message_from_value(value, room_id)
}

pub(crate) fn decode_notification(body: &str) -> Result<ChatNotification> {
    serde_json::from_str(body).context("notification body does not match the notification shape")
}

#[cfg(test)]
mod tests {
    use shared::protocol::MessageType;

    use super::*;

    #[test]
    fn fills_missing_room_id_from_subscription() {
        let message = decode_room_message(r#"{"sender":"a","content":"hi"}"#, &RoomId::new("r7"))
            .expect("decode");
        assert_eq!(message.room_id, RoomId::new("r7"));
    }

    #[test]
    fn null_fields_are_treated_as_absent() {
        let message = decode_room_message(
            r#"{"id":null,"roomId":null,"sender":"a","content":null,"type":null,"timestamp":null}"#,
            &RoomId::new("r7"),
        )
        .expect("decode");
        assert_eq!(message.room_id, RoomId::new("r7"));
        assert_eq!(message.content, "");
        assert_eq!(message.kind, MessageType::Chat);

        let notification = decode_notification(
            r#"{"roomId":"r2","sender":"a","contentPreview":null,"type":null,"timestamp":null}"#,
        )
        .expect("decode");
        assert_eq!(notification.content_preview, "");
        assert_eq!(notification.kind, MessageType::Chat);
    }

    #[test]
    fn keeps_room_id_sent_by_backend() {
        let message = decode_room_message(
            r#"{"roomId":"r1","sender":"a","content":"hi"}"#,
            &RoomId::new("r7"),
        )
        .expect("decode");
        assert_eq!(message.room_id, RoomId::new("r1"));
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(decode_room_message("not json", &RoomId::new("r1")).is_err());
        assert!(decode_room_message("[1,2]", &RoomId::new("r1")).is_err());
        assert!(decode_notification(r#"{"sender":"a"}"#).is_err());
    }
}
