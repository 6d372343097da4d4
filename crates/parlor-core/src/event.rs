//! Events exchanged with clients over the relay WebSocket.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Event names match what the browser client already speaks
//! (`chat message`, `user list`, ...), spaces included.

use serde::{Deserialize, Serialize};

/// Sender name used for relay-generated notices. Reserved: nobody may join
/// under it.
pub const SYSTEM_SENDER: &str = "System";

/// Sender shown in `banned` events raised by the relay itself rather than
/// by an administrator.
pub const SERVER_BANNER: &str = "server";

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Claim a display name for this connection.
    #[serde(rename = "join")]
    Join(String),

    #[serde(rename = "chat message")]
    Chat(ChatBody),

    #[serde(rename = "whisper")]
    Whisper(WhisperPayload),

    #[serde(rename = "ban")]
    Ban(ModerationPayload),

    #[serde(rename = "unban")]
    Unban(ModerationPayload),
}

/// Body of an inbound `chat message`: either a bare string or a structured
/// payload carrying text and/or an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatBody {
    Text(String),
    Payload(ChatPayload),
}

impl ChatBody {
    /// Split into `(text, image)`.
    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        match self {
            ChatBody::Text(text) => (Some(text), None),
            ChatBody::Payload(p) => (p.text, p.image),
        }
    }
}

/// Structured chat payload. `user` is whatever the client claims; the relay
/// replaces it with the registered name before delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPayload {
    pub user: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperPayload {
    pub from: Option<String>,
    pub to: String,
    pub text: String,
}

/// Payload of `ban` / `unban`. `target` is a display name or an IPv4 literal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationPayload {
    pub from: Option<String>,
    pub target: String,
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "chat message")]
    Chat(ChatMessage),

    /// Display names of every joined participant, in registry order.
    #[serde(rename = "user list")]
    UserList(Vec<String>),

    /// The receiving connection is banned and about to be closed.
    #[serde(rename = "banned")]
    Banned { by: String },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// An outbound chat line: regular chat, whisper or system notice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub whisper: bool,
    /// Whisper recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
}

impl ChatMessage {
    pub fn chat(user: impl Into<String>, text: Option<String>, image: Option<String>) -> Self {
        Self {
            user: user.into(),
            text,
            image,
            ..Default::default()
        }
    }

    pub fn whisper(from: impl Into<String>, to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: from.into(),
            text: Some(text.into()),
            whisper: true,
            to: Some(to.into()),
            ..Default::default()
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            user: SYSTEM_SENDER.to_string(),
            text: Some(text.into()),
            system: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_carries_a_bare_name() {
        let ev: ClientEvent = serde_json::from_str(r#"{"event":"join","data":"Jane"}"#).unwrap();
        assert_eq!(ev, ClientEvent::Join("Jane".into()));
    }

    #[test]
    fn chat_accepts_plain_string() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"chat message","data":"hello"}"#).unwrap();
        let ClientEvent::Chat(body) = ev else { panic!("expected chat") };
        assert_eq!(body.into_parts(), (Some("hello".into()), None));
    }

    #[test]
    fn chat_accepts_image_payload() {
        let ev: ClientEvent = serde_json::from_str(
            r#"{"event":"chat message","data":{"user":"Jane","image":"data:image/png;base64,AA=="}}"#,
        )
        .unwrap();
        let ClientEvent::Chat(body) = ev else { panic!("expected chat") };
        let (text, image) = body.into_parts();
        assert!(text.is_none());
        assert_eq!(image.as_deref(), Some("data:image/png;base64,AA=="));
    }

    #[test]
    fn whisper_with_missing_fields_still_parses() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"whisper","data":{"from":"Jane"}}"#).unwrap();
        let ClientEvent::Whisper(w) = ev else { panic!("expected whisper") };
        assert!(w.to.is_empty());
        assert!(w.text.is_empty());
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"typing","data":{}}"#).is_err());
    }

    #[test]
    fn plain_chat_omits_flags() {
        let ev = ServerEvent::Chat(ChatMessage::chat("Jane", Some("hi".into()), None));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "chat message", "data": {"user": "Jane", "text": "hi"}})
        );
    }

    #[test]
    fn whisper_is_flagged_with_recipient() {
        let ev = ServerEvent::Chat(ChatMessage::whisper("Jane", "Bob", "psst"));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["data"]["whisper"], true);
        assert_eq!(json["data"]["to"], "Bob");
        assert!(json["data"].get("system").is_none());
    }

    #[test]
    fn user_list_and_banned_shapes() {
        let list = serde_json::to_value(ServerEvent::UserList(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(list, serde_json::json!({"event": "user list", "data": ["a", "b"]}));

        let banned = serde_json::to_value(ServerEvent::Banned { by: "admin".into() }).unwrap();
        assert_eq!(banned, serde_json::json!({"event": "banned", "data": {"by": "admin"}}));
    }
}
