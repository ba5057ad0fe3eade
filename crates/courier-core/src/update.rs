//! Update model for the long-polling stream.
//!
//! An [`Update`] is one inbound event. Its payload is an [`UpdateKind`]: at most
//! one branch of the remote tagged union is populated, so the Rust side models
//! it as an enum instead of a struct of options.
//!
//! The serde representation matches the Bot API wire shape:
//!
//! ```json
//! { "update_id": 5, "message": { "message_id": 1, "chat": { "id": 42, "type": "private" }, "text": "/start" } }
//! ```
//!
//! Kinds this crate does not model decode into [`UpdateKind::Other`] with the
//! raw fields preserved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Update
// ============================================================================

/// One event delivered by the long-poll stream.
///
/// Updates are immutable once decoded and are shared as `Arc<Update>` while
/// being dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawUpdate", into = "RawUpdate")]
pub struct Update {
    /// Monotonically increasing sequence number assigned by the platform.
    pub update_id: i64,
    /// The populated payload.
    pub kind: UpdateKind,
}

/// The payload carried by an [`Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// A new incoming message.
    Message(Message),
    /// A new version of a message that was edited.
    EditedMessage(Message),
    /// A new channel post.
    ChannelPost(Message),
    /// A new version of a channel post that was edited.
    EditedChannelPost(Message),
    /// An inline keyboard button press.
    CallbackQuery(CallbackQuery),
    /// The bot's own membership status changed in a chat.
    MyChatMember(ChatMemberUpdated),
    /// Another member's status changed in a chat.
    ChatMember(ChatMemberUpdated),
    /// A payload kind not modelled here; the raw fields are kept.
    Other(Map<String, Value>),
}

impl Update {
    /// Creates an update from its id and payload.
    pub fn new(update_id: i64, kind: UpdateKind) -> Self {
        Self { update_id, kind }
    }

    /// Returns the `allowed_updates` name of this update's payload.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            UpdateKind::Message(_) => "message",
            UpdateKind::EditedMessage(_) => "edited_message",
            UpdateKind::ChannelPost(_) => "channel_post",
            UpdateKind::EditedChannelPost(_) => "edited_channel_post",
            UpdateKind::CallbackQuery(_) => "callback_query",
            UpdateKind::MyChatMember(_) => "my_chat_member",
            UpdateKind::ChatMember(_) => "chat_member",
            UpdateKind::Other(_) => "unknown",
        }
    }

    /// Returns the message if this update is a new incoming message.
    ///
    /// Edited messages and channel posts are not included; use
    /// [`effective_message`](Self::effective_message) for those.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the callback query if this update is a button press.
    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.kind {
            UpdateKind::CallbackQuery(cb) => Some(cb),
            _ => None,
        }
    }

    /// Returns whichever message this update refers to, if any.
    pub fn effective_message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(msg)
            | UpdateKind::EditedMessage(msg)
            | UpdateKind::ChannelPost(msg)
            | UpdateKind::EditedChannelPost(msg) => Some(msg),
            UpdateKind::CallbackQuery(cb) => cb.message.as_ref(),
            _ => None,
        }
    }

    /// Returns the text of a new incoming message.
    pub fn text(&self) -> Option<&str> {
        self.message().and_then(Message::text)
    }

    /// Returns the chat this update belongs to, if it can be determined.
    pub fn chat_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::MyChatMember(m) | UpdateKind::ChatMember(m) => Some(m.chat.id),
            _ => self.effective_message().map(|msg| msg.chat.id),
        }
    }

    /// Returns the user who caused this update, if known.
    pub fn sender(&self) -> Option<&User> {
        match &self.kind {
            UpdateKind::CallbackQuery(cb) => Some(&cb.from),
            UpdateKind::MyChatMember(m) | UpdateKind::ChatMember(m) => Some(&m.from),
            _ => self.effective_message().and_then(|msg| msg.from.as_ref()),
        }
    }
}

// ============================================================================
// Payload types
// ============================================================================

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier inside the chat.
    pub message_id: i64,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i64,
    /// The chat the message belongs to.
    pub chat: Chat,
    /// The sender; empty for channel posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Text of a text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Caption of a media message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Message {
    /// Creates a plain text message in `chat_id`.
    pub fn text_message(message_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            message_id,
            date: 0,
            chat: Chat::private(chat_id),
            from: None,
            text: Some(text.into()),
            caption: None,
        }
    }

    /// Returns the message text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// A chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique chat identifier.
    pub id: i64,
    /// Kind of the chat.
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
    /// Title of groups, supergroups and channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Username of private chats, supergroups and channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Chat {
    /// Creates a private chat with no extra metadata.
    pub fn private(id: i64) -> Self {
        Self {
            id,
            kind: ChatKind::Private,
            title: None,
            username: None,
        }
    }
}

/// Chat classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Unknown,
}

/// A platform user or bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: i64,
    /// Whether this user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// An inline keyboard button press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Unique query identifier.
    pub id: String,
    /// The user who pressed the button.
    pub from: User,
    /// The message carrying the keyboard, when still accessible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    #[serde(default)]
    pub chat_instance: String,
    /// Data attached to the pressed button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A membership change in a chat.
///
/// Member details are kept as raw JSON; their shapes are not interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub from: User,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub old_chat_member: Value,
    #[serde(default)]
    pub new_chat_member: Value,
}

// ============================================================================
// Wire representation
// ============================================================================

/// The Bot API shape: one optional field per payload kind.
#[derive(Serialize, Deserialize)]
struct RawUpdate {
    update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edited_channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_query: Option<CallbackQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    my_chat_member: Option<ChatMemberUpdated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chat_member: Option<ChatMemberUpdated>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<RawUpdate> for Update {
    fn from(raw: RawUpdate) -> Self {
        let kind = if let Some(msg) = raw.message {
            UpdateKind::Message(msg)
        } else if let Some(msg) = raw.edited_message {
            UpdateKind::EditedMessage(msg)
        } else if let Some(msg) = raw.channel_post {
            UpdateKind::ChannelPost(msg)
        } else if let Some(msg) = raw.edited_channel_post {
            UpdateKind::EditedChannelPost(msg)
        } else if let Some(cb) = raw.callback_query {
            UpdateKind::CallbackQuery(cb)
        } else if let Some(m) = raw.my_chat_member {
            UpdateKind::MyChatMember(m)
        } else if let Some(m) = raw.chat_member {
            UpdateKind::ChatMember(m)
        } else {
            UpdateKind::Other(raw.rest)
        };

        Update {
            update_id: raw.update_id,
            kind,
        }
    }
}

impl From<Update> for RawUpdate {
    fn from(update: Update) -> Self {
        let mut raw = RawUpdate {
            update_id: update.update_id,
            message: None,
            edited_message: None,
            channel_post: None,
            edited_channel_post: None,
            callback_query: None,
            my_chat_member: None,
            chat_member: None,
            rest: Map::new(),
        };

        match update.kind {
            UpdateKind::Message(msg) => raw.message = Some(msg),
            UpdateKind::EditedMessage(msg) => raw.edited_message = Some(msg),
            UpdateKind::ChannelPost(msg) => raw.channel_post = Some(msg),
            UpdateKind::EditedChannelPost(msg) => raw.edited_channel_post = Some(msg),
            UpdateKind::CallbackQuery(cb) => raw.callback_query = Some(cb),
            UpdateKind::MyChatMember(m) => raw.my_chat_member = Some(m),
            UpdateKind::ChatMember(m) => raw.chat_member = Some(m),
            UpdateKind::Other(rest) => raw.rest = rest,
        }

        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_message_update() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 5,
            "message": {
                "message_id": 11,
                "date": 1700000000,
                "chat": { "id": 42, "type": "private", "username": "alice" },
                "from": { "id": 7, "is_bot": false, "first_name": "Alice" },
                "text": "/start"
            }
        }))
        .unwrap();

        assert_eq!(update.update_id, 5);
        assert_eq!(update.kind_name(), "message");
        assert_eq!(update.text(), Some("/start"));
        assert_eq!(update.chat_id(), Some(42));
        assert_eq!(update.sender().map(|u| u.id), Some(7));
    }

    #[test]
    fn test_decode_callback_query_uses_message_chat() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 9,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7, "first_name": "Alice" },
                "chat_instance": "abc",
                "data": "vote:1",
                "message": {
                    "message_id": 3,
                    "chat": { "id": -100, "type": "supergroup", "title": "Team" }
                }
            }
        }))
        .unwrap();

        let cb = update.callback_query().unwrap();
        assert_eq!(cb.data.as_deref(), Some("vote:1"));
        assert!(update.message().is_none());
        assert_eq!(update.chat_id(), Some(-100));
        assert_eq!(update.sender().map(|u| u.id), Some(7));
    }

    #[test]
    fn test_edited_message_is_not_a_new_message() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "edited_message": {
                "message_id": 3,
                "chat": { "id": 1, "type": "private" },
                "text": "fixed typo"
            }
        }))
        .unwrap();

        assert_eq!(update.kind_name(), "edited_message");
        assert!(update.message().is_none());
        assert_eq!(update.effective_message().and_then(Message::text), Some("fixed typo"));
        assert_eq!(update.text(), None);
    }

    #[test]
    fn test_unknown_kind_keeps_raw_fields() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 77,
            "poll": { "id": "p1", "question": "?" }
        }))
        .unwrap();

        match &update.kind {
            UpdateKind::Other(rest) => assert!(rest.contains_key("poll")),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(update.chat_id(), None);

        let encoded = serde_json::to_value(&update).unwrap();
        assert_eq!(encoded["poll"]["id"], "p1");
        assert_eq!(encoded["update_id"], 77);
    }

    #[test]
    fn test_unknown_chat_kind_falls_back() {
        let chat: Chat = serde_json::from_value(json!({ "id": 1, "type": "forum" })).unwrap();
        assert_eq!(chat.kind, ChatKind::Unknown);
    }
}
