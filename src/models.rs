use serde::{Deserialize, Serialize};

pub type ConversationId = u64;
pub type MessageId = u64;

/// Display timestamp used for anything created locally
pub const JUST_NOW: &str = "Just now";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: u64,
    pub name: String,
    pub avatar: String,
    pub online: bool,
    pub last_seen: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRef {
    pub id: u64,
    pub title: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub user: Counterpart,
    pub book: BookRef,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: ConversationId, user: Counterpart, book: BookRef) -> Self {
        Conversation {
            id,
            user,
            book,
            last_message: String::new(),
            timestamp: String::new(),
            unread: false,
            is_typing: false,
            messages: Vec::new(),
        }
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Re-derive `last_message`/`timestamp` from the tail of the log
    pub fn sync_preview(&mut self) {
        if let Some(last) = self.messages.last() {
            self.last_message = last.content.clone();
            self.timestamp = last.timestamp.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Me,          // Current user
    Counterpart, // The other party of the conversation
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub sender_id: u64,
    pub content: String,
    pub timestamp: String,
    pub status: MessageStatus,
}

impl Message {
    /// A self-authored message at the start of its lifecycle
    pub fn outgoing(id: MessageId, conversation_id: ConversationId, content: &str) -> Self {
        Message {
            id,
            conversation_id,
            sender: Sender::Me,
            sender_id: 0,
            content: content.to_string(),
            timestamp: JUST_NOW.to_string(),
            status: MessageStatus::Sending,
        }
    }

    /// A counterpart message; these never pass through sending/sent
    pub fn incoming(
        id: MessageId,
        conversation_id: ConversationId,
        counterpart_id: u64,
        content: &str,
        timestamp: &str,
    ) -> Self {
        Message {
            id,
            conversation_id,
            sender: Sender::Counterpart,
            sender_id: counterpart_id,
            content: content.to_string(),
            timestamp: timestamp.to_string(),
            status: MessageStatus::Delivered,
        }
    }

    pub fn is_mine(&self) -> bool {
        self.sender == Sender::Me
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending = 1,   // Appended locally, not yet acknowledged
    Sent = 2,      // Accepted by the (simulated) server
    Delivered = 3, // Delivered to the counterpart's device
    Read = 4,      // Seen by the recipient
    Error = 5,     // Send was rejected
}

impl MessageStatus {
    /// Whether a self-authored message may move from `self` to `next`
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Sending, MessageStatus::Error) => true,
            (MessageStatus::Error, MessageStatus::Sending) => true,
            (MessageStatus::Error, _) | (_, MessageStatus::Error) => false,
            (current, next) => next > current,
        }
    }
}

/// User-facing notices; the presentation layer decides how to show them
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NewMessage {
        conversation_id: ConversationId,
        from: String,
        preview: String,
    },
    Offline {
        conversation_id: ConversationId,
    },
    SendFailed {
        conversation_id: ConversationId,
        message_id: MessageId,
        reason: String,
    },
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::NewMessage { from, preview, .. } => format!("New message from {}: {}", from, preview),
            Notice::Offline { .. } => "You are offline. Your message will be sent when you reconnect.".to_string(),
            Notice::SendFailed { reason, .. } => format!("Message could not be sent: {}", reason),
        }
    }
}
