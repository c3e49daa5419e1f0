// Scripted counterparts
// Decides whether a conversation answers a sent message with a canned reply.

use std::collections::HashMap;

use crate::config::ScriptEntry;
use crate::models::{Conversation, ConversationId, Message};

pub trait Responder: Send {
    /// Reply content for `sent`, or None when this conversation stays silent
    fn reply_to(&self, conversation: &Conversation, sent: &Message) -> Option<String>;
}

/// Replies keyed by conversation id
#[derive(Debug, Clone, Default)]
pub struct ScriptTable {
    replies: HashMap<ConversationId, String>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[ScriptEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry.conversation_id, &entry.reply);
        }
        table
    }

    pub fn insert(&mut self, conversation_id: ConversationId, reply: &str) {
        self.replies.insert(conversation_id, reply.to_string());
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

impl Responder for ScriptTable {
    fn reply_to(&self, conversation: &Conversation, _sent: &Message) -> Option<String> {
        self.replies.get(&conversation.id).cloned()
    }
}

/// Never replies
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Responder for Silent {
    fn reply_to(&self, _conversation: &Conversation, _sent: &Message) -> Option<String> {
        None
    }
}
