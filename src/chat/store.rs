// Conversation store
// One copy of every conversation keyed by id; the active conversation is just an id.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::error::{ChatError, Result};
use crate::models::{Conversation, ConversationId, Message, MessageId, MessageStatus, Notice};

use super::{ChatSession, SessionUpdate};

// ------------------- Store -------------------

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<ConversationId, Conversation>,
    order: Vec<ConversationId>,
    // Bumped on every insert so timers armed for a removed conversation stay inert
    generations: HashMap<ConversationId, u64>,
    next_generation: u64,
    active: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new(seed: Vec<Conversation>) -> Self {
        let mut store = Self::default();
        for conversation in seed {
            store.insert(conversation);
        }
        store
    }

    /// Conversations in insertion order
    pub fn list(&self) -> Vec<&Conversation> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.conversations.contains_key(&id)
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    pub fn get_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(&id)
    }

    /// Insert or replace a conversation. Replacing keeps its list position but starts a new generation.
    pub fn insert(&mut self, mut conversation: Conversation) -> u64 {
        conversation.sync_preview();
        let id = conversation.id;
        // A replaced conversation keeps its slot in the list
        if self.conversations.insert(id, conversation).is_none() {
            self.order.push(id);
        }
        self.next_generation += 1;
        self.generations.insert(id, self.next_generation);
        self.next_generation
    }

    pub fn remove(&mut self, id: ConversationId) -> Option<Conversation> {
        let removed = self.conversations.remove(&id)?;
        self.order.retain(|other| *other != id);
        self.generations.remove(&id);
        if self.active == Some(id) {
            self.active = None;
        }
        Some(removed)
    }

    pub fn generation(&self, id: ConversationId) -> Option<u64> {
        self.generations.get(&id).copied()
    }

    pub fn is_current(&self, id: ConversationId, generation: u64) -> bool {
        self.generation(id) == Some(generation)
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.and_then(|id| self.conversations.get(&id))
    }

    pub fn set_active(&mut self, id: Option<ConversationId>) {
        self.active = id;
    }

    /// Append to the log and refresh the denormalized preview
    pub fn push_message(&mut self, id: ConversationId, message: Message) -> Result<&mut Conversation> {
        let conversation = self
            .conversations
            .get_mut(&id)
            .ok_or(ChatError::ConversationNotFound(id))?;
        conversation.messages.push(message);
        conversation.sync_preview();
        Ok(conversation)
    }

    /// Move a message to `status` if the lifecycle allows it.
    /// Returns the previous status when something changed.
    pub fn set_status(
        &mut self,
        id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<Option<MessageStatus>> {
        let conversation = self
            .conversations
            .get_mut(&id)
            .ok_or(ChatError::ConversationNotFound(id))?;
        let message = conversation
            .message_mut(message_id)
            .ok_or(ChatError::MessageNotFound {
                conversation_id: id,
                message_id,
            })?;

        let previous = message.status;
        let allowed = if message.is_mine() {
            previous.can_advance_to(status)
        } else {
            // Counterpart messages only ever go delivered -> read
            previous == MessageStatus::Delivered && status == MessageStatus::Read
        };
        if !allowed {
            return Ok(None);
        }
        message.status = status;
        Ok(Some(previous))
    }
}

// ------------------- Selection and Mutation -------------------

/// Selection and mutation operations exposed to the presentation layer
impl ChatSession {
    pub fn list_conversations(&self) -> Vec<&Conversation> {
        self.store.list()
    }

    /// Open a conversation, acknowledging anything unread in it
    pub fn select_conversation(&mut self, id: ConversationId) -> Result<()> {
        if !self.store.contains(id) {
            warn!("Tried to select unknown conversation {}", id);
            return Err(ChatError::ConversationNotFound(id));
        }

        // Reselecting the open thread only re-runs the unread acknowledgement
        let previous = self.store.active_id();
        if previous != Some(id) {
            if let Some(previous) = previous {
                self.cancel_typing(previous);
            }
            self.store.set_active(Some(id));
            debug!("Active conversation is now {}", id);
            self.publish(SessionUpdate::Selected(Some(id)));
        }

        self.acknowledge_unread(id);
        Ok(())
    }

    /// Close the open conversation, if any
    pub fn clear_selection(&mut self) {
        if let Some(previous) = self.store.active_id() {
            self.cancel_typing(previous);
            self.store.set_active(None);
            self.publish(SessionUpdate::Selected(None));
        }
    }

    /// Append a message. Anything landing outside the open thread marks it
    /// unread and raises a notice, whoever wrote it.
    pub fn append_message(&mut self, conversation_id: ConversationId, message: Message) -> Result<()> {
        let is_active = self.store.active_id() == Some(conversation_id);
        let incoming = !message.is_mine();
        let appended = message.clone();

        let conversation = self.store.push_message(conversation_id, message)?;

        // A counterpart message ends whatever they were typing
        let mut stopped_typing = false;
        if incoming {
            stopped_typing = conversation.is_typing;
            conversation.is_typing = false;
        }
        if !is_active {
            conversation.unread = true;
        }
        let from = if incoming {
            conversation.user.name.clone()
        } else {
            // Own message from elsewhere (another device, a replayed history)
            "You".to_string()
        };

        self.publish(SessionUpdate::MessageAppended {
            conversation_id,
            message: appended.clone(),
        });
        if stopped_typing {
            self.publish(SessionUpdate::CounterpartTyping {
                conversation_id,
                is_typing: false,
            });
        }
        if !is_active {
            self.notify(Notice::NewMessage {
                conversation_id,
                from,
                preview: appended.content,
            });
        }
        Ok(())
    }

    pub fn add_conversation(&mut self, conversation: Conversation) {
        let id = conversation.id;
        if self.store.contains(id) {
            // Replacing drops any typing state tied to the old copy
            self.cancel_typing(id);
        }
        self.last_message_id = conversation
            .messages
            .iter()
            .map(|m| m.id)
            .fold(self.last_message_id, u64::max);
        self.store.insert(conversation);
        info!("Added conversation {}", id);
        self.publish(SessionUpdate::ConversationAdded(id));
    }

    /// Remove a conversation. In-flight timers armed for it become no-ops.
    pub fn remove_conversation(&mut self, id: ConversationId) -> Result<Conversation> {
        let was_active = self.store.active_id() == Some(id);
        self.cancel_typing(id);
        let removed = self
            .store
            .remove(id)
            .ok_or(ChatError::ConversationNotFound(id))?;
        info!("Removed conversation {}", id);
        self.publish(SessionUpdate::ConversationRemoved(id));
        if was_active {
            self.publish(SessionUpdate::Selected(None));
        }
        Ok(removed)
    }
}
