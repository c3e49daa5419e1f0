// Typing indicators
// Local typing is debounced per conversation: one start event, an idle timer that
// is re-armed on every keystroke, and one stop event when input goes idle or empty.

use log::debug;
use serde_json::json;

use crate::models::ConversationId;

use super::{event_types, ChatSession, SessionUpdate, TimerId, TimerTask};

impl ChatSession {
    /// Feed the current contents of the input box
    pub fn on_input_change(&mut self, conversation_id: ConversationId, text: &str) {
        if text.is_empty() {
            if let Some(timer) = self.typing_timers.remove(&conversation_id) {
                self.scheduler.cancel(timer);
                self.emit_typing(conversation_id, false);
            }
            return;
        }
        if !self.store.contains(conversation_id) {
            debug!("Ignoring input for unknown conversation {}", conversation_id);
            return;
        }

        match self.typing_timers.get(&conversation_id).copied() {
            Some(timer) => {
                self.scheduler.cancel(timer);
            }
            None => self.emit_typing(conversation_id, true),
        }
        let timer = self.scheduler.schedule(
            self.config.typing_idle(),
            TimerTask::TypingIdle { conversation_id },
        );
        self.typing_timers.insert(conversation_id, timer);
    }

    /// Whether a typing-start is outstanding for the conversation
    pub fn is_typing_armed(&self, conversation_id: ConversationId) -> bool {
        self.typing_timers.contains_key(&conversation_id)
    }

    /// Drop the idle timer without emitting a stop, for when the view goes away
    pub fn cancel_typing(&mut self, conversation_id: ConversationId) -> bool {
        match self.typing_timers.remove(&conversation_id) {
            Some(timer) => {
                self.scheduler.cancel(timer);
                debug!("Cancelled typing timer for conversation {}", conversation_id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn typing_idle_elapsed(&mut self, conversation_id: ConversationId, timer: TimerId) {
        // A re-armed conversation holds a newer timer id; ignore the old one
        if self.typing_timers.get(&conversation_id) != Some(&timer) {
            return;
        }
        self.typing_timers.remove(&conversation_id);
        self.emit_typing(conversation_id, false);
    }

    fn emit_typing(&mut self, conversation_id: ConversationId, is_typing: bool) {
        debug!("Local typing {} in conversation {}", is_typing, conversation_id);
        self.publish(SessionUpdate::LocalTyping {
            conversation_id,
            is_typing,
        });
        if self.connection.is_connected() {
            let payload = json!({
                "conversationId": conversation_id,
                "isTyping": is_typing,
            });
            if let Err(e) = self.connection.send(event_types::TYPING, payload) {
                debug!("Failed to send typing state: {}", e);
            }
        }
    }

    /// Counterpart typing flag, driven by inbound events and scripted replies
    pub(crate) fn set_counterpart_typing(&mut self, conversation_id: ConversationId, is_typing: bool) -> bool {
        let conversation = match self.store.get_mut(conversation_id) {
            Some(conversation) => conversation,
            None => return false,
        };
        if conversation.is_typing == is_typing {
            return true;
        }
        conversation.is_typing = is_typing;
        self.publish(SessionUpdate::CounterpartTyping {
            conversation_id,
            is_typing,
        });
        true
    }
}
