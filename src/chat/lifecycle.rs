// Outgoing message lifecycle
// sending -> sent -> delivered on fixed delays, error when the transport rejects
// the send, plus scripted counterpart replies.

use log::{debug, error, info, warn};
use serde_json::json;

use crate::error::{ChatError, Result};
use crate::models::{ConversationId, Message, MessageId, MessageStatus, Notice, JUST_NOW};

use super::{event_types, ChatSession, SessionUpdate, TimerTask};

// ------------------- Sending -------------------

impl ChatSession {
    /// Send `text` to the open conversation. Returns the new message id, or None
    /// when the text is blank or `conversation_id` is not the open conversation.
    pub fn send_message(&mut self, conversation_id: ConversationId, text: &str) -> Option<MessageId> {
        let content = text.trim();
        if content.is_empty() {
            debug!("Ignoring blank message for conversation {}", conversation_id);
            return None;
        }
        // Only the open thread has an input box to send from
        match self.store.active_id() {
            Some(active) if active == conversation_id => {}
            Some(active) => {
                debug!(
                    "Ignoring message for conversation {}, conversation {} is open",
                    conversation_id, active
                );
                return None;
            }
            None => {
                debug!("Ignoring message, no active conversation");
                return None;
            }
        }
        let generation = match self.store.generation(conversation_id) {
            Some(generation) => generation,
            None => {
                warn!("Cannot send to unknown conversation {}", conversation_id);
                return None;
            }
        };

        // Append before dispatch so the thread shows the message even if the send fails
        let message_id = self.next_message_id();
        let message = Message::outgoing(message_id, conversation_id, content);
        if let Err(e) = self.append_message(conversation_id, message.clone()) {
            error!("Failed to append message {}: {}", message_id, e);
            return None;
        }
        info!("Queued message {} for conversation {}", message_id, conversation_id);

        if self.dispatch_outgoing(&message) {
            self.arm_lifecycle(generation, &message);
        }
        Some(message_id)
    }

    /// Resend a message that ended in `Error`. Returns false when the message was not failed.
    pub fn retry_message(&mut self, conversation_id: ConversationId, message_id: MessageId) -> Result<bool> {
        let generation = self
            .store
            .generation(conversation_id)
            .ok_or(ChatError::ConversationNotFound(conversation_id))?;
        let message = self
            .store
            .get(conversation_id)
            .and_then(|c| c.message(message_id))
            .cloned()
            .ok_or(ChatError::MessageNotFound {
                conversation_id,
                message_id,
            })?;

        if message.status != MessageStatus::Error || !message.is_mine() {
            debug!("Message {} is {:?}, nothing to retry", message_id, message.status);
            return Ok(false);
        }

        info!("Retrying message {}", message_id);
        self.apply_status(conversation_id, message_id, MessageStatus::Sending);
        if self.dispatch_outgoing(&message) {
            self.arm_lifecycle(generation, &message);
        }
        Ok(true)
    }

    // ------------------- Dispatch -------------------

    /// Hand the message to the connection. Returns false when it failed and no
    /// lifecycle timers should run.
    fn dispatch_outgoing(&mut self, message: &Message) -> bool {
        let conversation_id = message.conversation_id;
        if !self.connection.is_connected() {
            // Accepted optimistically; nothing is queued for later delivery
            warn!("Offline, message {} kept locally", message.id);
            self.notify(Notice::Offline { conversation_id });
            return true;
        }

        let payload = json!({
            "conversationId": conversation_id,
            "messageId": message.id,
            "content": message.content,
        });
        match self.connection.send(event_types::MESSAGE, payload) {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to send message {}: {}", message.id, e);
                self.apply_status(conversation_id, message.id, MessageStatus::Error);
                self.notify(Notice::SendFailed {
                    conversation_id,
                    message_id: message.id,
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    fn arm_lifecycle(&mut self, generation: u64, message: &Message) {
        let conversation_id = message.conversation_id;
        self.scheduler.schedule(
            self.config.sent_delay(),
            TimerTask::MarkSent {
                conversation_id,
                generation,
                message_id: message.id,
            },
        );
        self.scheduler.schedule(
            self.config.delivered_delay(),
            TimerTask::MarkDelivered {
                conversation_id,
                generation,
                message_id: message.id,
            },
        );

        let reply = self
            .store
            .get(conversation_id)
            .and_then(|conversation| self.responder.reply_to(conversation, message));
        if let Some(content) = reply {
            let reply_delay = self.config.reply_delay();
            let lead = self.config.typing_lead();
            // No typing indicator when the lead would start at or before the send
            if !lead.is_zero() && lead < reply_delay {
                self.scheduler.schedule(
                    reply_delay - lead,
                    TimerTask::CounterpartTyping {
                        conversation_id,
                        generation,
                    },
                );
            }
            self.scheduler.schedule(
                reply_delay,
                TimerTask::ScriptedReply {
                    conversation_id,
                    generation,
                    content,
                },
            );
        }
    }

    // ------------------- Timer Entry Points -------------------

    /// Timer entry point for sent/delivered transitions
    pub(crate) fn advance_status(
        &mut self,
        conversation_id: ConversationId,
        generation: u64,
        message_id: MessageId,
        status: MessageStatus,
    ) {
        if !self.store.is_current(conversation_id, generation) {
            debug!(
                "Dropping {:?} for message {}: conversation {} is gone",
                status, message_id, conversation_id
            );
            return;
        }
        self.apply_status(conversation_id, message_id, status);
    }

    pub(crate) fn apply_status(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> bool {
        match self.store.set_status(conversation_id, message_id, status) {
            Ok(Some(previous)) => {
                debug!("Message {} status {:?} -> {:?}", message_id, previous, status);
                self.publish(SessionUpdate::StatusChanged {
                    conversation_id,
                    message_id,
                    status,
                });
                true
            }
            Ok(None) => {
                debug!("Message {} not moved to {:?}", message_id, status);
                false
            }
            Err(e) => {
                debug!("Status update skipped: {}", e);
                false
            }
        }
    }

    pub(crate) fn deliver_scripted_reply(
        &mut self,
        conversation_id: ConversationId,
        generation: u64,
        content: &str,
    ) {
        if !self.store.is_current(conversation_id, generation) {
            debug!("Dropping scripted reply for removed conversation {}", conversation_id);
            return;
        }
        let counterpart_id = match self.store.get(conversation_id) {
            Some(conversation) => conversation.user.id,
            None => return,
        };
        let message_id = self.next_message_id();
        let reply = Message::incoming(message_id, conversation_id, counterpart_id, content, JUST_NOW);
        if let Err(e) = self.append_message(conversation_id, reply) {
            error!("Failed to append scripted reply: {}", e);
        }
    }
}
