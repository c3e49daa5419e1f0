// Read receipts and inbound events
// Opening an unread conversation marks counterpart messages read and tells the
// other side; inbound events from the simulated server loop back into the store.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ChatError, Result};
use crate::models::{ConversationId, Message, MessageId, MessageStatus};

use super::{event_types, ChatSession, SessionUpdate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundMessage {
    conversation_id: ConversationId,
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundTyping {
    conversation_id: ConversationId,
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundReceipt {
    conversation_id: ConversationId,
    #[serde(default)]
    message_id: Option<MessageId>,
    #[serde(default)]
    message_ids: Vec<MessageId>,
}

impl InboundReceipt {
    fn ids(&self) -> Vec<MessageId> {
        let mut ids = self.message_ids.clone();
        if let Some(id) = self.message_id {
            ids.push(id);
        }
        ids
    }
}

fn parse<T: for<'de> Deserialize<'de>>(event_type: &str, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| ChatError::InvalidPayload(format!("{}: {}", event_type, e)))
}

fn display_time() -> String {
    chrono::Local::now().format("%-I:%M %p").to_string()
}

impl ChatSession {
    /// Clear `unread` and mark counterpart messages read, sending a receipt for each while connected
    pub(crate) fn acknowledge_unread(&mut self, conversation_id: ConversationId) {
        let unread: Vec<MessageId> = match self.store.get_mut(conversation_id) {
            Some(conversation) if conversation.unread => {
                conversation.unread = false;
                conversation
                    .messages
                    .iter()
                    .filter(|m| !m.is_mine() && m.status != MessageStatus::Read)
                    .map(|m| m.id)
                    .collect()
            }
            _ => return,
        };
        debug!(
            "Conversation {} opened with {} unread message(s)",
            conversation_id,
            unread.len()
        );

        for message_id in unread {
            if self.connection.is_connected() {
                let payload = json!({
                    "conversationId": conversation_id,
                    "messageId": message_id,
                });
                if let Err(e) = self.connection.send(event_types::READ_RECEIPT, payload) {
                    warn!("Failed to send read receipt for {}: {}", message_id, e);
                }
            }
            self.apply_status(conversation_id, message_id, MessageStatus::Read);
        }
        self.publish(SessionUpdate::ConversationRead(conversation_id));
    }

    /// Apply an event as if the server had pushed it, then hand it to registered listeners
    pub fn ingest(&mut self, event_type: &str, payload: Value) -> Result<()> {
        match event_type {
            event_types::MESSAGE => {
                let inbound: InboundMessage = parse(event_type, &payload)?;
                if inbound.content.trim().is_empty() {
                    return Err(ChatError::InvalidPayload("message: empty content".to_string()));
                }
                let counterpart_id = self
                    .store
                    .get(inbound.conversation_id)
                    .map(|c| c.user.id)
                    .ok_or(ChatError::ConversationNotFound(inbound.conversation_id))?;
                let message_id = self.next_message_id();
                let timestamp = inbound.timestamp.unwrap_or_else(display_time);
                let message = Message::incoming(
                    message_id,
                    inbound.conversation_id,
                    counterpart_id,
                    &inbound.content,
                    &timestamp,
                );
                self.append_message(inbound.conversation_id, message)?;
            }
            event_types::TYPING => {
                let inbound: InboundTyping = parse(event_type, &payload)?;
                if !self.set_counterpart_typing(inbound.conversation_id, inbound.is_typing) {
                    return Err(ChatError::ConversationNotFound(inbound.conversation_id));
                }
            }
            event_types::READ_RECEIPT => {
                let receipt: InboundReceipt = parse(event_type, &payload)?;
                let conversation = self
                    .store
                    .get(receipt.conversation_id)
                    .ok_or(ChatError::ConversationNotFound(receipt.conversation_id))?;
                let ids: Vec<MessageId> = receipt
                    .ids()
                    .into_iter()
                    .filter(|id| conversation.message(*id).map_or(false, |m| m.is_mine()))
                    .collect();
                for id in ids {
                    self.apply_status(receipt.conversation_id, id, MessageStatus::Read);
                }
            }
            other => {
                debug!("No handling for inbound '{}'", other);
            }
        }

        self.connection.dispatch(event_type, &payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn connected_session() -> ChatSession {
        let (mut session, _updates) = ChatSession::new(ChatConfig::default());
        session.connect("ws://localhost:3001");
        session.run_pending();
        session
    }

    fn receipts_sent(session: &ChatSession) -> usize {
        session
            .connection()
            .outbox()
            .iter()
            .filter(|e| e.event_type == event_types::READ_RECEIPT)
            .count()
    }

    #[test]
    fn test_opening_unread_marks_counterpart_messages_read() {
        let mut session = connected_session();
        assert!(session.conversation(1).unwrap().unread);

        session.select_conversation(1).unwrap();
        let conversation = session.conversation(1).unwrap();
        assert!(!conversation.unread);
        assert!(conversation
            .messages
            .iter()
            .filter(|m| !m.is_mine())
            .all(|m| m.status == MessageStatus::Read));
        assert_eq!(receipts_sent(&session), 2);

        session.select_conversation(1).unwrap();
        assert_eq!(receipts_sent(&session), 2);
    }

    #[test]
    fn test_offline_open_sends_no_receipts() {
        let (mut session, _updates) = ChatSession::new(ChatConfig::default());
        session.select_conversation(1).unwrap();
        assert!(!session.conversation(1).unwrap().unread);
        assert_eq!(receipts_sent(&session), 0);
    }

    #[test]
    fn test_inbound_message_in_background_conversation() {
        let mut session = connected_session();
        session.select_conversation(2).unwrap();
        session
            .ingest(
                event_types::MESSAGE,
                json!({"conversationId": 3, "content": "Still want the econ book?", "timestamp": "4:05 PM"}),
            )
            .unwrap();

        let conversation = session.conversation(3).unwrap();
        assert!(conversation.unread);
        assert_eq!(conversation.last_message, "Still want the econ book?");
        assert_eq!(conversation.timestamp, "4:05 PM");
        assert_eq!(conversation.last().unwrap().status, MessageStatus::Delivered);
    }

    #[test]
    fn test_inbound_typing_and_listeners() {
        let mut session = connected_session();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        session.connection().on(event_types::TYPING, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session
            .ingest(event_types::TYPING, json!({"conversationId": 2, "isTyping": true}))
            .unwrap();
        assert!(session.conversation(2).unwrap().is_typing);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let result = session.ingest(event_types::TYPING, json!({"conversationId": 2}));
        assert!(matches!(result, Err(ChatError::InvalidPayload(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inbound_read_receipt_marks_own_messages() {
        let mut session = connected_session();
        session.select_conversation(3).unwrap();
        let own = session.conversation(3).unwrap().messages[0].id;

        session
            .ingest(event_types::READ_RECEIPT, json!({"conversationId": 3, "messageIds": [own]}))
            .unwrap();
        assert_eq!(
            session.conversation(3).unwrap().message(own).unwrap().status,
            MessageStatus::Read
        );
    }

    #[test]
    fn test_inbound_for_unknown_conversation() {
        let mut session = connected_session();
        let result = session.ingest(event_types::MESSAGE, json!({"conversationId": 9, "content": "hi"}));
        assert!(matches!(result, Err(ChatError::ConversationNotFound(9))));
        assert!(session.ingest("presence", json!({})).is_ok());
    }
}
