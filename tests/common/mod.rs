// Common test utilities for integration tests
#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use log::LevelFilter;
use tokio::sync::mpsc::UnboundedReceiver;

use bookswap_chat::chat::{ChatSession, SessionUpdate};
use bookswap_chat::config::ChatConfig;
use bookswap_chat::models::{ConversationId, MessageId, MessageStatus};

pub const ADDRESS: &str = "ws://localhost:3001";

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// A session on the default demo data, connected and with the connect update drained
pub fn connected_session() -> (ChatSession, UnboundedReceiver<SessionUpdate>) {
    setup_logging();
    let (mut session, mut updates) = ChatSession::new(ChatConfig::default());
    session.connect(ADDRESS);
    session.advance(session.config().connect_delay());
    assert!(session.is_connected(), "session should be connected after the connect delay");
    drain(&mut updates);
    (session, updates)
}

pub fn offline_session() -> (ChatSession, UnboundedReceiver<SessionUpdate>) {
    setup_logging();
    ChatSession::new(ChatConfig::default())
}

pub fn drain(updates: &mut UnboundedReceiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    seen
}

pub fn status_of(session: &ChatSession, conversation_id: ConversationId, message_id: MessageId) -> MessageStatus {
    session
        .conversation(conversation_id)
        .and_then(|c| c.message(message_id))
        .map(|m| m.status)
        .unwrap_or_else(|| panic!("message {} missing from conversation {}", message_id, conversation_id))
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Every conversation's preview mirrors its newest message
pub fn assert_previews_in_sync(session: &ChatSession) {
    for conversation in session.conversations() {
        if let Some(last) = conversation.last() {
            assert_eq!(conversation.last_message, last.content, "preview of conversation {}", conversation.id);
            assert_eq!(conversation.timestamp, last.timestamp, "timestamp of conversation {}", conversation.id);
        }
    }
}
