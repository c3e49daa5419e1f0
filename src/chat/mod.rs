// Chat session for the marketplace inbox
// Owns the conversation store, the connection stub and the timer queue, and is
// the single entry point the presentation layer talks to.

use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod connection;
pub mod lifecycle;
pub mod receipts;
pub mod responder;
pub mod scheduler;
pub mod store;
pub mod typing;

pub use connection::{Connection, ConnectionState, Envelope, Subscription};
pub use responder::{Responder, ScriptTable, Silent};
pub use scheduler::{Scheduler, TimerId, TimerTask};
pub use store::ConversationStore;

use crate::config::ChatConfig;
use crate::models::{Conversation, ConversationId, Message, MessageId, MessageStatus, Notice};

// Event names understood by the connection stub
pub mod event_types {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const MESSAGE: &str = "message";
    pub const TYPING: &str = "typing";
    pub const READ_RECEIPT: &str = "read_receipt";
}

/// State changes published to whoever renders the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    ConnectionChanged(bool),
    Selected(Option<ConversationId>),
    ConversationAdded(ConversationId),
    ConversationRemoved(ConversationId),
    MessageAppended {
        conversation_id: ConversationId,
        message: Message,
    },
    StatusChanged {
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    },
    ConversationRead(ConversationId),
    CounterpartTyping {
        conversation_id: ConversationId,
        is_typing: bool,
    },
    LocalTyping {
        conversation_id: ConversationId,
        is_typing: bool,
    },
    Notice(Notice),
}

pub struct ChatSession {
    config: ChatConfig,
    store: ConversationStore,
    connection: Connection,
    scheduler: Scheduler,
    responder: Box<dyn Responder>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    // Armed idle timers for local typing, one per conversation
    typing_timers: HashMap<ConversationId, TimerId>,
    connect_timer: Option<TimerId>,
    last_message_id: MessageId,
}

impl ChatSession {
    pub fn new(config: ChatConfig) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let responder = ScriptTable::from_entries(&config.scripts);
        Self::with_responder(config, Box::new(responder))
    }

    pub fn with_responder(
        config: ChatConfig,
        responder: Box<dyn Responder>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let conversations = config.seed_conversations();
        let last_message_id = conversations
            .iter()
            .flat_map(|c| c.messages.iter().map(|m| m.id))
            .max()
            .unwrap_or(0);

        let mut connection = Connection::new();
        connection.set_drop_rate(config.drop_rate);

        debug!("Session created with {} conversation(s)", conversations.len());

        (
            Self {
                store: ConversationStore::new(conversations),
                config,
                connection,
                scheduler: Scheduler::new(),
                responder,
                updates,
                typing_timers: HashMap::new(),
                connect_timer: None,
                last_message_id,
            },
            updates_rx,
        )
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn conversations(&self) -> Vec<&Conversation> {
        self.store.list()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.store.get(id)
    }

    /// The open thread, looked up from the store on every call
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.store.active()
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.store.active_id()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Elapsed time on the session clock
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn next_due_in(&self) -> Option<Duration> {
        self.scheduler.next_due_in()
    }

    /// Begin connecting; the flag flips after the configured connect delay
    pub fn connect(&mut self, address: &str) {
        if self.connection.begin_connect(address) {
            let timer = self
                .scheduler
                .schedule(self.config.connect_delay(), TimerTask::Connect);
            self.connect_timer = Some(timer);
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(timer) = self.connect_timer.take() {
            self.scheduler.cancel(timer);
        }
        let was_connected = self.connection.is_connected();
        self.connection.disconnect();
        if was_connected {
            self.publish(SessionUpdate::ConnectionChanged(false));
        }
    }

    /// Run every timer due within `by`, then move the clock to the end of the window
    pub fn advance(&mut self, by: Duration) {
        let until = self.scheduler.now() + by;
        while let Some((id, task)) = self.scheduler.pop_due(until) {
            self.run_task(id, task);
        }
        self.scheduler.set_now(until);
    }

    /// Advance until no timers remain
    pub fn run_pending(&mut self) {
        while let Some(wait) = self.scheduler.next_due_in() {
            self.advance(wait);
        }
    }

    fn run_task(&mut self, id: TimerId, task: TimerTask) {
        debug!("Timer {} fired at {:?}: {:?}", id, self.scheduler.now(), task);
        match task {
            TimerTask::Connect => {
                self.connect_timer = None;
                self.connection.complete_connect();
                if self.connection.is_connected() {
                    self.publish(SessionUpdate::ConnectionChanged(true));
                }
            }
            TimerTask::MarkSent {
                conversation_id,
                generation,
                message_id,
            } => self.advance_status(conversation_id, generation, message_id, MessageStatus::Sent),
            TimerTask::MarkDelivered {
                conversation_id,
                generation,
                message_id,
            } => self.advance_status(
                conversation_id,
                generation,
                message_id,
                MessageStatus::Delivered,
            ),
            TimerTask::CounterpartTyping {
                conversation_id,
                generation,
            } => {
                if self.store.is_current(conversation_id, generation) {
                    self.set_counterpart_typing(conversation_id, true);
                }
            }
            TimerTask::ScriptedReply {
                conversation_id,
                generation,
                content,
            } => self.deliver_scripted_reply(conversation_id, generation, &content),
            TimerTask::TypingIdle { conversation_id } => {
                self.typing_idle_elapsed(conversation_id, id)
            }
        }
    }

    pub(crate) fn publish(&self, update: SessionUpdate) {
        if self.updates.send(update).is_err() {
            debug!("Session update dropped, no receiver");
        }
    }

    pub(crate) fn notify(&self, notice: Notice) {
        info!("{}", notice.text());
        self.publish(SessionUpdate::Notice(notice));
    }

    /// Millisecond clock value, bumped past the last id so rapid sends never collide
    pub(crate) fn next_message_id(&mut self) -> MessageId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        // Saturates rather than wrapping; configs carrying MessageId::MAX are rejected on load
        let id = now.max(self.last_message_id.saturating_add(1));
        self.last_message_id = id;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (ChatSession, mpsc::UnboundedReceiver<SessionUpdate>) {
        ChatSession::new(ChatConfig::default())
    }

    #[test]
    fn test_connect_after_delay() {
        let (mut session, mut updates) = session();
        assert!(!session.is_connected());

        session.connect("ws://localhost:3001");
        session.connect("ws://localhost:3001");
        assert_eq!(session.pending_timers(), 1);

        session.advance(Duration::from_millis(999));
        assert!(!session.is_connected());
        session.advance(Duration::from_millis(1));
        assert!(session.is_connected());
        assert_eq!(updates.try_recv().unwrap(), SessionUpdate::ConnectionChanged(true));
    }

    #[test]
    fn test_disconnect_cancels_pending_connect() {
        let (mut session, _updates) = session();
        session.connect("ws://localhost:3001");
        session.disconnect();
        session.run_pending();
        assert!(!session.is_connected());
        assert_eq!(session.pending_timers(), 0);
    }

    #[test]
    fn test_message_ids_are_unique_and_increasing() {
        let (mut session, _updates) = session();
        let ids: Vec<MessageId> = (0..100).map(|_| session.next_message_id()).collect();
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_message_id_at_ceiling_does_not_overflow() {
        let mut config = ChatConfig::default();
        let mut seed = crate::seed::demo_conversations();
        seed[0].messages[0].id = MessageId::MAX;
        config.seed = Some(seed);
        assert!(config.validate().is_err());

        // Built directly, bypassing validation
        let (mut session, _updates) = ChatSession::new(config);
        assert_eq!(session.next_message_id(), MessageId::MAX);
    }

    #[test]
    fn test_advance_moves_clock_without_timers() {
        let (mut session, _updates) = session();
        session.advance(Duration::from_millis(250));
        assert_eq!(session.now(), Duration::from_millis(250));
    }
}
