// Connection stub for the simulated real-time transport
// Tracks the connected flag, dispatches named events to listeners and records
// outbound envelopes. There is no wire; nothing here ever replies.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uuid::Uuid;

use crate::error::{ChatError, Result};

use super::event_types;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Enum for representing connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// An outbound event as it would have gone over the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, String, Handler)>,
}

/// Handle returned by every registration. `unsubscribe` may be called any number of times.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
            let before = registry.listeners.len();
            registry.listeners.retain(|(id, _, _)| *id != self.id);
            if registry.listeners.len() != before {
                debug!("Removed listener {}", self.id);
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    address: Option<String>,
    registry: Arc<Mutex<Registry>>,
    outbox: Vec<Envelope>,
    fail_next: usize,
    drop_rate: f64,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            address: None,
            registry: Arc::new(Mutex::new(Registry::default())),
            outbox: Vec::new(),
            fail_next: 0,
            drop_rate: 0.0,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Start connecting. Returns true when the caller should schedule the connect
    /// completion; false when already connecting or connected.
    pub fn begin_connect(&mut self, address: &str) -> bool {
        if self.state != ConnectionState::Disconnected {
            debug!("connect({}) ignored, already {:?}", address, self.state);
            return false;
        }
        info!("Connecting to {}", address);
        self.address = Some(address.to_string());
        self.state = ConnectionState::Connecting;
        true
    }

    /// Complete a pending connect and notify connect handlers
    pub fn complete_connect(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.state = ConnectionState::Connected;
        info!("Connected to {}", self.address.as_deref().unwrap_or("unknown"));
        self.dispatch(event_types::CONNECT, &Value::Null);
    }

    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        info!("Disconnected");
        if was_connected {
            self.dispatch(event_types::DISCONNECT, &Value::Null);
        }
    }

    pub fn on_connect<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(event_types::CONNECT, move |_| handler())
    }

    pub fn on_disconnect<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(event_types::DISCONNECT, move |_| handler())
    }

    /// Register a handler for a named event. Handlers for the same type fire in registration order.
    pub fn on<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .push((id, event_type.to_string(), Arc::new(handler)));
        debug!("Registered listener {} for '{}'", id, event_type);
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry()
            .listeners
            .iter()
            .filter(|(_, kind, _)| kind == event_type)
            .count()
    }

    /// Fire every listener registered for `event_type`
    pub fn dispatch(&self, event_type: &str, payload: &Value) {
        // Collect first so handlers can (un)register without deadlocking
        let handlers: Vec<Handler> = self
            .registry()
            .listeners
            .iter()
            .filter(|(_, kind, _)| kind == event_type)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        debug!("Dispatching '{}' to {} listener(s)", event_type, handlers.len());
        for handler in handlers {
            handler(payload);
        }
    }

    /// Queue an outbound event. The stub records it and never replies.
    pub fn send(&mut self, event_type: &str, payload: Value) -> Result<Envelope> {
        if !self.is_connected() {
            warn!("Cannot send '{}': not connected", event_type);
            return Err(ChatError::NotConnected);
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            warn!("Injected failure for outbound '{}'", event_type);
            return Err(ChatError::SendFailed("injected failure".to_string()));
        }
        if self.drop_rate > 0.0 && rand::random::<f64>() < self.drop_rate {
            warn!("Dropped outbound '{}'", event_type);
            return Err(ChatError::SendFailed("dropped by transport".to_string()));
        }

        let envelope = Envelope {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            payload,
        };
        debug!("Sent '{}' ({})", envelope.event_type, envelope.id);
        self.outbox.push(envelope.clone());
        Ok(envelope)
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&mut self, count: usize) {
        self.fail_next = count;
    }

    /// Probability in [0, 1] that any send is dropped
    pub fn set_drop_rate(&mut self, rate: f64) {
        self.drop_rate = rate.clamp(0.0, 1.0);
    }

    pub fn outbox(&self) -> &[Envelope] {
        &self.outbox
    }

    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
