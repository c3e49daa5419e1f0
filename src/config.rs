use log::{debug, info};
use std::collections::HashSet;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChatError, Result};
use crate::models::{Conversation, ConversationId, MessageId, MessageStatus, Sender};

pub const DEMO_REPLY: &str =
    "Yes, it's still available! Would you like to meet up to take a look at it?";

/// One canned counterpart reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEntry {
    pub conversation_id: ConversationId,
    pub reply: String,
}

/// Timings are milliseconds on the session clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatConfig {
    pub address: String,
    pub connect_delay_ms: u64,
    pub sent_delay_ms: u64,
    pub delivered_delay_ms: u64,
    pub reply_delay_ms: u64,
    pub typing_idle_ms: u64,
    /// How long before a scripted reply the counterpart shows as typing; 0 disables it
    pub typing_lead_ms: u64,
    pub drop_rate: f64,
    pub scripts: Vec<ScriptEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<Vec<Conversation>>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            address: "ws://localhost:3001".to_string(),
            connect_delay_ms: 1000,
            sent_delay_ms: 500,
            delivered_delay_ms: 1500,
            reply_delay_ms: 3000,
            typing_idle_ms: 2000,
            typing_lead_ms: 1000,
            drop_rate: 0.0,
            scripts: vec![ScriptEntry {
                conversation_id: 1,
                reply: DEMO_REPLY.to_string(),
            }],
            seed: None,
        }
    }
}

impl ChatConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn sent_delay(&self) -> Duration {
        Duration::from_millis(self.sent_delay_ms)
    }

    pub fn delivered_delay(&self) -> Duration {
        Duration::from_millis(self.delivered_delay_ms)
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn typing_lead(&self) -> Duration {
        Duration::from_millis(self.typing_lead_ms)
    }

    /// Configured seed conversations, or the built-in demo data
    pub fn seed_conversations(&self) -> Vec<Conversation> {
        match &self.seed {
            Some(seed) => seed.clone(),
            None => crate::seed::demo_conversations(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(ChatError::Config(format!(
                "dropRate must be within 0..1, got {}",
                self.drop_rate
            )));
        }
        if self.delivered_delay_ms < self.sent_delay_ms {
            return Err(ChatError::Config(
                "deliveredDelayMs must not be shorter than sentDelayMs".to_string(),
            ));
        }
        if self.address.trim().is_empty() {
            return Err(ChatError::Config("address must not be empty".to_string()));
        }
        if let Some(seed) = &self.seed {
            validate_seed(seed)?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: ChatConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded chat config from {}", path.display());
        Ok(config)
    }

    /// Load from the override path, then the user config dir, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let path = match config_path() {
            Some(path) => path,
            None => {
                debug!("No config directory available, using defaults");
                return Ok(ChatConfig::default());
            }
        };
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(ChatConfig::default());
        }
        Self::load(&path)
    }
}

/// Seed data has to satisfy the same invariants the session keeps at runtime
fn validate_seed(seed: &[Conversation]) -> Result<()> {
    let mut conversation_ids = HashSet::new();
    for conversation in seed {
        if !conversation_ids.insert(conversation.id) {
            return Err(ChatError::Config(format!(
                "seed conversation {} appears more than once",
                conversation.id
            )));
        }

        let mut message_ids = HashSet::new();
        for message in &conversation.messages {
            // Fresh ids are allocated above the highest seeded one
            if message.id == MessageId::MAX {
                return Err(ChatError::Config(format!(
                    "seed message id {} in conversation {} leaves no room for new messages",
                    message.id, conversation.id
                )));
            }
            if !message_ids.insert(message.id) {
                return Err(ChatError::Config(format!(
                    "seed message id {} is duplicated in conversation {}",
                    message.id, conversation.id
                )));
            }
            if message.conversation_id != conversation.id {
                return Err(ChatError::Config(format!(
                    "seed message {} claims conversation {} but sits in conversation {}",
                    message.id, message.conversation_id, conversation.id
                )));
            }
            // Counterpart messages arrive delivered; they never pass through sending/sent
            if message.sender == Sender::Counterpart
                && matches!(message.status, MessageStatus::Sending | MessageStatus::Sent)
            {
                return Err(ChatError::Config(format!(
                    "seed counterpart message {} in conversation {} cannot be {:?}",
                    message.id, conversation.id, message.status
                )));
            }
        }
    }
    Ok(())
}

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Point `load_or_default` at a specific file. Only the first call takes effect.
pub fn set_config_path_override(path: PathBuf) {
    if CONFIG_PATH_OVERRIDE.set(path).is_err() {
        debug!("Config path override already set");
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bookswap-chat"))
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Some(path.clone());
    }
    get_config_dir().map(|dir| dir.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.sent_delay(), Duration::from_millis(500));
        assert_eq!(config.delivered_delay(), Duration::from_millis(1500));
        assert_eq!(config.reply_delay(), Duration::from_millis(3000));
        assert_eq!(config.typing_idle(), Duration::from_millis(2000));
        assert_eq!(config.scripts.len(), 1);
        assert_eq!(config.scripts[0].conversation_id, 1);
        assert!(config.validate().is_ok());
        assert!(!config.seed_conversations().is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sentDelayMs": 100, "deliveredDelayMs": 200, "scripts": []}}"#).unwrap();

        let config = ChatConfig::load(file.path()).unwrap();
        assert_eq!(config.sent_delay_ms, 100);
        assert_eq!(config.delivered_delay_ms, 200);
        assert_eq!(config.reply_delay_ms, 3000);
        assert!(config.scripts.is_empty());
        assert_eq!(config.address, "ws://localhost:3001");
    }

    #[test]
    fn test_invalid_drop_rate_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dropRate": 1.5}}"#).unwrap();

        let result = ChatConfig::load(file.path());
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(ChatConfig::load(file.path()), Err(ChatError::Json(_))));
    }

    #[test]
    fn test_seed_from_config() {
        let seed = serde_json::json!({
            "seed": [{
                "id": 42,
                "user": {"id": 7, "name": "Dana", "avatar": "", "online": true, "lastSeen": "now"},
                "book": {"id": 3, "title": "Organic Chemistry", "thumbnail": ""}
            }]
        });
        let config: ChatConfig = serde_json::from_value(seed).unwrap();
        let conversations = config.seed_conversations();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, 42);
        assert!(conversations[0].messages.is_empty());
        assert!(!conversations[0].unread);
    }

    fn seed_file(messages: serde_json::Value) -> tempfile::NamedTempFile {
        let config = serde_json::json!({
            "seed": [{
                "id": 42,
                "user": {"id": 7, "name": "Dana", "avatar": "", "online": true, "lastSeen": "now"},
                "book": {"id": 3, "title": "Organic Chemistry", "thumbnail": ""},
                "messages": messages
            }]
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", config).unwrap();
        file
    }

    fn seed_message(id: u64, conversation_id: u64, sender: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "conversationId": conversation_id,
            "sender": sender,
            "senderId": if sender == "me" { 0 } else { 7 },
            "content": "Is the solutions manual included?",
            "timestamp": "9:15 AM",
            "status": status
        })
    }

    #[test]
    fn test_valid_seed_file_loads() {
        let file = seed_file(serde_json::json!([
            seed_message(1, 42, "me", "read"),
            seed_message(2, 42, "counterpart", "delivered"),
        ]));
        let config = ChatConfig::load(file.path()).unwrap();
        assert_eq!(config.seed_conversations()[0].messages.len(), 2);
    }

    #[test]
    fn test_seed_counterpart_message_in_flight_rejected() {
        for status in ["sending", "sent"] {
            let file = seed_file(serde_json::json!([seed_message(1, 42, "counterpart", status)]));
            assert!(
                matches!(ChatConfig::load(file.path()), Err(ChatError::Config(_))),
                "counterpart message seeded as {} should be rejected",
                status
            );
        }
    }

    #[test]
    fn test_seed_duplicate_message_ids_rejected() {
        let file = seed_file(serde_json::json!([
            seed_message(5, 42, "me", "delivered"),
            seed_message(5, 42, "counterpart", "delivered"),
        ]));
        assert!(matches!(ChatConfig::load(file.path()), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_seed_message_in_wrong_conversation_rejected() {
        let file = seed_file(serde_json::json!([seed_message(1, 9, "me", "read")]));
        assert!(matches!(ChatConfig::load(file.path()), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_seed_max_message_id_rejected() {
        let file = seed_file(serde_json::json!([seed_message(u64::MAX, 42, "me", "read")]));
        assert!(matches!(ChatConfig::load(file.path()), Err(ChatError::Config(_))));
    }
}
