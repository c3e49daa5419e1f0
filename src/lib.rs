// Messaging core for the textbook marketplace
pub mod chat;
pub mod config;
pub mod driver;
pub mod error;
pub mod models;
pub mod seed;

// Re-export main types for convenience
pub use chat::{ChatSession, SessionUpdate};
pub use config::ChatConfig;
pub use error::ChatError;
pub use models::*;
