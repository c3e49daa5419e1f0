#![deny(dead_code)]
use anyhow::{anyhow, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

mod utils;

use bookswap_chat::chat::{ChatSession, SessionUpdate};
use bookswap_chat::config::{self, ChatConfig};
use bookswap_chat::driver::{self, SharedSession};
use bookswap_chat::models::{Conversation, MessageStatus, Sender};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Simulated textbook marketplace inbox.",
    long_about = "Runs the marketplace messaging core against a simulated server.\n\n\
    Type a line to send it to the open conversation, or use /list, /open <id>, /close,\n\
    /connect, /disconnect, /retry <message id>, /quit."
)]
struct Args {
    /// JSON config file; defaults to <config dir>/bookswap-chat/config.json
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs here instead of stdout
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,

    /// Overrides the address from the config
    #[arg(long, value_name = "ADDR")]
    address: Option<String>,
}

enum Command {
    List,
    Open(u64),
    Close,
    Connect,
    Disconnect,
    Retry(u64),
    Quit,
    Say(String),
}

fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim_end();
    if !line.starts_with('/') {
        return Ok(Command::Say(line.to_string()));
    }
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let mut id = || -> Result<u64> {
        parts
            .next()
            .ok_or_else(|| anyhow!("{} needs an id", name))?
            .parse::<u64>()
            .map_err(|e| anyhow!("invalid id: {}", e))
    };
    match name {
        "/list" => Ok(Command::List),
        "/open" => Ok(Command::Open(id()?)),
        "/close" => Ok(Command::Close),
        "/connect" => Ok(Command::Connect),
        "/disconnect" => Ok(Command::Disconnect),
        "/retry" => Ok(Command::Retry(id()?)),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(anyhow!("unknown command {}", other)),
    }
}

fn print_conversation(conversation: &Conversation, active: bool) {
    let marker = if active { ">" } else { " " };
    let unread = if conversation.unread { "*" } else { " " };
    println!(
        "{}{} [{}] {} - {} ({})",
        marker, unread, conversation.id, conversation.user.name, conversation.book.title, conversation.timestamp
    );
    println!("{}", textwrap::indent(&textwrap::fill(&conversation.last_message, 64), "      "));
}

fn print_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::ConnectionChanged(connected) => {
            println!("-- {}", if *connected { "connected" } else { "disconnected" });
        }
        SessionUpdate::MessageAppended { conversation_id, message } => {
            let who = match message.sender {
                Sender::Me => "you",
                Sender::Counterpart => "them",
            };
            let body = textwrap::fill(&message.content, 64);
            println!("[{}] {} ({}, #{}):", conversation_id, who, message.timestamp, message.id);
            println!("{}", textwrap::indent(&body, "    "));
        }
        SessionUpdate::StatusChanged { message_id, status, .. } => {
            let label = match status {
                MessageStatus::Sending => "sending",
                MessageStatus::Sent => "sent",
                MessageStatus::Delivered => "delivered",
                MessageStatus::Read => "read",
                MessageStatus::Error => "failed",
            };
            println!("   #{} {}", message_id, label);
        }
        SessionUpdate::CounterpartTyping { conversation_id, is_typing: true } => {
            println!("[{}] typing...", conversation_id);
        }
        SessionUpdate::Notice(notice) => println!("!! {}", notice.text()),
        _ => {}
    }
}

async fn handle_command(session: &SharedSession, command: Command, address: &str) -> Result<bool> {
    let mut session = session.lock().await;
    match command {
        Command::List => {
            let active = session.active_id();
            for conversation in session.conversations() {
                print_conversation(conversation, Some(conversation.id) == active);
            }
        }
        Command::Open(id) => session.select_conversation(id)?,
        Command::Close => session.clear_selection(),
        Command::Connect => session.connect(address),
        Command::Disconnect => session.disconnect(),
        Command::Retry(message_id) => {
            let conversation_id = session
                .active_id()
                .ok_or_else(|| anyhow!("open a conversation first"))?;
            if !session.retry_message(conversation_id, message_id)? {
                println!("message #{} has not failed", message_id);
            }
        }
        Command::Quit => return Ok(false),
        Command::Say(text) => match session.active_id() {
            Some(conversation_id) => {
                // Mirror an input box: typing, send, then the box clears
                session.on_input_change(conversation_id, &text);
                session.send_message(conversation_id, &text);
                session.on_input_change(conversation_id, "");
            }
            None => println!("open a conversation first (/list, /open <id>)"),
        },
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(args.log_file.as_deref(), args.log_level)?;
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    if let Some(path) = &args.config {
        config::set_config_path_override(path.clone());
    }
    let config = ChatConfig::load_or_default()?;
    let address = args.address.clone().unwrap_or_else(|| config.address.clone());

    let (session, mut updates) = ChatSession::new(config);
    let session = driver::shared(session);
    session.lock().await.connect(&address);
    let clock = driver::spawn_clock(session.clone(), Duration::from_millis(50));

    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            print_update(&update);
        }
    });

    println!("Connecting to {}... type /list to see conversations", address);

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match handle_command(&session, command, &address).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                error!("Command failed: {}", e);
                println!("{}", e);
            }
        }
    }

    info!("Shutting down");
    clock.abort();
    printer.abort();
    Ok(())
}
