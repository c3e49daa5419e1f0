// Built-in demo conversations for the marketplace inbox

use crate::models::{BookRef, Conversation, Counterpart, Message, MessageStatus, Sender};

fn message(
    id: u64,
    conversation_id: u64,
    sender: Sender,
    sender_id: u64,
    content: &str,
    timestamp: &str,
    status: MessageStatus,
) -> Message {
    Message {
        id,
        conversation_id,
        sender,
        sender_id,
        content: content.to_string(),
        timestamp: timestamp.to_string(),
        status,
    }
}

fn conversation(
    id: u64,
    user: Counterpart,
    book: BookRef,
    unread: bool,
    messages: Vec<Message>,
) -> Conversation {
    let mut conversation = Conversation::new(id, user, book);
    conversation.unread = unread;
    conversation.messages = messages;
    conversation.sync_preview();
    conversation
}

pub fn demo_conversations() -> Vec<Conversation> {
    vec![
        conversation(
            1,
            Counterpart {
                id: 101,
                name: "Sarah Johnson".to_string(),
                avatar: "/avatars/sarah.jpg".to_string(),
                online: true,
                last_seen: "Online".to_string(),
            },
            BookRef {
                id: 1,
                title: "Calculus: Early Transcendentals".to_string(),
                thumbnail: "/books/calculus.jpg".to_string(),
            },
            true,
            vec![
                message(1, 1, Sender::Me, 0, "Hi! Is the calculus book still available?", "10:30 AM", MessageStatus::Read),
                message(2, 1, Sender::Counterpart, 101, "Hi there! Yes, it is.", "10:32 AM", MessageStatus::Delivered),
                message(3, 1, Sender::Counterpart, 101, "It has a few highlights in chapter 3 but otherwise like new.", "10:33 AM", MessageStatus::Delivered),
            ],
        ),
        conversation(
            2,
            Counterpart {
                id: 102,
                name: "Michael Chen".to_string(),
                avatar: "/avatars/michael.jpg".to_string(),
                online: false,
                last_seen: "2 hours ago".to_string(),
            },
            BookRef {
                id: 2,
                title: "Introduction to Psychology".to_string(),
                thumbnail: "/books/psychology.jpg".to_string(),
            },
            false,
            vec![
                message(4, 2, Sender::Counterpart, 102, "Would you take $40 for the psychology text?", "Yesterday", MessageStatus::Read),
                message(5, 2, Sender::Me, 0, "I could do $45, it comes with the study guide.", "Yesterday", MessageStatus::Read),
            ],
        ),
        conversation(
            3,
            Counterpart {
                id: 103,
                name: "Emily Rodriguez".to_string(),
                avatar: "/avatars/emily.jpg".to_string(),
                online: true,
                last_seen: "Online".to_string(),
            },
            BookRef {
                id: 3,
                title: "Principles of Economics".to_string(),
                thumbnail: "/books/economics.jpg".to_string(),
            },
            false,
            vec![
                message(6, 3, Sender::Me, 0, "Thanks for the quick exchange!", "Mon", MessageStatus::Delivered),
            ],
        ),
    ]
}
