use std::fmt::Write;

use chrono::Local;

use crate::api::models::Conversation;
use crate::state::ChatState;

const TITLE_WIDTH: usize = 40;

pub fn render(state: &ChatState) -> String {
    let conversations = state.directory.conversations();
    if conversations.is_empty() {
        return "No conversations yet. Type a message to start one.\n".to_string();
    }
    let mut out = String::from("Chats\n");
    for (index, conversation) in conversations.iter().enumerate() {
        let marker = if state.active.id() == Some(&conversation.id) { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker}{:>3}. {:<width$}  {}",
            index + 1,
            truncate(&conversation.title, TITLE_WIDTH),
            updated_label(conversation),
            width = TITLE_WIDTH
        );
    }
    out.push_str("(/open <n> to switch, /new for a new chat)\n");
    out
}

fn updated_label(conversation: &Conversation) -> String {
    conversation
        .updated_at
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

pub fn truncate(text: &str, width: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= width && first_line.len() == text.len() {
        return first_line.to_string();
    }
    let mut short: String = first_line.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}
