use std::fmt::Write;

use crate::api::models::{Conversation, Message, MessageId, Sender};
use crate::state::{ActiveConversation, ChatState};
use crate::ui::sidebar;

const WIDTH: usize = 72;

pub const INTRO_BANNER: &str = "Nothing here yet. Send a message to get the conversation going.";
pub const TYPING_LINE: &str = "assistant is typing…";

/// Turns successive state snapshots into terminal output, printing only
/// what changed since the last snapshot.
#[derive(Debug)]
pub struct ChatView {
    greeting: String,
    shown: Option<ActiveConversation>,
    printed: Vec<MessageId>,
    listing: Option<Vec<(String, String)>>,
    typing_shown: bool,
    banner_shown: bool,
    failures_seen: u64,
}

impl ChatView {
    pub fn new(display_name: Option<&str>) -> Self {
        let greeting = match display_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => format!("Hello, {name}"),
            None => "Hello".to_string(),
        };
        Self {
            greeting,
            shown: None,
            printed: Vec::new(),
            listing: None,
            typing_shown: false,
            banner_shown: false,
            failures_seen: 0,
        }
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn render(&mut self, state: &ChatState) -> String {
        let mut out = String::new();

        let listing = listing(state.directory.conversations());
        if self.listing.as_ref() != Some(&listing) {
            out.push_str(&sidebar::render(state));
            self.listing = Some(listing);
        }

        if self.shown.as_ref() != Some(&state.active) {
            self.shown = Some(state.active.clone());
            self.printed.clear();
            self.banner_shown = false;
            out.push_str(&header(state));
        }

        let messages = state.stream.messages();
        let continues = self.printed.len() <= messages.len()
            && self.printed.iter().zip(messages).all(|(id, message)| id == &message.id);
        let fresh = if continues {
            &messages[self.printed.len()..]
        } else {
            // Something already on screen was retracted; redraw the transcript.
            out.push_str(&header(state));
            self.banner_shown = false;
            messages
        };
        for message in fresh {
            out.push_str(&format_message(message));
        }
        self.printed = messages.iter().map(|m| m.id.clone()).collect();

        let wants_banner = messages.is_empty() && !state.reply_pending;
        if wants_banner && !self.banner_shown {
            let _ = writeln!(out, "{INTRO_BANNER}");
        }
        self.banner_shown = wants_banner;

        if state.reply_pending && !self.typing_shown {
            let _ = writeln!(out, "{TYPING_LINE}");
        }
        self.typing_shown = state.reply_pending;

        if state.failures > self.failures_seen {
            if let Some(notice) = state.notice {
                let _ = writeln!(out, "! {notice}");
            }
            self.failures_seen = state.failures;
        }
        out
    }
}

fn listing(conversations: &[Conversation]) -> Vec<(String, String)> {
    conversations
        .iter()
        .map(|c| (c.id.to_string(), c.title.clone()))
        .collect()
}

fn header(state: &ChatState) -> String {
    let title = match &state.active {
        ActiveConversation::NewChat => "New chat".to_string(),
        ActiveConversation::Selected(id) => state
            .directory
            .get(id)
            .map(|c| sidebar::truncate(&c.title, WIDTH - 8))
            .unwrap_or_else(|| id.to_string()),
    };
    format!("\n── {title} ──\n")
}

/// User messages sit on the right, assistant messages on the left.
pub fn format_message(message: &Message) -> String {
    let mut out = String::new();
    for line in message.content.lines() {
        let _ = match message.sender {
            Sender::User => writeln!(out, "{line:>WIDTH$}"),
            Sender::Assistant => writeln!(out, "› {line}"),
        };
    }
    out
}

pub fn input_hint(state: &ChatState) -> &'static str {
    if state.is_sending() {
        "Sending…"
    } else if state.active == ActiveConversation::NewChat {
        "Type a message to start a new chat"
    } else {
        "Type a message"
    }
}
