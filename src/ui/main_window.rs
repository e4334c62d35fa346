use std::io::Write;
use std::sync::Arc;

use log::{debug, warn};
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;

use crate::api::DataBackend;
use crate::api::auth::AuthProvider;
use crate::controller::ChatController;
use crate::error::AppError;
use crate::orchestrator::Timeouts;
use crate::ui::chat_view::{self, ChatView};
use crate::ui::login::Prompter;
use crate::ui::sidebar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatExit {
    Quit,
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Send(String),
    NewChat,
    ListChats,
    Open(usize),
    SignOut,
    Quit,
    Help,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };
    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some("new"), None) => Input::NewChat,
        (Some("chats"), None) => Input::ListChats,
        (Some("open"), Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Input::Open(n),
            _ => Input::Unknown(line.to_string()),
        },
        (Some("signout"), None) => Input::SignOut,
        (Some("quit" | "exit"), None) => Input::Quit,
        (Some("help"), None) => Input::Help,
        _ => Input::Unknown(line.to_string()),
    }
}

const HELP: &str = "/new  start a new chat\n/chats  list chats\n/open <n>  switch to chat n\n/signout  sign out\n/quit  leave";

fn show(text: &str) {
    if text.is_empty() {
        return;
    }
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Runs the chat screen until the user quits, signs out or closes input.
pub async fn run_chat<B, A, R>(
    backend: Arc<B>,
    auth: &A,
    prompter: &mut Prompter<R>,
    timeouts: Timeouts,
) -> Result<ChatExit, AppError>
where
    B: DataBackend,
    A: AuthProvider,
    R: AsyncBufRead + Unpin,
{
    let controller = Arc::new(ChatController::new(backend, timeouts));
    controller.start();

    let user = auth.current_user();
    let mut view = ChatView::new(user.as_ref().map(|u| u.display_name.as_str()));
    println!("{}", view.greeting());

    let mut updates = controller.watch();
    let initial = updates.borrow_and_update().clone();
    show(&view.render(&initial));
    println!("({})", chat_view::input_hint(&initial));

    let mut send: Option<JoinHandle<()>> = None;
    let exit = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break ChatExit::Quit;
                }
                let state = updates.borrow_and_update().clone();
                show(&view.render(&state));
            }
            line = prompter.next_line() => {
                let Some(line) = line? else {
                    break ChatExit::Quit;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Send(text) => {
                        // The spawned task may not have taken the lock yet; its handle is the truth.
                        let running = send.as_ref().is_some_and(|task| !task.is_finished());
                        if running || controller.snapshot().is_sending() {
                            println!("Still sending the previous message; \"{text}\" was not sent.");
                            continue;
                        }
                        controller.set_input(&text);
                        let controller = controller.clone();
                        send = Some(tokio::spawn(async move {
                            controller.submit(&text).await;
                        }));
                    }
                    Input::NewChat => {
                        controller.start_new_chat();
                    }
                    Input::ListChats => show(&sidebar::render(&controller.snapshot())),
                    Input::Open(n) => {
                        if controller.select_nth(n - 1).is_none() {
                            println!("There is no chat {n}.");
                        }
                    }
                    Input::SignOut => {
                        if let Err(err) = auth.sign_out().await {
                            warn!("sign-out request failed: {err}");
                        }
                        break ChatExit::SignedOut;
                    }
                    Input::Quit => break ChatExit::Quit,
                    Input::Help => println!("{HELP}"),
                    Input::Unknown(command) => println!("Unknown command {command}. Try /help."),
                }
            }
        }
    };

    if let Some(send) = send.filter(|task| !task.is_finished()) {
        println!("Waiting for the message in flight to settle…");
        if let Err(err) = send.await {
            debug!("send task ended abnormally: {err}");
        }
    }
    controller.shutdown();
    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(parse_input("  hello there "), Input::Send("hello there".into()));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse_input("/new"), Input::NewChat);
        assert_eq!(parse_input("/chats"), Input::ListChats);
        assert_eq!(parse_input("/open 3"), Input::Open(3));
        assert_eq!(parse_input("/signout"), Input::SignOut);
        assert_eq!(parse_input("/exit"), Input::Quit);
    }

    #[test]
    fn malformed_commands_are_unknown() {
        assert_eq!(parse_input("/open 0"), Input::Unknown("/open 0".into()));
        assert_eq!(parse_input("/open x"), Input::Unknown("/open x".into()));
        assert_eq!(parse_input("/new now"), Input::Unknown("/new now".into()));
    }
}
