mod support;

use std::time::Duration;

use chatbot_client::api::auth::AuthProvider;
use chatbot_client::api::models::User;
use chatbot_client::error::BackendResult;
use chatbot_client::orchestrator::Timeouts;
use chatbot_client::session::AuthStatus;
use chatbot_client::ui::login::Prompter;
use chatbot_client::ui::main_window::{ChatExit, run_chat};
use support::{Call, FakeBackend, Script, Trigger, eventually, within};

struct SignedIn;

impl AuthProvider for SignedIn {
    fn status(&self) -> AuthStatus {
        AuthStatus::Authenticated
    }

    fn current_user(&self) -> Option<User> {
        Some(User {
            id: "u-1".into(),
            display_name: "Ada".into(),
            email: None,
        })
    }

    async fn sign_out(&self) -> BackendResult<()> {
        Ok(())
    }
}

fn triggers(backend: &FakeBackend) -> usize {
    backend
        .mutations()
        .iter()
        .filter(|c| matches!(c, Call::TriggerReply { .. }))
        .count()
}

#[tokio::test]
async fn quit_waits_for_the_send_in_flight_even_after_a_rejected_line() {
    let backend = FakeBackend::scripted(Script {
        trigger: Trigger::Gated,
        ..Script::default()
    });
    let mut prompter = Prompter::new("hello\nworld\n/quit\n".as_bytes());

    let chat = run_chat(backend.clone(), &SignedIn, &mut prompter, Timeouts::default());
    tokio::pin!(chat);

    let early = tokio::time::timeout(Duration::from_millis(300), &mut chat).await;
    assert!(early.is_err(), "chat loop returned while the reply trigger was unanswered");
    eventually("the reply trigger", || triggers(&backend) == 1).await;

    backend.release();
    let exit = within(chat).await.expect("chat loop");

    assert_eq!(exit, ChatExit::Quit);
    let stored = backend
        .mutations()
        .into_iter()
        .filter(|c| matches!(c, Call::CreateMessage { .. }))
        .count();
    assert_eq!(stored, 1);
    assert_eq!(triggers(&backend), 1);
}

#[tokio::test]
async fn quit_without_a_send_returns_at_once() {
    let backend = FakeBackend::scripted(Script::default());
    let mut prompter = Prompter::new("/chats\n/quit\n".as_bytes());

    let exit = within(run_chat(backend.clone(), &SignedIn, &mut prompter, Timeouts::default()))
        .await
        .expect("chat loop");

    assert_eq!(exit, ChatExit::Quit);
    assert!(backend.mutations().is_empty());
}

#[tokio::test]
async fn sign_out_leaves_the_chat_screen() {
    let backend = FakeBackend::scripted(Script::default());
    let mut prompter = Prompter::new("/signout\n".as_bytes());

    let exit = within(run_chat(backend, &SignedIn, &mut prompter, Timeouts::default()))
        .await
        .expect("chat loop");

    assert_eq!(exit, ChatExit::SignedOut);
}
