use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::api::auth::{AuthClient, SignUpOutcome};
use crate::error::AppError;

/// Line-oriented terminal input shared by the entry screens and the chat view.
pub struct Prompter<R = BufReader<Stdin>> {
    lines: Lines<R>,
}

impl Prompter {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Prompter<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }

    /// `None` once input is closed. Cancel-safe.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    pub async fn ask(&mut self, label: &str) -> std::io::Result<Option<String>> {
        print!("{label}");
        std::io::stdout().flush()?;
        Ok(self.next_line().await?.map(|line| line.trim().to_string()))
    }

    /// Asks with a default that an empty answer keeps.
    pub async fn ask_or(&mut self, label: &str, default: Option<&str>) -> std::io::Result<Option<String>> {
        let label = match default {
            Some(value) => format!("{label} [{value}]: "),
            None => format!("{label}: "),
        };
        Ok(self.ask(&label).await?.map(|answer| match (answer.is_empty(), default) {
            (true, Some(value)) => value.to_string(),
            _ => answer,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryForm {
    SignIn { email: Option<String> },
    SignUp { email: Option<String>, display_name: Option<String> },
}

impl EntryForm {
    pub fn sign_in(email: Option<String>) -> Self {
        EntryForm::SignIn { email }
    }

    pub fn sign_up(email: Option<String>, display_name: Option<String>) -> Self {
        EntryForm::SignUp { email, display_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResult {
    SignedIn { email: String },
    /// Stay on the entry screen, possibly on the other form.
    Retry,
    /// Input was closed.
    Closed,
}

const SWITCH_TO_SIGN_UP: &str = "/signup";
const SWITCH_TO_SIGN_IN: &str = "/signin";

pub async fn run_entry<R: AsyncBufRead + Unpin>(
    auth: &AuthClient,
    prompter: &mut Prompter<R>,
    form: &mut EntryForm,
    last_email: Option<&str>,
) -> Result<EntryResult, AppError> {
    match form.clone() {
        EntryForm::SignIn { email } => {
            println!("Welcome back. Sign in to continue ({SWITCH_TO_SIGN_UP} to create an account).");
            let Some(email) = prompter.ask_or("Email", email.as_deref().or(last_email)).await? else {
                return Ok(EntryResult::Closed);
            };
            if email == SWITCH_TO_SIGN_UP {
                *form = EntryForm::sign_up(None, None);
                return Ok(EntryResult::Retry);
            }
            let Some(password) = prompter.ask("Password: ").await? else {
                return Ok(EntryResult::Closed);
            };
            match auth.sign_in(&email, &password).await {
                Ok(_) => Ok(EntryResult::SignedIn { email }),
                Err(err) => {
                    println!("Sign-in failed: {err}");
                    *form = EntryForm::sign_in(Some(email));
                    Ok(EntryResult::Retry)
                }
            }
        }
        EntryForm::SignUp { email, display_name } => {
            println!("Create an account ({SWITCH_TO_SIGN_IN} to go back).");
            let Some(display_name) = prompter.ask_or("Display name", display_name.as_deref()).await? else {
                return Ok(EntryResult::Closed);
            };
            if display_name == SWITCH_TO_SIGN_IN {
                *form = EntryForm::sign_in(None);
                return Ok(EntryResult::Retry);
            }
            let Some(email) = prompter.ask_or("Email", email.as_deref()).await? else {
                return Ok(EntryResult::Closed);
            };
            let Some(password) = prompter.ask("Password: ").await? else {
                return Ok(EntryResult::Closed);
            };
            match auth.sign_up(&email, &password, &display_name).await {
                Ok(SignUpOutcome::SignedIn(_)) => Ok(EntryResult::SignedIn { email }),
                Ok(SignUpOutcome::VerifyThenSignIn) => {
                    println!("Account created. Verify your email, then sign in.");
                    *form = EntryForm::sign_in(Some(email));
                    Ok(EntryResult::Retry)
                }
                Err(err) => {
                    println!("Sign-up failed: {err}");
                    *form = EntryForm::sign_up(Some(email), Some(display_name));
                    Ok(EntryResult::Retry)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ask_or_keeps_the_default_on_empty_answers() {
        let mut prompter = Prompter::new("\n  ada@example.org  \n".as_bytes());
        assert_eq!(
            prompter.ask_or("Email", Some("me@example.org")).await.expect("read"),
            Some("me@example.org".to_string())
        );
        assert_eq!(
            prompter.ask_or("Email", Some("me@example.org")).await.expect("read"),
            Some("ada@example.org".to_string())
        );
        assert_eq!(prompter.ask_or("Email", None).await.expect("read"), None);
    }
}
