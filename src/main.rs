use std::path::PathBuf;
use std::process::ExitCode;

use chatbot_client::app::{self, Command};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatbot", version, about = "Terminal client for a hosted chatbot backend")]
struct Cli {
    /// Path to the TOML settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Open the chat screen (default)
    Chat,
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account
    SignUp {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Forget the stored session
    SignOut,
}

impl From<Mode> for Command {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Chat => Command::Chat,
            Mode::SignIn { email } => Command::SignIn { email },
            Mode::SignUp { email, display_name } => Command::SignUp { email, display_name },
            Mode::SignOut => Command::SignOut,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let command = cli.command.map(Command::from).unwrap_or(Command::Chat);
    match app::run(command, cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
