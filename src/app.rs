use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use log::{debug, info, warn};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::auth::{AuthClient, AuthProvider};
use crate::api::client::ApiClient;
use crate::error::{AppError, ConfigError};
use crate::orchestrator::Timeouts;
use crate::session::{SessionGate, Screen};
use crate::ui::login::{self, EntryForm, EntryResult, Prompter};
use crate::ui::main_window::{self, ChatExit};
use crate::utils::{normalize_url, websocket_url};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub auth_url: String,
    pub graphql_url: String,
    pub graphql_ws_url: Option<String>,
    /// Hosted project coordinates, used when the explicit URLs are empty.
    pub subdomain: Option<String>,
    pub region: Option<String>,
    pub request_timeout_secs: u64,
    pub reply_timeout_secs: u64,
    pub email: Option<String>,
    pub refresh_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            auth_url: String::new(),
            graphql_url: String::new(),
            graphql_ws_url: None,
            subdomain: None,
            region: None,
            request_timeout_secs: timeouts.request.as_secs(),
            reply_timeout_secs: timeouts.reply.as_secs(),
            email: None,
            refresh_token: None,
        }
    }
}

impl Settings {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_secs(self.request_timeout_secs.max(1)),
            reply: Duration::from_secs(self.reply_timeout_secs.max(1)),
        }
    }

    fn hosted(&self, service: &str) -> Option<String> {
        let subdomain = self.subdomain.as_deref().filter(|s| !s.is_empty())?;
        let region = self.region.as_deref().filter(|s| !s.is_empty())?;
        Some(format!("https://{subdomain}.{service}.{region}.nhost.run/v1"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: Url,
    pub graphql_url: Url,
    pub ws_url: Url,
}

impl Endpoints {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let auth_url = pick(&settings.auth_url, settings.hosted("auth"), "auth_url")?;
        let graphql_url = pick(&settings.graphql_url, settings.hosted("graphql"), "graphql_url")?;
        let ws_url = match settings.graphql_ws_url.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => parse_url("graphql_ws_url", raw.trim())?,
            None => websocket_url(&graphql_url).map_err(|source| ConfigError::InvalidUrl {
                field: "graphql_ws_url",
                url: graphql_url.to_string(),
                source,
            })?,
        };
        Ok(Self {
            auth_url,
            graphql_url,
            ws_url,
        })
    }
}

fn pick(explicit: &str, hosted: Option<String>, field: &'static str) -> Result<Url, ConfigError> {
    let raw = if explicit.trim().is_empty() {
        hosted.ok_or(ConfigError::MissingEndpoint(field))?
    } else {
        normalize_url(explicit)
    };
    parse_url(field, &raw)
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        field,
        url: raw.to_string(),
        source,
    })
}

/// Where settings live. TOML is the format written; a legacy JSON file is
/// read once and converted when no TOML exists yet.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    legacy: Option<PathBuf>,
}

impl SettingsStore {
    pub fn new(path: PathBuf, legacy: Option<PathBuf>) -> Self {
        Self { path, legacy }
    }

    pub fn locate(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Ok(Self::new(path, None));
        }
        let base = BaseDirs::new().ok_or(ConfigError::NoConfigDir)?;
        let legacy = ProjectDirs::from("com", "example", "Chatbot").map(|proj| proj.config_dir().join("state.json"));
        Ok(Self::new(base.config_dir().join("chatbot.toml"), legacy))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<Option<Settings>, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let settings = toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: self.path.display().to_string(),
                    source,
                })?;
                return Ok(Some(settings));
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        }

        let Some(legacy) = &self.legacy else {
            return Ok(None);
        };
        let Ok(bytes) = fs::read(legacy) else {
            return Ok(None);
        };
        let settings: Settings = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Legacy {
            path: legacy.display().to_string(),
            source,
        })?;
        info!("migrating legacy settings from {}", legacy.display());
        self.save(&settings)?;
        Ok(Some(settings))
    }

    /// Like `try_load`, but any problem falls back to defaults.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("no settings at {}; using defaults", self.path.display());
                Settings::default()
            }
            Err(err) => {
                warn!("{err}; using defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(settings)?;
        fs::write(&self.path, text).map_err(io_err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat,
    SignIn { email: Option<String> },
    SignUp { email: Option<String>, display_name: Option<String> },
    SignOut,
}

pub async fn run(command: Command, config_path: Option<PathBuf>) -> Result<(), AppError> {
    let store = SettingsStore::locate(config_path)?;
    let mut settings = store.load();
    let endpoints = Endpoints::resolve(&settings)?;
    let timeouts = settings.timeouts();
    let http = HttpClient::builder()
        .connect_timeout(timeouts.request)
        .build()
        .map_err(AppError::HttpClient)?;
    let auth = Arc::new(AuthClient::new(http.clone(), endpoints.auth_url.clone()));

    let (screen, mut form) = match &command {
        Command::Chat | Command::SignOut => (Screen::Chat, EntryForm::sign_in(None)),
        Command::SignIn { email } => (Screen::Entry, EntryForm::sign_in(email.clone())),
        Command::SignUp { email, display_name } => {
            (Screen::Entry, EntryForm::sign_up(email.clone(), display_name.clone()))
        }
    };
    let mut gate = SessionGate::new(screen);
    gate.observe(auth.status());
    auth.restore(settings.refresh_token.as_deref()).await;
    remember_session(&store, &mut settings, &auth);

    if command == Command::SignOut {
        if let Err(err) = auth.sign_out().await {
            warn!("sign-out request failed: {err}");
        }
        remember_session(&store, &mut settings, &auth);
        println!("Signed out.");
        return Ok(());
    }

    let mut prompter = Prompter::stdin();
    loop {
        if let Some(navigation) = gate.observe(auth.status()) {
            debug!("navigating: {navigation:?}");
        }
        match gate.screen() {
            Screen::Entry => match login::run_entry(auth.as_ref(), &mut prompter, &mut form, settings.email.as_deref()).await? {
                EntryResult::SignedIn { email } => {
                    settings.email = Some(email);
                    remember_session(&store, &mut settings, &auth);
                }
                EntryResult::Retry => {}
                EntryResult::Closed => return Ok(()),
            },
            Screen::Chat if gate.admits() => {
                let api = Arc::new(ApiClient::new(
                    http.clone(),
                    endpoints.graphql_url.clone(),
                    endpoints.ws_url.clone(),
                    auth.clone(),
                    timeouts.request,
                ));
                let exit = main_window::run_chat(api, auth.as_ref(), &mut prompter, timeouts).await?;
                remember_session(&store, &mut settings, &auth);
                if exit == ChatExit::Quit {
                    return Ok(());
                }
            }
            Screen::Chat => return Ok(()),
        }
    }
}

// Refresh tokens rotate; keep the stored one current.
fn remember_session(store: &SettingsStore, settings: &mut Settings, auth: &AuthClient) {
    let current = auth.refresh_token();
    if settings.refresh_token == current {
        return;
    }
    settings.refresh_token = current;
    if let Err(err) = store.save(settings) {
        warn!("failed to save settings to {}: {err}", store.path().display());
    }
}
