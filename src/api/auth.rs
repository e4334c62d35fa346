use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

use crate::api::models::User;
use crate::error::{BackendError, BackendResult};
use crate::session::AuthStatus;

// Refresh a little before the backend would reject the token.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The identity collaborator the chat core consumes.
pub trait AuthProvider: Send + Sync {
    fn status(&self) -> AuthStatus;
    fn current_user(&self) -> Option<User>;
    fn sign_out(&self) -> impl Future<Output = BackendResult<()>> + Send;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_token: String,
    access_token_expires_in: u64,
    refresh_token: String,
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: Option<Session>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug)]
enum SessionState {
    Resolving,
    SignedOut,
    SignedIn { session: Session, expires_at: Instant },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The backend opened a session straight away.
    SignedIn(User),
    /// The account exists but needs verification before signing in.
    VerifyThenSignIn,
}

enum Token {
    Fresh(String),
    /// Needs refreshing with the carried refresh token.
    Stale(String),
}

pub struct AuthClient {
    http: HttpClient,
    auth_url: Url,
    state: Mutex<SessionState>,
    // Refresh tokens are single use, so only one exchange may be in flight.
    refreshing: AsyncMutex<()>,
}

impl AuthClient {
    pub fn new(http: HttpClient, auth_url: Url) -> Self {
        Self {
            http,
            auth_url,
            state: Mutex::new(SessionState::Resolving),
            refreshing: AsyncMutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url.as_str().trim_end_matches('/'), path)
    }

    /// Resolves the start-up status from a stored refresh token.
    pub async fn restore(&self, refresh_token: Option<&str>) -> AuthStatus {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            *self.state() = SessionState::SignedOut;
            return AuthStatus::Unauthenticated;
        };
        match self.exchange_refresh_token(token).await {
            Ok(_) => AuthStatus::Authenticated,
            Err(err) => {
                warn!("session restore failed: {err}");
                *self.state() = SessionState::SignedOut;
                AuthStatus::Unauthenticated
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> BackendResult<User> {
        let body = serde_json::json!({ "email": email, "password": password });
        let envelope: SessionEnvelope = self.post("signIn", "signin/email-password", &body).await?;
        let session = envelope.session.ok_or(BackendError::Auth {
            operation: "signIn",
            message: "no session returned".into(),
        })?;
        let user = self.adopt(session)?;
        info!("signed in as {}", user.display_name);
        Ok(user)
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> BackendResult<SignUpOutcome> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "options": { "displayName": display_name },
        });
        let envelope: SessionEnvelope = self.post("signUp", "signup/email-password", &body).await?;
        match envelope.session {
            Some(session) => Ok(SignUpOutcome::SignedIn(self.adopt(session)?)),
            None => Ok(SignUpOutcome::VerifyThenSignIn),
        }
    }

    /// A bearer token for the data backend, refreshed when close to expiry.
    pub async fn access_token(&self) -> BackendResult<String> {
        if let Token::Fresh(token) = self.token()? {
            return Ok(token);
        }
        let _refreshing = self.refreshing.lock().await;
        // Whoever held the lock before may already have rotated the session.
        let refresh = match self.token()? {
            Token::Fresh(token) => return Ok(token),
            Token::Stale(refresh) => refresh,
        };
        debug!("access token close to expiry, refreshing");
        let session = self.exchange_refresh_token(&refresh).await?;
        Ok(session.access_token)
    }

    fn token(&self) -> BackendResult<Token> {
        match &*self.state() {
            SessionState::SignedIn { session, expires_at } if Instant::now() + REFRESH_MARGIN < *expires_at => {
                Ok(Token::Fresh(session.access_token.clone()))
            }
            SessionState::SignedIn { session, .. } => Ok(Token::Stale(session.refresh_token.clone())),
            _ => Err(BackendError::Unauthenticated),
        }
    }

    pub fn refresh_token(&self) -> Option<String> {
        match &*self.state() {
            SessionState::SignedIn { session, .. } => Some(session.refresh_token.clone()),
            _ => None,
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> BackendResult<Session> {
        let session: Session = self
            .post("refreshSession", "token", &RefreshRequest { refresh_token })
            .await?;
        self.adopt(session.clone())?;
        Ok(session)
    }

    fn adopt(&self, mut session: Session) -> BackendResult<User> {
        let user = session.user.take().or_else(|| self.current_user()).ok_or(BackendError::Auth {
            operation: "session",
            message: "session carries no user".into(),
        })?;
        session.user = Some(user.clone());
        let expires_at = Instant::now() + Duration::from_secs(session.access_token_expires_in);
        *self.state() = SessionState::SignedIn { session, expires_at };
        Ok(user)
    }

    async fn post<B, T>(&self, operation: &'static str, path: &str, body: &B) -> BackendResult<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|source| BackendError::Http { operation, source })?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(BackendError::Auth { operation, message });
        }
        resp.json::<T>()
            .await
            .map_err(|source| BackendError::Http { operation, source })
    }
}

impl AuthProvider for AuthClient {
    fn status(&self) -> AuthStatus {
        match &*self.state() {
            SessionState::Resolving => AuthStatus::Unknown,
            SessionState::SignedOut => AuthStatus::Unauthenticated,
            SessionState::SignedIn { .. } => AuthStatus::Authenticated,
        }
    }

    fn current_user(&self) -> Option<User> {
        match &*self.state() {
            SessionState::SignedIn { session, .. } => session.user.clone(),
            _ => None,
        }
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let previous = std::mem::replace(&mut *self.state(), SessionState::SignedOut);
        let SessionState::SignedIn { session, .. } = previous else {
            return Ok(());
        };
        let resp = self
            .http
            .post(self.endpoint("signout"))
            .bearer_auth(&session.access_token)
            .json(&RefreshRequest {
                refresh_token: &session.refresh_token,
            })
            .send()
            .await
            .map_err(|source| BackendError::Http {
                operation: "signOut",
                source,
            })?;
        if !resp.status().is_success() {
            return Err(BackendError::Status {
                operation: "signOut",
                status: resp.status(),
            });
        }
        info!("signed out");
        Ok(())
    }
}
