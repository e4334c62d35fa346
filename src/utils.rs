use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use url::Url;

use crate::error::{BackendError, BackendResult};

/// A spawned background task that is aborted when the guard goes away.
#[derive(Debug)]
pub struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub fn spawn_guarded<F>(fut: F) -> TaskGuard
where
    F: Future<Output = ()> + Send + 'static,
{
    TaskGuard(tokio::spawn(fut))
}

/// Bounds a backend call; an expired call becomes `BackendError::TimedOut`.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, fut: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::TimedOut {
            operation,
            after: limit,
        }),
    }
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Maps an http(s) GraphQL endpoint onto its ws(s) twin.
pub fn websocket_url(http_url: &Url) -> Result<Url, url::ParseError> {
    let raw = http_url.as_str();
    match http_url.scheme() {
        "https" => Url::parse(&format!("wss{}", &raw["https".len()..])),
        "http" => Url::parse(&format!("ws{}", &raw["http".len()..])),
        _ => Ok(http_url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_default_to_https() {
        assert_eq!(normalize_url("  example.org/v1 "), "https://example.org/v1");
        assert_eq!(normalize_url("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn websocket_url_swaps_scheme_and_keeps_path() {
        let http = Url::parse("https://abc.graphql.eu-central-1.nhost.run/v1").expect("url");
        let ws = websocket_url(&http).expect("ws url");
        assert_eq!(ws.as_str(), "wss://abc.graphql.eu-central-1.nhost.run/v1");

        let local = Url::parse("http://localhost:1337/v1/graphql").expect("url");
        assert_eq!(
            websocket_url(&local).expect("ws url").as_str(),
            "ws://localhost:1337/v1/graphql"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_the_operation() {
        let err = with_timeout::<(), _>("createMessage", Duration::from_secs(3), std::future::pending())
            .await
            .expect_err("pending call should expire");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("createMessage"));
    }
}
