use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::api::graphql::{GraphQlRequest, GraphQlResponse};
use crate::error::{BackendError, BackendResult};
use crate::utils::{TaskGuard, spawn_guarded};

const SUBPROTOCOL: &str = "graphql-transport-ws";
const SUBSCRIPTION_ID: &str = "1";
// Snapshots are replaced wholesale, so a deep buffer buys nothing.
const PUSH_BUFFER: usize = 8;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live feed of snapshots. Dropping it tears the feed down.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<BackendResult<T>>,
    _pump: Option<TaskGuard>,
}

impl<T> Subscription<T> {
    /// Wraps a channel fed by something other than a websocket, e.g. a test double.
    pub fn from_channel(rx: mpsc::Receiver<BackendResult<T>>) -> Self {
        Self { rx, _pump: None }
    }

    pub async fn next(&mut self) -> Option<BackendResult<T>> {
        self.rx.recv().await
    }
}

/// Feeds every push of a live query to `apply`. When the backend closes a
/// feed that has delivered at least once (e.g. its token expired), `open`
/// runs again so the next handshake picks up a fresh token. A feed that
/// closes before its first push is given up.
pub async fn follow<T, F, Fut>(operation: &'static str, mut open: F, mut apply: impl FnMut(T))
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BackendResult<Subscription<T>>>,
{
    loop {
        let mut feed = match open().await {
            Ok(feed) => feed,
            Err(err) => {
                error!("could not subscribe to {operation}: {err}");
                return;
            }
        };
        debug!("{operation} subscription open");

        let mut delivered = false;
        let mut closed_by_backend = false;
        while let Some(push) = feed.next().await {
            match push {
                Ok(snapshot) => {
                    delivered = true;
                    apply(snapshot);
                }
                Err(BackendError::SubscriptionClosed { .. }) => closed_by_backend = true,
                Err(err) => warn!("{operation} subscription: {err}"),
            }
        }

        if !(closed_by_backend && delivered) {
            debug!("{operation} subscription ended");
            return;
        }
        info!("{operation} subscription closed by the backend; reopening");
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    ConnectionInit { payload: Value },
    Subscribe {
        id: &'a str,
        payload: GraphQlRequest<'a>,
    },
    Complete { id: &'a str },
    Pong,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    ConnectionAck,
    Next {
        id: String,
        payload: GraphQlResponse<Value>,
    },
    Error {
        id: String,
        #[serde(default)]
        payload: Value,
    },
    Complete {
        id: String,
    },
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

/// Opens one `graphql-transport-ws` connection carrying a single subscription
/// and pumps each `next` payload through `decode` into the returned feed.
pub async fn subscribe<T>(
    ws_url: &Url,
    access_token: &str,
    operation: &'static str,
    query: &'static str,
    variables: Value,
    decode: fn(Value) -> serde_json::Result<T>,
) -> BackendResult<Subscription<T>>
where
    T: Send + 'static,
{
    let ws_err = |source| BackendError::WebSocket {
        operation,
        source: Box::new(source),
    };

    let mut request = ws_url.as_str().into_client_request().map_err(ws_err)?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    let (mut socket, _) = connect_async(request).await.map_err(ws_err)?;
    debug!("{operation}: websocket connected");

    send_frame(
        &mut socket,
        operation,
        &ClientFrame::ConnectionInit {
            payload: serde_json::json!({
                "headers": { "Authorization": format!("Bearer {access_token}") }
            }),
        },
    )
    .await?;
    await_ack(&mut socket, operation).await?;

    send_frame(
        &mut socket,
        operation,
        &ClientFrame::Subscribe {
            id: SUBSCRIPTION_ID,
            payload: GraphQlRequest { query, variables },
        },
    )
    .await?;

    let (tx, rx) = mpsc::channel(PUSH_BUFFER);
    let pump = spawn_guarded(pump_frames(socket, operation, decode, tx));
    Ok(Subscription {
        rx,
        _pump: Some(pump),
    })
}

async fn send_frame(
    socket: &mut Socket,
    operation: &'static str,
    frame: &ClientFrame<'_>,
) -> BackendResult<()> {
    let text = serde_json::to_string(frame).map_err(|source| BackendError::Decode { operation, source })?;
    socket
        .send(WsMessage::Text(text))
        .await
        .map_err(|source| BackendError::WebSocket {
            operation,
            source: Box::new(source),
        })
}

async fn await_ack(socket: &mut Socket, operation: &'static str) -> BackendResult<()> {
    while let Some(incoming) = socket.next().await {
        let incoming = incoming.map_err(|source| BackendError::WebSocket {
            operation,
            source: Box::new(source),
        })?;
        let text = match incoming {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        match parse_frame(&text, operation)? {
            ServerFrame::ConnectionAck => return Ok(()),
            ServerFrame::Ping => send_frame(socket, operation, &ClientFrame::Pong).await?,
            other => debug!("{operation}: ignoring {other:?} before ack"),
        }
    }
    Err(BackendError::NotAcknowledged { operation })
}

fn parse_frame(text: &str, operation: &'static str) -> BackendResult<ServerFrame> {
    serde_json::from_str(text).map_err(|source| BackendError::Decode { operation, source })
}

async fn pump_frames<T>(
    mut socket: Socket,
    operation: &'static str,
    decode: fn(Value) -> serde_json::Result<T>,
    tx: mpsc::Sender<BackendResult<T>>,
) {
    loop {
        let incoming = tokio::select! {
            incoming = socket.next() => incoming,
            _ = tx.closed() => {
                debug!("{operation}: feed dropped, completing subscription");
                let _ = send_frame(&mut socket, operation, &ClientFrame::Complete { id: SUBSCRIPTION_ID }).await;
                let _ = socket.close(None).await;
                return;
            }
        };

        let text = match incoming {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None => {
                let _ = tx.send(Err(BackendError::SubscriptionClosed { operation })).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(source)) => {
                let _ = tx
                    .send(Err(BackendError::WebSocket {
                        operation,
                        source: Box::new(source),
                    }))
                    .await;
                return;
            }
        };

        let frame = match parse_frame(&text, operation) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("{operation}: skipping unreadable frame: {err}");
                continue;
            }
        };

        let push = match frame {
            ServerFrame::Next { id, payload } if id == SUBSCRIPTION_ID => payload
                .into_data(operation)
                .and_then(|data| decode(data).map_err(|source| BackendError::Decode { operation, source })),
            ServerFrame::Error { id, payload } if id == SUBSCRIPTION_ID => {
                let _ = tx
                    .send(Err(BackendError::GraphQl {
                        operation,
                        message: payload.to_string(),
                    }))
                    .await;
                return;
            }
            ServerFrame::Complete { id } if id == SUBSCRIPTION_ID => {
                let _ = tx.send(Err(BackendError::SubscriptionClosed { operation })).await;
                return;
            }
            ServerFrame::Ping => {
                if let Err(err) = send_frame(&mut socket, operation, &ClientFrame::Pong).await {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
                continue;
            }
            other => {
                debug!("{operation}: ignoring {other:?}");
                continue;
            }
        };

        if tx.send(push).await.is_err() {
            return;
        }
    }
}
