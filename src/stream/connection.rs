//! Owns a single socket's lifecycle: dial, read-loop, ping/pong, close
//! (component C4: Managed Connection).

use super::watermark::{Offer, Watermark};
use super::{StatsInner, WebSocketReport};

use crate::auth::generate_auth_headers;
use crate::config::Config;
use crate::endpoints::{host_header, origin_header, API_V1_WS};
use crate::feed::ID;

use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderValue;
use std::sync::{atomic::Ordering, Arc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(2);
pub(crate) const PING_TIMEOUT: Duration = Duration::from_secs(2);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// One endpoint to dial: a fully-qualified socket URL and the origin
/// identifier (possibly empty) to echo in the handshake.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionTarget {
    pub url: String,
    pub origin: String,
}

#[derive(Debug)]
pub(crate) enum DialError {
    /// Handshake rejected with 401/403: not retried.
    Auth(String),
    /// Any other dial failure: dial timeout, connection refused, 4xx/5xx.
    Transport(String),
}

impl std::fmt::Display for DialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialError::Auth(msg) => write!(f, "{msg}"),
            DialError::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

fn classify_handshake_error(e: tokio_tungstenite::tungstenite::Error) -> DialError {
    use tokio_tungstenite::tungstenite::Error as WsError;

    if let WsError::Http(response) = &e {
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return DialError::Auth(format!("handshake rejected with status {status}"));
        }
        if status.as_u16() >= 400 {
            return DialError::Transport(format!("handshake failed with status {status}"));
        }
    }

    DialError::Transport(e.to_string())
}

/// Dials one origin, returning the open socket and the resolved host (for
/// the connection-status callback and per-origin stats).
pub(crate) async fn dial(
    config: &Config,
    target: &ConnectionTarget,
    feed_ids: &[ID],
) -> Result<(WsStream, String), DialError> {
    let feed_ids_joined = feed_ids
        .iter()
        .map(|id| id.to_hex_string())
        .collect::<Vec<_>>()
        .join(",");
    let path = format!("{}?feedIDs={}", API_V1_WS, feed_ids_joined);

    let mut headers = generate_auth_headers(
        "GET",
        &path,
        b"",
        &config.api_key,
        &config.api_secret,
        now_ms(),
    )
    .map_err(|e| DialError::Transport(format!("failed to sign handshake: {e}")))?;

    if !target.origin.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&target.origin) {
            headers.insert(origin_header(), value);
        }
    }

    let mut host_override = None;
    if let Some(custom) = &config.custom_headers {
        for (name, value) in custom.iter() {
            if name == host_header() {
                host_override = value.to_str().ok().map(str::to_string);
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }
    }

    let url = format!("{}{}", target.url, path);
    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|e| DialError::Transport(format!("invalid handshake URL: {e}")))?;
    request.headers_mut().extend(headers);

    if let Some(host) = &host_override {
        if let Ok(value) = HeaderValue::from_str(host) {
            request.headers_mut().insert(host_header(), value);
        }
    }

    let connect_future = connect_async(request);
    let (socket, response) = tokio::time::timeout(config.connect_timeout, connect_future)
        .await
        .map_err(|_| {
            #[cfg(feature = "tracing")]
            tracing::warn!(url = %url, "dial timed out after {:?}", config.connect_timeout);
            DialError::Transport("connect timed out".to_string())
        })?
        .map_err(|e| {
            let classified = classify_handshake_error(e);
            #[cfg(feature = "tracing")]
            tracing::warn!(url = %url, "dial failed: {classified}");
            classified
        })?;

    #[cfg(feature = "tracing")]
    tracing::info!(url = %url, status = %response.status(), "dialed websocket origin");
    #[cfg(not(feature = "tracing"))]
    let _ = &response;

    let resolved_host = host_override.unwrap_or_else(|| target.url.clone());
    Ok((socket, resolved_host))
}

/// Why a connection's read/ping loop returned.
pub(crate) enum ConnectionOutcome {
    /// The supervisor asked us to shut down; not a failure.
    Shutdown,
    /// The socket failed (read error, decode error, ping timeout, or close
    /// frame from the peer); carries a human-readable cause.
    Error(String),
}

/// Runs one socket's read loop and ping/pong liveness check to completion.
///
/// Frames are decoded as `{"report": <envelope>}`; accepted envelopes are
/// forwarded to `report_sender`, duplicates only bump a counter. A ping is
/// sent every [`PING_INTERVAL`] with a [`PING_TIMEOUT`] deadline; a timeout
/// closes the socket and returns [`ConnectionOutcome::Error`].
pub(crate) async fn run_connection(
    mut socket: WsStream,
    report_sender: mpsc::Sender<WebSocketReport>,
    dedup: Arc<Watermark>,
    stats: Arc<StatsInner>,
    mut shutdown: broadcast::Receiver<()>,
) -> ConnectionOutcome {
    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
    ping_ticker.tick().await; // first tick fires immediately

    let mut pong_deadline: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;

    loop {
        tokio::select! {
            _ = ping_ticker.tick(), if pong_deadline.is_none() => {
                if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
                    #[cfg(feature = "tracing")]
                    tracing::error!("failed to send ping: {e}");
                    return ConnectionOutcome::Error(format!("ping failed: {e}"));
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("sent ping, awaiting pong within {:?}", PING_TIMEOUT);
                pong_deadline = Some(Box::pin(tokio::time::sleep(PING_TIMEOUT)));
            }

            _ = async { pong_deadline.as_mut().unwrap().as_mut().await }, if pong_deadline.is_some() => {
                #[cfg(feature = "tracing")]
                tracing::warn!("pong not received within {:?}, closing connection", PING_TIMEOUT);
                let _ = socket.close(None).await;
                return ConnectionOutcome::Error("ping timeout".to_string());
            }

            message = socket.next() => {
                match message {
                    Some(Ok(Message::Binary(data))) => {
                        match serde_json::from_slice::<WebSocketReport>(&data) {
                            Ok(envelope) => {
                                let feed_id = envelope.report.feed_id;
                                let ts = envelope.report.observations_timestamp;

                                match dedup.offer(&feed_id, ts).await {
                                    Offer::Accept => {
                                        #[cfg(feature = "tracing")]
                                        tracing::info!(feed_id = %feed_id, timestamp = ts, "received report");
                                        stats.accepted.fetch_add(1, Ordering::SeqCst);
                                        if report_sender.send(envelope).await.is_err() {
                                            return ConnectionOutcome::Shutdown;
                                        }
                                    }
                                    Offer::Drop => {
                                        #[cfg(feature = "tracing")]
                                        tracing::debug!(feed_id = %feed_id, timestamp = ts, "dropped duplicate report");
                                        stats.deduplicated.fetch_add(1, Ordering::SeqCst);
                                    }
                                }
                            }
                            Err(e) => {
                                #[cfg(feature = "tracing")]
                                tracing::error!("failed to parse binary message: {e}");
                                return ConnectionOutcome::Error(format!("malformed frame: {e}"));
                            }
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WebSocketReport>(&text) {
                            Ok(envelope) => {
                                let feed_id = envelope.report.feed_id;
                                let ts = envelope.report.observations_timestamp;

                                match dedup.offer(&feed_id, ts).await {
                                    Offer::Accept => {
                                        #[cfg(feature = "tracing")]
                                        tracing::info!(feed_id = %feed_id, timestamp = ts, "received report");
                                        stats.accepted.fetch_add(1, Ordering::SeqCst);
                                        if report_sender.send(envelope).await.is_err() {
                                            return ConnectionOutcome::Shutdown;
                                        }
                                    }
                                    Offer::Drop => {
                                        #[cfg(feature = "tracing")]
                                        tracing::debug!(feed_id = %feed_id, timestamp = ts, "dropped duplicate report");
                                        stats.deduplicated.fetch_add(1, Ordering::SeqCst);
                                    }
                                }
                            }
                            Err(e) => {
                                #[cfg(feature = "tracing")]
                                tracing::error!("failed to parse text message: {e}");
                                return ConnectionOutcome::Error(format!("malformed frame: {e}"));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("received ping, responding with pong");
                        if let Err(e) = socket.send(Message::Pong(payload)).await {
                            return ConnectionOutcome::Error(format!("failed to send pong: {e}"));
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("received pong");
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "no close frame".to_string());
                        #[cfg(feature = "tracing")]
                        tracing::info!("connection closed by peer: {reason}");
                        return ConnectionOutcome::Error(format!("connection closed by peer: {reason}"));
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!("error receiving message: {e}");
                        return ConnectionOutcome::Error(format!("read error: {e}"));
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::info!("websocket stream closed");
                        return ConnectionOutcome::Error("connection closed".to_string());
                    }
                }
            }

            _ = shutdown.recv() => {
                #[cfg(feature = "tracing")]
                tracing::info!("shutdown signal received, closing connection");
                let _ = socket.close(None).await;
                #[cfg(feature = "tracing")]
                tracing::info!("connection closed gracefully after shutdown signal");
                return ConnectionOutcome::Shutdown;
            }
        }
    }
}
