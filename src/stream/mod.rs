//! Stream Core: HA websocket delivery of report envelopes with per-feed
//! deduplication, liveness checking, and supervised reconnection.
//!
//! Subscribing returns a [`Stream`] once at least one origin has dialed
//! successfully; [`Stream::listen`] starts the supervised read loop for
//! every configured origin (including ones still retrying their initial
//! dial), and [`Stream::read`] drains the single linearized delivery
//! channel one envelope at a time.

mod connection;
mod origin;
mod supervisor;
mod watermark;

use crate::config::Config;
use crate::feed::ID;
use crate::report::Report;

use connection::ConnectionTarget;
use origin::discover_origins;
use watermark::Watermark;

use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// Floor of the reconnect backoff curve (also the default
/// `reconnect_base_delay`), before jitter.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
/// Ceiling of the reconnect backoff curve, before jitter.
pub const MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// A decoded frame off the wire: `{"report": <report>}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketReport {
    pub report: Report,
}

#[derive(Debug, Error, Clone)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("stream has no active connections: {0}")]
    NoActiveConnections(String),

    #[error("stream is closed")]
    Closed,
}

/// Liveness of one configured origin.
#[derive(Debug, Clone)]
pub struct OriginStatus {
    pub origin: String,
    pub host: String,
    pub connected: bool,
}

pub(crate) struct StatsInner {
    pub accepted: AtomicU64,
    pub deduplicated: AtomicU64,
    pub partial_reconnects: AtomicU64,
    pub full_reconnects: AtomicU64,
    pub configured_connections: AtomicU64,
    pub active_connections: AtomicU64,
}

/// A point-in-time snapshot of delivery and reconnection counters.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub deduplicated: u64,
    pub total_received: u64,
    pub partial_reconnects: u64,
    pub full_reconnects: u64,
    pub configured_connections: u64,
    pub active_connections: u64,
    pub origins: Vec<OriginStatus>,
}

struct SlotInit {
    target: ConnectionTarget,
    initial: Option<(connection::WsStream, String)>,
}

/// Resolves the concrete endpoints to dial: one per comma-separated entry
/// in `ws_url`, tagged with an origin identifier from [`discover_origins`]
/// when HA is enabled and discovery returns enough of them to tag every
/// entry, empty otherwise.
async fn resolve_connection_targets(http: &HttpClient, config: &Config) -> Vec<ConnectionTarget> {
    let urls = config.ws_origins();

    if urls.len() <= 1 {
        let url = urls.into_iter().next().unwrap_or_else(|| config.ws_url.clone());
        return vec![ConnectionTarget {
            url,
            origin: String::new(),
        }];
    }

    let discovered = if config.ws_ha == crate::config::WebSocketHighAvailability::Enabled {
        discover_origins(http, config).await
    } else {
        Vec::new()
    };

    urls.into_iter()
        .enumerate()
        .map(|(i, url)| {
            let origin = discovered.get(i).cloned().unwrap_or_default();
            ConnectionTarget { url, origin }
        })
        .collect()
}

/// A live, high-availability handle to a realtime report stream.
///
/// Obtained via [`Stream::new`] (which performs the initial dial to every
/// configured origin) followed by [`Stream::listen`] (which starts the
/// supervised reconnection loop). Reports are drained one at a time with
/// [`Stream::read`]; the underlying delivery channel has capacity 1, so a
/// slow consumer applies back-pressure all the way to the socket read
/// loops rather than buffering unboundedly in memory.
pub struct Stream {
    config: Arc<Config>,
    feed_ids: Arc<Vec<ID>>,
    dedup: Arc<Watermark>,

    sender: Mutex<Option<mpsc::Sender<WebSocketReport>>>,
    receiver: mpsc::Receiver<WebSocketReport>,

    stats: Arc<StatsInner>,
    statuses: Arc<Mutex<Vec<OriginStatus>>>,
    terminal: Arc<std::sync::Mutex<Option<StreamError>>>,

    closed: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    join_handles: Mutex<Option<Vec<JoinHandle<()>>>>,
    slots: Mutex<Option<Vec<SlotInit>>>,
}

impl Stream {
    /// Resolves origins, dials each one once, and returns a handle if at
    /// least one dial succeeded. Origins whose initial dial fails are
    /// retried in the background once [`Stream::listen`] is called.
    pub async fn new(config: Config, feed_ids: Vec<ID>) -> Result<Self, StreamError> {
        let config = Arc::new(config);
        let feed_ids = Arc::new(feed_ids);

        let http = HttpClient::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let targets = resolve_connection_targets(&http, &config).await;
        let configured_connections = targets.len() as u64;

        let mut slots = Vec::with_capacity(targets.len());
        let mut last_error = String::new();
        let mut active = 0u64;

        for target in targets {
            match connection::dial(&config, &target, &feed_ids).await {
                Ok((socket, host)) => {
                    active += 1;
                    slots.push(SlotInit {
                        target,
                        initial: Some((socket, host)),
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    slots.push(SlotInit {
                        target,
                        initial: None,
                    });
                }
            }
        }

        if active == 0 {
            return Err(StreamError::NoActiveConnections(last_error));
        }

        let (sender, receiver) = mpsc::channel(1);
        let (shutdown_tx, _) = broadcast::channel(configured_connections.max(1) as usize + 1);

        let statuses = slots
            .iter()
            .map(|slot| OriginStatus {
                origin: slot.target.origin.clone(),
                host: slot
                    .initial
                    .as_ref()
                    .map(|(_, host)| host.clone())
                    .unwrap_or_else(|| slot.target.url.clone()),
                connected: slot.initial.is_some(),
            })
            .collect::<Vec<_>>();

        let stats = Arc::new(StatsInner {
            accepted: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            partial_reconnects: AtomicU64::new(0),
            full_reconnects: AtomicU64::new(0),
            configured_connections: AtomicU64::new(configured_connections),
            active_connections: AtomicU64::new(active),
        });

        Ok(Stream {
            config,
            feed_ids,
            dedup: Arc::new(Watermark::new()),
            sender: Mutex::new(Some(sender)),
            receiver,
            stats,
            statuses: Arc::new(Mutex::new(statuses)),
            terminal: Arc::new(std::sync::Mutex::new(None)),
            closed: AtomicBool::new(false),
            shutdown_tx,
            join_handles: Mutex::new(Some(Vec::new())),
            slots: Mutex::new(Some(slots)),
        })
    }

    /// Spawns the supervised reconnection loop for every configured
    /// origin. May only be called once per `Stream`.
    pub async fn listen(&self) -> Result<(), StreamError> {
        let slots = self
            .slots
            .lock()
            .await
            .take()
            .ok_or_else(|| StreamError::Config("listen() already called".to_string()))?;

        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or_else(|| StreamError::Closed)?;

        let mut handles = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            handles.push(tokio::spawn(supervisor::monitor_slot(
                index,
                slot.target,
                slot.initial,
                self.config.clone(),
                self.feed_ids.clone(),
                sender.clone(),
                self.dedup.clone(),
                self.stats.clone(),
                self.statuses.clone(),
                self.shutdown_tx.subscribe(),
                self.shutdown_tx.clone(),
                self.terminal.clone(),
            )));
        }

        // Drop our own sender handle: once every spawned monitor task (and
        // hence every clone it holds) finishes, the channel closes and
        // `read` observes end-of-stream instead of blocking forever.
        self.sender.lock().await.take();
        *self.join_handles.lock().await = Some(handles);

        Ok(())
    }

    /// Waits for the next accepted envelope. Cancel-safe: dropping the
    /// future before it resolves (e.g. inside `tokio::select!`) never
    /// loses a buffered envelope, since it delegates directly to
    /// `mpsc::Receiver::recv`.
    ///
    /// Once the stream has failed terminally, returns the terminal cause
    /// exactly once, then [`StreamError::Closed`] on every call after.
    pub async fn read(&mut self) -> Result<WebSocketReport, StreamError> {
        match self.receiver.recv().await {
            Some(report) => Ok(report),
            None => {
                let mut terminal = self.terminal.lock().expect("terminal cause mutex poisoned");
                Err(terminal.take().unwrap_or(StreamError::Closed))
            }
        }
    }

    /// A snapshot of current delivery and reconnection counters.
    pub async fn get_stats(&self) -> StatsSnapshot {
        let origins = self.statuses.lock().await.clone();
        let accepted = self.stats.accepted.load(Ordering::SeqCst);
        let deduplicated = self.stats.deduplicated.load(Ordering::SeqCst);

        StatsSnapshot {
            accepted,
            deduplicated,
            total_received: accepted + deduplicated,
            partial_reconnects: self.stats.partial_reconnects.load(Ordering::SeqCst),
            full_reconnects: self.stats.full_reconnects.load(Ordering::SeqCst),
            configured_connections: self.stats.configured_connections.load(Ordering::SeqCst),
            active_connections: self.stats.active_connections.load(Ordering::SeqCst),
            origins,
        }
    }

    /// Idempotent graceful shutdown: signals every monitor task to close
    /// its socket and stop retrying, then waits for them to finish. Safe
    /// to call more than once and safe to call after a terminal failure.
    ///
    /// Returns the terminal cause if one was pending and not yet observed
    /// by [`Stream::read`]; otherwise `Ok(())`.
    pub async fn close(&self) -> Result<(), StreamError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
        self.sender.lock().await.take();

        if let Some(handles) = self.join_handles.lock().await.take() {
            for handle in handles {
                let _ = handle.await;
            }
        }

        match self.terminal.lock().expect("terminal cause mutex poisoned").take() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }
}
