//! Per-origin reconnection loop: dial, run, back off, repeat (component C5).

use super::connection::{self, ConnectionOutcome, ConnectionTarget, WsStream};
use super::watermark::Watermark;
use super::{OriginStatus, StatsInner, StreamError, WebSocketReport, MAX_RECONNECT_INTERVAL};

use crate::config::Config;
use crate::feed::ID;

use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};

fn backoff_duration(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let scaled = base.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
    let capped = scaled.min(MAX_RECONNECT_INTERVAL);

    let jitter = rand::thread_rng().gen_range(0.85..=1.15);
    Duration::from_secs_f64(capped.as_secs_f64() * jitter)
}

fn notify_callback(config: &Config, connected: bool, host: &str, origin: &str) {
    if let Some(callback) = &config.connection_status_callback {
        callback(connected, host, origin);
    }
}

async fn set_status(statuses: &Mutex<Vec<OriginStatus>>, index: usize, connected: bool, host: &str) {
    let mut guard = statuses.lock().await;
    if let Some(status) = guard.get_mut(index) {
        status.connected = connected;
        status.host = host.to_string();
    }
}

/// Records a reconnect (partial if at least one sibling is still up, full
/// otherwise) and reports whether the stream has run out of connections.
fn record_reconnect(stats: &StatsInner) -> bool {
    if stats.active_connections.load(Ordering::SeqCst) == 0 {
        stats.full_reconnects.fetch_add(1, Ordering::SeqCst);
        true
    } else {
        stats.partial_reconnects.fetch_add(1, Ordering::SeqCst);
        false
    }
}

fn fail_stream(terminal: &std::sync::Mutex<Option<StreamError>>, shutdown_tx: &broadcast::Sender<()>, error: StreamError) {
    let mut guard = terminal.lock().expect("terminal cause mutex poisoned");
    if guard.is_none() {
        #[cfg(feature = "tracing")]
        tracing::error!("stream failing terminally: {error}");
        *guard = Some(error);
        let _ = shutdown_tx.send(());
    }
}

/// Supervises one connection slot for the lifetime of the stream: runs the
/// already-established `initial` socket (if dialing it at subscribe time
/// succeeded), then redials with exponential backoff plus jitter on every
/// failure until either the slot exhausts `config.ws_max_reconnect` with no
/// sibling connection active, or a shutdown is requested.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn monitor_slot(
    index: usize,
    target: ConnectionTarget,
    initial: Option<(WsStream, String)>,
    config: Arc<Config>,
    feed_ids: Arc<Vec<ID>>,
    sender: mpsc::Sender<WebSocketReport>,
    dedup: Arc<Watermark>,
    stats: Arc<StatsInner>,
    statuses: Arc<Mutex<Vec<OriginStatus>>>,
    mut shutdown: broadcast::Receiver<()>,
    shutdown_tx: broadcast::Sender<()>,
    terminal: Arc<std::sync::Mutex<Option<StreamError>>>,
) {
    let mut attempt: u32 = 0;
    let mut pending_socket = initial;

    loop {
        let (socket, host) = match pending_socket.take() {
            Some(pair) => pair,
            None => {
                #[cfg(feature = "tracing")]
                tracing::info!(origin = %target.origin, url = %target.url, "dialing origin");

                let dialed = tokio::select! {
                    result = connection::dial(&config, &target, &feed_ids) => result,
                    _ = shutdown.recv() => return,
                };

                match dialed {
                    Ok(pair) => pair,
                    Err(connection::DialError::Auth(msg)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(origin = %target.origin, "authentication rejected, slot will not retry: {msg}");

                        if stats.configured_connections.load(Ordering::SeqCst) == 1 {
                            fail_stream(&terminal, &shutdown_tx, StreamError::Auth(msg));
                        }
                        set_status(&statuses, index, false, &target.url).await;
                        return;
                    }
                    Err(connection::DialError::Transport(msg)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(origin = %target.origin, "dial attempt {attempt} failed: {msg}");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &msg;

                        let exhausted = record_reconnect(&stats);
                        attempt += 1;

                        if exhausted && attempt >= config.ws_max_reconnect {
                            #[cfg(feature = "tracing")]
                            tracing::error!(origin = %target.origin, "max reconnect attempts reached, giving up");
                            fail_stream(
                                &terminal,
                                &shutdown_tx,
                                StreamError::NoActiveConnections(msg),
                            );
                            return;
                        }

                        let delay = backoff_duration(attempt, config.reconnect_base_delay);
                        #[cfg(feature = "tracing")]
                        tracing::info!(origin = %target.origin, "retrying in {delay:?} (attempt {attempt})");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.recv() => return,
                        }
                        continue;
                    }
                }
            }
        };

        attempt = 0;
        stats.active_connections.fetch_add(1, Ordering::SeqCst);
        set_status(&statuses, index, true, &host).await;
        notify_callback(&config, true, &host, &target.origin);
        #[cfg(feature = "tracing")]
        tracing::info!(origin = %target.origin, host = %host, "connected");

        let outcome = connection::run_connection(
            socket,
            sender.clone(),
            dedup.clone(),
            stats.clone(),
            shutdown.resubscribe(),
        )
        .await;

        stats.active_connections.fetch_sub(1, Ordering::SeqCst);
        set_status(&statuses, index, false, &host).await;
        notify_callback(&config, false, &host, &target.origin);

        match outcome {
            ConnectionOutcome::Shutdown => {
                #[cfg(feature = "tracing")]
                tracing::info!(origin = %target.origin, "slot stopped after shutdown signal");
                return;
            }
            ConnectionOutcome::Error(cause) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(origin = %target.origin, "connection dropped: {cause}");
                #[cfg(not(feature = "tracing"))]
                let _ = &cause;

                let exhausted = record_reconnect(&stats);
                attempt += 1;

                if exhausted && attempt >= config.ws_max_reconnect {
                    #[cfg(feature = "tracing")]
                    tracing::error!(origin = %target.origin, "max reconnect attempts reached, giving up");
                    fail_stream(
                        &terminal,
                        &shutdown_tx,
                        StreamError::NoActiveConnections(cause),
                    );
                    return;
                }

                let delay = backoff_duration(attempt, config.reconnect_base_delay);
                #[cfg(feature = "tracing")]
                tracing::info!(origin = %target.origin, "retrying in {delay:?} (attempt {attempt})");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => return,
                }
            }
        }
    }
}
