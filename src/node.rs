//! Concurrent driver.
//!
//! A [`Node`] runs one connection as two tokio tasks sharing the protocol
//! state:
//!
//! ```text
//!             ┌──────────── Arc<Shared> ────────────┐
//!             │  Mutex<Session>                     │
//!  receiver ──┤  Mutex<ConnectionManager>           ├── sender
//!  (sink)     │  watch: status, stats snapshots     │   (source)
//!             └─────────────────────────────────────┘
//! ```
//!
//! Each lock guards one entity and is held only for a non-blocking
//! operation: never across an `.await` and never while the other is held.
//! The application's source and sink run with no lock held, so they may call
//! back into the [`Node`]. Status and statistics are published through
//! `watch` channels, so readers never contend with the tasks.

use std::net::SocketAddr;
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::core::{MAX_DATAGRAMS_PER_POLL, MAX_FRAME_SIZE, PayloadSink, PayloadSource, StatusCode};
use crate::link::{FrameCounters, IngestOutcome, LinkState, Session, StatsSnapshot};
use crate::transport::{ConnectionManager, TokioUdpTransport, TransportError, TransportHandle};

/// Extra wait past the watchdog deadline so the timeout is strictly exceeded.
const DEADLINE_SLACK: Duration = Duration::from_millis(1);

struct Shared {
    settings: Settings,
    session: Mutex<Session>,
    connection: Mutex<ConnectionManager<TokioUdpTransport>>,
    status: watch::Sender<StatusCode>,
    stats: watch::Sender<StatsSnapshot>,
    #[cfg(test)]
    receiver_cycles: AtomicUsize,
}

impl Shared {
    /// Publish the outcome of an operation and a fresh statistics snapshot.
    fn publish(&self, outcome: StatusCode) {
        let (link, snapshot) = {
            let session = self.session.lock();
            (session.link_state(), session.stats().snapshot())
        };
        let status = if !outcome.is_error() && link == LinkState::Down {
            StatusCode::WatchdogTimeout
        } else {
            outcome
        };
        self.status.send_replace(status);
        self.stats.send_replace(snapshot);
    }

    /// How long the receiver may wait before the watchdog must run.
    fn receive_timeout(&self, now: Instant) -> Duration {
        let interval = self.settings.watchdog_interval;
        let deadline = self.session.lock().watchdog().deadline();
        deadline
            .map(|at| at.saturating_duration_since(now) + DEADLINE_SLACK)
            .unwrap_or(interval)
            .min(interval)
    }
}

/// A running connection.
pub struct Node {
    shared: Arc<Shared>,
    status: watch::Receiver<StatusCode>,
    stats: watch::Receiver<StatsSnapshot>,
    shutdown: watch::Sender<bool>,
    receiver: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl Node {
    /// Bind the local port and start the receiver and sender tasks.
    ///
    /// Must be called from within a tokio runtime. A failed bind is not an
    /// error here: the tasks keep retrying at the retry interval and report
    /// it through [`Node::status`].
    pub fn spawn<S, K>(settings: Settings, source: S, sink: K) -> Self
    where
        S: PayloadSource + Send + 'static,
        K: PayloadSink + Send + 'static,
    {
        let mut connection = ConnectionManager::new(
            TransportHandle::new(TokioUdpTransport::new()),
            settings.local_port,
            settings.retry_interval,
        );
        let initial = match connection.ensure_ready(Instant::now()) {
            Ok(()) => StatusCode::Idle,
            Err(e) => e.status(),
        };

        let (status_tx, status_rx) = watch::channel(initial);
        let (stats_tx, stats_rx) = watch::channel(StatsSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            settings,
            session: Mutex::new(settings.session()),
            connection: Mutex::new(connection),
            status: status_tx,
            stats: stats_tx,
            #[cfg(test)]
            receiver_cycles: AtomicUsize::new(0),
        });

        info!(
            port = settings.local_port,
            remote = %settings.remote,
            payload_size = settings.payload_size(),
            "node started"
        );

        let receiver = tokio::spawn(run_receiver(
            Arc::clone(&shared),
            sink,
            shutdown_rx.clone(),
        ));
        let sender = tokio::spawn(run_sender(Arc::clone(&shared), source, shutdown_rx));

        Self {
            shared,
            status: status_rx,
            stats: stats_rx,
            shutdown: shutdown_tx,
            receiver: Some(receiver),
            sender: Some(sender),
        }
    }

    /// Latest status.
    pub fn status(&self) -> StatusCode {
        *self.status.borrow()
    }

    /// Latest statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        *self.stats.borrow()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusCode> {
        self.status.clone()
    }

    /// Watch statistics updates.
    pub fn subscribe_stats(&self) -> watch::Receiver<StatsSnapshot> {
        self.stats.clone()
    }

    /// Link state.
    pub fn link_state(&self) -> LinkState {
        self.shared.session.lock().link_state()
    }

    /// Copy of the payload visible to the application.
    pub fn received_payload(&self) -> Vec<u8> {
        self.shared.session.lock().received_payload().as_bytes().to_vec()
    }

    /// Frame counters.
    pub fn counters(&self) -> FrameCounters {
        self.shared.session.lock().counters()
    }

    /// Clear statistics.
    pub fn reset_stats(&self) {
        self.shared.session.lock().reset_stats();
    }

    /// Local socket address, if bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let connection = self.shared.connection.lock();
        connection.handle().transport().local_addr().ok()
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Stop both tasks and release the transport.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        for task in [self.receiver.take(), self.sender.take()].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = %e, "node task failed");
            }
        }
        self.shared.connection.lock().close();
        info!("node stopped");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        for task in [self.receiver.take(), self.sender.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("settings", &self.shared.settings)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Accepted payload copied out of the session, delivered once the lock is
/// released.
#[derive(Debug, Default)]
struct Handoff {
    payload: Vec<u8>,
    pending: bool,
}

impl PayloadSink for Handoff {
    fn consume_incoming_payload(&mut self, payload: &[u8]) {
        self.payload.clear();
        self.payload.extend_from_slice(payload);
        self.pending = true;
    }
}

impl Handoff {
    fn deliver<K: PayloadSink>(&mut self, sink: &mut K) {
        if std::mem::take(&mut self.pending) {
            sink.consume_incoming_payload(&self.payload);
        }
    }
}

async fn run_receiver<K: PayloadSink>(
    shared: Arc<Shared>,
    mut sink: K,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_FRAME_SIZE + 1];
    let mut handoff = Handoff::default();
    loop {
        #[cfg(test)]
        shared.receiver_cycles.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut outcome = StatusCode::Receiving;

        for _ in 0..MAX_DATAGRAMS_PER_POLL {
            let received = shared.connection.lock().receive(&mut buf, now);
            let len = match received {
                Ok(Some((len, _))) => len,
                Ok(None) => break,
                Err(e) => {
                    outcome = e.status();
                    break;
                }
            };
            let ingested = shared.session.lock().ingest(&buf[..len], now, &mut handoff);
            handoff.deliver(&mut sink);
            if let IngestOutcome::Malformed(e) = ingested {
                outcome = TransportError::from(e).status();
            }
        }
        shared.session.lock().evaluate_watchdog(now, &mut handoff);
        handoff.deliver(&mut sink);
        shared.publish(outcome);

        // Readiness is only cleared by a drained socket; while recovering
        // nothing drains it, so sleep instead.
        let timeout = shared.receive_timeout(now);
        let socket = {
            let connection = shared.connection.lock();
            if connection.is_ready() {
                connection.handle().transport().socket()
            } else {
                None
            }
        };
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = wait_readable(socket, timeout) => {}
        }
    }
    debug!("receiver stopped");
}

async fn wait_readable(socket: Option<Arc<tokio::net::UdpSocket>>, timeout: Duration) {
    match socket {
        Some(socket) => {
            let _ = tokio::time::timeout(timeout, socket.readable()).await;
        }
        None => tokio::time::sleep(timeout).await,
    }
}

async fn run_sender<S: PayloadSource>(
    shared: Arc<Shared>,
    mut source: S,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(shared.settings.send_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = Vec::with_capacity(shared.settings.codec.frame_size());
    let mut payload = vec![0u8; shared.settings.payload_size()];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();

        if let Err(e) = shared.connection.lock().ensure_ready(now) {
            shared.publish(e.status());
            continue;
        }

        source.produce_outgoing_payload(&mut payload);
        let composed = shared
            .session
            .lock()
            .compose(&mut |out: &mut [u8]| out.copy_from_slice(&payload), &mut buf);
        let seq = match composed {
            Ok(seq) => seq,
            Err(e) => {
                shared.publish(TransportError::from(e).status());
                continue;
            }
        };

        let sent = shared
            .connection
            .lock()
            .send(shared.settings.remote, &buf, now);
        match sent {
            Ok(_) => {
                shared.session.lock().record_sent(seq, now);
                shared.publish(StatusCode::SendComplete);
            }
            Err(e) => {
                if matches!(e, TransportError::Send(_)) {
                    shared.session.lock().record_send_error();
                }
                debug!(seq, error = %e, "frame not sent");
                shared.publish(e.status());
            }
        }
    }
    debug!("sender stopped");
}
