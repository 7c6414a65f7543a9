//! Generic UDP collector.
//!
//! One collector per capability: it owns a decoder, binds a socket on
//! `start`, and runs a background task that feeds decoded records into
//! the shared store. Decode failures never stop the loop; they only move
//! the `dropped` counter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::decode::FlowDecoder;
use crate::store::FlowStore;

/// Maximum UDP datagram size accepted.
const RECV_BUF_LEN: usize = 65_535;

/// Pause after a transient receive error.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Snapshot of a collector's health and counters.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub name: String,
    pub running: bool,
    pub host: String,
    pub port: u16,
    pub ingested: u64,
    pub dropped: u64,
}

struct RunningTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct UdpCollector {
    name: String,
    store: Arc<FlowStore>,
    decoder: Box<dyn FlowDecoder>,
    running: AtomicBool,
    ingested: AtomicU64,
    dropped: AtomicU64,
    endpoint: Mutex<(String, u16)>,
    task: Mutex<Option<RunningTask>>,
}

impl UdpCollector {
    /// `default_host`/`default_port` are what status reports before the
    /// first start; `start` parameters override them.
    pub fn new(
        name: &str,
        default_host: &str,
        default_port: u16,
        store: Arc<FlowStore>,
        decoder: Box<dyn FlowDecoder>,
    ) -> Self {
        Self {
            name: name.to_string(),
            store,
            decoder,
            running: AtomicBool::new(false),
            ingested: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            endpoint: Mutex::new((default_host.to_string(), default_port)),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the socket and spawn the receive task. Port 0 requests an
    /// ephemeral port; the bound port is recorded for status. Idempotent:
    /// a second start reports "already running" without side effects.
    pub async fn start(self: &Arc<Self>, host: &str, port: u16) -> Result<String> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok("already running".to_string());
        }

        let socket = UdpSocket::bind((host, port)).await?;
        let bound_port = socket.local_addr()?.port();
        *self.endpoint.lock().await = (host.to_string(), bound_port);

        let (stop_tx, stop_rx) = watch::channel(false);
        let collector = Arc::clone(self);
        let handle = tokio::spawn(async move {
            collector.run(socket, stop_rx).await;
        });

        *task = Some(RunningTask { stop_tx, handle });
        self.running.store(true, Ordering::Relaxed);

        info!(name = %self.name, host, port = bound_port, "collector listening");
        Ok(format!(
            "{} collector started on {host}:{bound_port}",
            self.name
        ))
    }

    /// Signal the task and wait for it to finish. Idempotent.
    pub async fn stop(&self) -> String {
        let mut task = self.task.lock().await;
        let Some(running) = task.take() else {
            return "not running".to_string();
        };

        let _ = running.stop_tx.send(true);
        if let Err(e) = running.handle.await {
            warn!(name = %self.name, "collector task join failed: {e}");
        }
        self.running.store(false, Ordering::Relaxed);

        info!(name = %self.name, "collector stopped");
        "stopped".to_string()
    }

    pub async fn status(&self) -> CollectorStatus {
        let (host, port) = self.endpoint.lock().await.clone();
        CollectorStatus {
            name: self.name.clone(),
            running: self.running.load(Ordering::Relaxed),
            host,
            port,
            ingested: self.ingested.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    async fn run(self: Arc<Self>, socket: UdpSocket, mut stop_rx: watch::Receiver<bool>) {
        let mut buf = vec![0u8; RECV_BUF_LEN];

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    debug!(name = %self.name, "collector task exiting");
                    break;
                }
                recv = socket.recv_from(&mut buf) => match recv {
                    Ok((len, peer)) => {
                        let exporter = peer.ip().to_string();
                        let mut flows = self.decoder.decode(&buf[..len], &exporter);

                        if flows.is_empty() {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            debug!(name = %self.name, len, %exporter, "datagram decoded to nothing");
                        } else {
                            for flow in &mut flows {
                                flow.exporter = Some(exporter.clone());
                            }
                            self.ingested.fetch_add(flows.len() as u64, Ordering::Relaxed);
                            self.store.add_many(flows).await;
                        }
                    }
                    Err(e) => {
                        warn!(name = %self.name, "UDP recv error: {e}");
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}
