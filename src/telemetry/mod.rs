//! Fire-and-forget interaction telemetry.
//!
//! The request path hands [`InteractionMetrics`] to a [`TelemetryRecorder`],
//! which pushes them onto a bounded channel without waiting. A background
//! task drains the channel into a [`TelemetrySink`]. A full channel drops the
//! record and a failing sink is logged; neither reaches the caller.

use crate::types::{AppError, InteractionMetrics, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Destination for interaction records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, metrics: &InteractionMetrics) -> Result<()>;
}

/// Writes each record as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn record(&self, metrics: &InteractionMetrics) -> Result<()> {
        info!(
            interaction_id = %metrics.interaction_id,
            agent_id = %metrics.agent_id,
            session_id = %metrics.session_id,
            user_id = ?metrics.user_id,
            response_time_ms = metrics.response_time_ms,
            confidence = ?metrics.confidence_score,
            steps = metrics.reasoning_trace.as_ref().map(|t| t.len()).unwrap_or(0),
            "interaction"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<InteractionMetrics>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<InteractionMetrics> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record(&self, metrics: &InteractionMetrics) -> Result<()> {
        self.records.lock().push(metrics.clone());
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TelemetrySink for JsonlSink {
    async fn record(&self, metrics: &InteractionMetrics) -> Result<()> {
        let mut line = serde_json::to_string(metrics)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Telemetry(format!("{}: {}", parent.display(), e)))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AppError::Telemetry(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::Telemetry(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

/// Snapshot of recorder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    /// Records the sink accepted
    pub recorded: u64,
    /// Records discarded because the channel was full or closed
    pub dropped: u64,
    /// Records the sink rejected
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

enum Event {
    Record(Box<InteractionMetrics>),
    Flush(oneshot::Sender<()>),
}

/// Non-blocking handle onto the telemetry channel. Cheap to clone.
#[derive(Clone)]
pub struct TelemetryRecorder {
    tx: mpsc::Sender<Event>,
    counters: Arc<Counters>,
}

impl TelemetryRecorder {
    /// Spawn the consumer task. Must be called inside a tokio runtime.
    pub fn new(sink: Arc<dyn TelemetrySink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    Event::Record(metrics) => match sink.record(&metrics).await {
                        Ok(()) => {
                            worker_counters.recorded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                interaction_id = %metrics.interaction_id,
                                agent_id = %metrics.agent_id,
                                error = %e,
                                "Telemetry write failed"
                            );
                        }
                    },
                    Event::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Telemetry channel closed");
        });

        Self { tx, counters }
    }

    /// Recorder backed by [`TracingSink`].
    pub fn tracing(capacity: usize) -> Self {
        Self::new(Arc::new(TracingSink), capacity)
    }

    /// Queue a record. Returns `false` when it had to be dropped.
    pub fn record(&self, metrics: InteractionMetrics) -> bool {
        match self.tx.try_send(Event::Record(Box::new(metrics))) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Telemetry channel full, dropping interaction record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Telemetry channel closed, dropping interaction record");
                false
            }
        }
    }

    /// Wait until every record queued before this call has reached the sink.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Event::Flush(ack_tx))
            .await
            .map_err(|_| AppError::Telemetry("telemetry worker stopped".into()))?;
        ack_rx
            .await
            .map_err(|_| AppError::Telemetry("telemetry worker stopped".into()))
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            recorded: self.counters.recorded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TelemetryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRecorder")
            .field("stats", &self.stats())
            .finish()
    }
}
