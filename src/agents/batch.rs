//! Debounced batch queue.
//!
//! Each agent owns one queue actor. Documents accumulate until either the
//! batch size limit is reached (immediate flush) or the batch timeout expires
//! after the first queued document (timer flush). The actor task is the only
//! owner of the pending items and the timer, so no locks are involved.

use crate::types::{AppError, AuthUser, BatchSummary, Document, Result};
use crate::utils::toml_config::BatchConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

const COMMAND_CAPACITY: usize = 256;
const FLUSH_EVENT_CAPACITY: usize = 64;

/// A document waiting in the queue, with the caller it was queued for.
#[derive(Debug, Clone)]
pub struct QueuedDocument {
    pub document: Document,
    pub user: Option<AuthUser>,
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    /// The queue reached `max_batch_size`
    Size,
    /// `batch_timeout_ms` elapsed since the first queued document
    Timer,
    /// `cleanup()` or the runtime was dropped
    Shutdown,
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Published after every flush.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFlush {
    pub agent_id: String,
    pub trigger: FlushTrigger,
    pub size: usize,
    pub summary: BatchSummary,
}

/// Answer to an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueReceipt {
    /// Queue length including this document, before any flush
    pub queued: usize,
    /// Whether this document triggered a size flush
    pub flushed: bool,
}

/// Runs the documents of a flush.
#[async_trait]
pub trait BatchProcessor: Send + Sync + 'static {
    fn agent_id(&self) -> String;

    /// Read on every enqueue so config updates apply to the next document.
    fn batch_policy(&self) -> BatchConfig;

    async fn flush(&self, items: Vec<QueuedDocument>) -> BatchSummary;
}

enum Command {
    Enqueue {
        item: QueuedDocument,
        ack: oneshot::Sender<QueueReceipt>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Idle,
    FlushScheduled { deadline: Instant },
}

/// Handle onto a queue actor. Dropping it flushes what is left.
pub struct BatchQueue {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<BatchFlush>,
}

impl BatchQueue {
    /// Spawn the actor. Must be called inside a tokio runtime.
    pub fn spawn(processor: Arc<dyn BatchProcessor>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(FLUSH_EVENT_CAPACITY);

        let actor = QueueActor {
            processor,
            pending: Vec::new(),
            state: QueueState::Idle,
            events: events.clone(),
        };
        tokio::spawn(actor.run(rx));

        Self { tx, events }
    }

    pub async fn enqueue(&self, item: QueuedDocument) -> Result<QueueReceipt> {
        let (ack, receipt) = oneshot::channel();
        self.tx
            .send(Command::Enqueue { item, ack })
            .await
            .map_err(|_| closed())?;
        receipt.await.map_err(|_| closed())
    }

    /// Flush remaining documents and stop the actor. Safe to call twice.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown { ack }).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchFlush> {
        self.events.subscribe()
    }
}

fn closed() -> AppError {
    AppError::Internal("batch queue is closed".into())
}

struct QueueActor {
    processor: Arc<dyn BatchProcessor>,
    pending: Vec<QueuedDocument>,
    state: QueueState,
    events: broadcast::Sender<BatchFlush>,
}

impl QueueActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        loop {
            let command = match self.state {
                QueueState::Idle => rx.recv().await,
                QueueState::FlushScheduled { deadline } => {
                    tokio::select! {
                        command = rx.recv() => command,
                        _ = sleep_until(deadline) => {
                            self.flush(FlushTrigger::Timer).await;
                            continue;
                        }
                    }
                }
            };

            match command {
                Some(Command::Enqueue { item, ack }) => self.enqueue(item, ack).await,
                Some(Command::Shutdown { ack }) => {
                    self.flush(FlushTrigger::Shutdown).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    self.flush(FlushTrigger::Shutdown).await;
                    break;
                }
            }
        }
        debug!(agent_id = %self.processor.agent_id(), "Batch queue stopped");
    }

    async fn enqueue(&mut self, item: QueuedDocument, ack: oneshot::Sender<QueueReceipt>) {
        let policy = self.processor.batch_policy();
        self.pending.push(item);
        let queued = self.pending.len();

        if queued >= policy.max_batch_size {
            let _ = ack.send(QueueReceipt {
                queued,
                flushed: true,
            });
            self.flush(FlushTrigger::Size).await;
            return;
        }

        if self.state == QueueState::Idle {
            let deadline = Instant::now() + Duration::from_millis(policy.batch_timeout_ms);
            self.state = QueueState::FlushScheduled { deadline };
        }
        let _ = ack.send(QueueReceipt {
            queued,
            flushed: false,
        });
    }

    /// Drain the queue and cancel any pending timer.
    async fn flush(&mut self, trigger: FlushTrigger) {
        self.state = QueueState::Idle;
        if self.pending.is_empty() {
            return;
        }

        let items = std::mem::take(&mut self.pending);
        let size = items.len();
        let agent_id = self.processor.agent_id();
        info!(agent_id = %agent_id, trigger = %trigger, size, "Flushing batch queue");

        let summary = self.processor.flush(items).await;
        debug!(
            agent_id = %agent_id,
            successful = summary.successful,
            failed = summary.failed,
            "Batch flush complete"
        );

        // No subscribers is fine
        let _ = self.events.send(BatchFlush {
            agent_id,
            trigger,
            size,
            summary,
        });
    }
}
