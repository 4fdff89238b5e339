//! Progress observation: snapshot types and the sink trait.
//!
//! The engine pushes read-only snapshots into a [`ProgressSink`] on every
//! queue or operation mutation. Sinks are purely observational and must
//! not block the worker; the provided [`ChannelSink`] therefore drops
//! events when its receiver lags instead of applying back-pressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::operation::{TransferOperation, TransferStatus};
use crate::queue::TransferDirection;

/// Read-only view of the queue aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub direction: TransferDirection,
    pub total_count: usize,
    pub completed_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub overall_progress_percent: f64,
    pub current_index: Option<usize>,
    pub current_file: Option<String>,
    pub is_active: bool,
    pub speed_bps: f64,
}

/// Read-only view of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    pub source_path: String,
    pub destination_path: String,
    pub total_size: u64,
    pub bytes_transferred: u64,
    pub status: TransferStatus,
    pub error_message: Option<String>,
    pub is_directory: bool,
    pub progress_percent: f64,
    pub formatted_progress: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&TransferOperation> for OperationSnapshot {
    fn from(op: &TransferOperation) -> Self {
        Self {
            source_path: op.source_path().to_string(),
            destination_path: op.destination_path().to_string(),
            total_size: op.total_size(),
            bytes_transferred: op.bytes_transferred(),
            status: op.status(),
            error_message: op.error_message().map(str::to_string),
            is_directory: op.is_directory(),
            progress_percent: op.progress_percent(),
            formatted_progress: op.formatted_progress(),
            started_at: op.started_at(),
            finished_at: op.finished_at(),
        }
    }
}

/// Observer of live transfer progress.
///
/// Implementations must return quickly; they are invoked from the
/// executor's worker and from per-operation progress pollers.
pub trait ProgressSink: Send + Sync {
    /// Queue-level aggregates changed.
    fn queue_changed(&self, snapshot: &QueueSnapshot);

    /// One operation's state changed.
    fn operation_changed(&self, index: usize, snapshot: &OperationSnapshot);
}

/// Sink that discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn queue_changed(&self, _snapshot: &QueueSnapshot) {}
    fn operation_changed(&self, _index: usize, _snapshot: &OperationSnapshot) {}
}

/// A progress notification delivered by [`ChannelSink`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransferEvent {
    Queue {
        snapshot: QueueSnapshot,
    },
    Operation {
        index: usize,
        snapshot: OperationSnapshot,
    },
}

/// Sink that forwards snapshots over a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<TransferEvent>,
}

impl ChannelSink {
    /// Creates a sink and its receiver half.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransferEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn queue_changed(&self, snapshot: &QueueSnapshot) {
        // try_send: a slow consumer loses events rather than stalling the
        // worker.
        let _ = self.tx.try_send(TransferEvent::Queue {
            snapshot: snapshot.clone(),
        });
    }

    fn operation_changed(&self, index: usize, snapshot: &OperationSnapshot) {
        let _ = self.tx.try_send(TransferEvent::Operation {
            index,
            snapshot: snapshot.clone(),
        });
    }
}
