use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::operation::{TransferOperation, TransferStatus, format_speed};
use crate::sink::{OperationSnapshot, QueueSnapshot};

/// Direction of a batch; fixed for the queue's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Local machine to device.
    Upload,
    /// Device to local machine.
    Download,
    /// Device to device (shell `cp`).
    DeviceCopy,
}

impl TransferDirection {
    /// Verb form for display ("Uploading 3 / 7").
    pub fn label(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "Uploading",
            TransferDirection::Download => "Downloading",
            TransferDirection::DeviceCopy => "Copying",
        }
    }
}

/// One batch of transfer operations with running aggregates (thread-safe).
///
/// Created per batch request and discarded with it; mutated only by the
/// executor, read by any number of observers through snapshots. Speed is a
/// cumulative average (`transferred / elapsed`), not a sliding window.
pub struct TransferQueue {
    inner: RwLock<QueueInner>,
    cancel: CancellationToken,
    paused: AtomicBool,
}

struct QueueInner {
    direction: TransferDirection,
    operations: Vec<TransferOperation>,
    total_bytes: u64,
    transferred_bytes: u64,
    completed_count: usize,
    error_count: usize,
    skipped_count: usize,
    current_index: Option<usize>,
    is_active: bool,
    sealed: bool,
    started_at: Option<Instant>,
    speed_bps: f64,
}

impl TransferQueue {
    /// Creates an empty queue for one batch.
    pub fn new(direction: TransferDirection) -> Self {
        Self {
            inner: RwLock::new(QueueInner {
                direction,
                operations: Vec::new(),
                total_bytes: 0,
                transferred_bytes: 0,
                completed_count: 0,
                error_count: 0,
                skipped_count: 0,
                current_index: None,
                is_active: false,
                sealed: false,
                started_at: None,
                speed_bps: 0.0,
            }),
            cancel: CancellationToken::new(),
            paused: AtomicBool::new(false),
        }
    }

    /// Appends an operation and adds its size to the batch total.
    ///
    /// Returns `false` (and leaves the queue untouched) once execution has
    /// started; additions after that point are not supported.
    pub fn add_operation(&self, op: TransferOperation) -> bool {
        let mut q = self.inner.write().unwrap();
        if q.sealed {
            tracing::warn!(source = op.source_path(), "operation added after start, ignored");
            return false;
        }
        q.total_bytes += op.total_size();
        q.operations.push(op);
        true
    }

    /// Marks the queue active and seals it against further additions.
    /// The first call stamps the start time used for speed estimation.
    pub(crate) fn begin(&self) {
        let mut q = self.inner.write().unwrap();
        q.sealed = true;
        q.is_active = true;
        if q.started_at.is_none() {
            q.started_at = Some(Instant::now());
        }
    }

    pub(crate) fn finish(&self) {
        let mut q = self.inner.write().unwrap();
        q.is_active = false;
        q.current_index = None;
    }

    pub(crate) fn set_current(&self, index: Option<usize>) {
        self.inner.write().unwrap().current_index = index;
    }

    pub(crate) fn mark_in_progress(&self, index: usize) {
        let mut q = self.inner.write().unwrap();
        if let Some(op) = q.operations.get_mut(index) {
            op.set_status(TransferStatus::InProgress);
        }
    }

    /// Records a cumulative byte count for one operation and folds the
    /// delta into the batch aggregate.
    ///
    /// Reports above a known total are capped to it; a report smaller
    /// than the previous one (a restarted poll) is taken as a correction
    /// and moves the aggregate backward by the difference. Reports
    /// arriving after cancellation, or a poller's final stray tick for an
    /// operation that already reached a terminal state, are dropped.
    pub fn update_progress(&self, index: usize, bytes_transferred: u64) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut q = self.inner.write().unwrap();
        let Some(op) = q.operations.get_mut(index) else {
            return;
        };
        if op.status().is_terminal() {
            return;
        }
        let bytes_transferred = if op.total_size() > 0 {
            bytes_transferred.min(op.total_size())
        } else {
            bytes_transferred
        };
        let previous = op.bytes_transferred();
        op.set_bytes_transferred(bytes_transferred);
        if bytes_transferred >= previous {
            q.transferred_bytes += bytes_transferred - previous;
        } else {
            q.transferred_bytes = q.transferred_bytes.saturating_sub(previous - bytes_transferred);
        }

        if let Some(start) = q.started_at {
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                q.speed_bps = q.transferred_bytes as f64 / elapsed;
            }
        }
    }

    /// Marks an operation completed, crediting any shortfall so the
    /// aggregate always reaches the operation's full size even when the
    /// last progress tick was missed.
    pub fn mark_completed(&self, index: usize) {
        let mut q = self.inner.write().unwrap();
        let Some(op) = q.operations.get_mut(index) else {
            return;
        };
        op.set_status(TransferStatus::Completed);
        if op.bytes_transferred() < op.total_size() {
            let shortfall = op.total_size() - op.bytes_transferred();
            let total = op.total_size();
            op.set_bytes_transferred(total);
            q.transferred_bytes += shortfall;
        }
        q.completed_count += 1;
    }

    /// Marks an operation failed. Bytes already counted for the partial
    /// transfer stay in the aggregate: it reflects bytes moved, not bytes
    /// owned by successful files.
    pub fn mark_error(&self, index: usize, message: &str) {
        let mut q = self.inner.write().unwrap();
        let Some(op) = q.operations.get_mut(index) else {
            return;
        };
        op.set_status(TransferStatus::Error);
        op.set_error_message(message);
        q.error_count += 1;
    }

    /// Marks an operation skipped; counts toward completion, not bytes.
    pub fn mark_skipped(&self, index: usize) {
        let mut q = self.inner.write().unwrap();
        let Some(op) = q.operations.get_mut(index) else {
            return;
        };
        op.set_status(TransferStatus::Skipped);
        q.completed_count += 1;
        q.skipped_count += 1;
    }

    /// Requests cancellation of the batch and deactivates the queue.
    /// Remaining operations are left pending.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.inner.write().unwrap().is_active = false;
    }

    /// Pauses the batch. Honored between operations only; an in-flight
    /// transfer runs to its natural end first.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.inner.write().unwrap().is_active = false;
    }

    /// Resumes a paused batch.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.inner.write().unwrap().is_active = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Token observed by the executor and the in-flight transport call.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn direction(&self) -> TransferDirection {
        self.inner.read().unwrap().direction
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_active(&self) -> bool {
        self.inner.read().unwrap().is_active
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.read().unwrap().total_bytes
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.inner.read().unwrap().transferred_bytes
    }

    pub fn completed_count(&self) -> usize {
        self.inner.read().unwrap().completed_count
    }

    pub fn error_count(&self) -> usize {
        self.inner.read().unwrap().error_count
    }

    pub fn skipped_count(&self) -> usize {
        self.inner.read().unwrap().skipped_count
    }

    pub fn remaining_count(&self) -> usize {
        let q = self.inner.read().unwrap();
        q.operations.len() - q.completed_count - q.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.inner.read().unwrap().error_count > 0
    }

    /// `true` once every operation reached Completed, Error, or Skipped.
    pub fn is_completed(&self) -> bool {
        let q = self.inner.read().unwrap();
        q.completed_count + q.error_count >= q.operations.len()
    }

    pub fn overall_progress_percent(&self) -> f64 {
        let q = self.inner.read().unwrap();
        if q.total_bytes == 0 {
            0.0
        } else {
            q.transferred_bytes as f64 / q.total_bytes as f64 * 100.0
        }
    }

    pub fn current_speed_bps(&self) -> f64 {
        self.inner.read().unwrap().speed_bps
    }

    /// Display string for the current speed; empty while idle.
    pub fn formatted_speed(&self) -> String {
        let q = self.inner.read().unwrap();
        if q.speed_bps == 0.0 || !q.is_active {
            String::new()
        } else {
            format_speed(q.speed_bps)
        }
    }

    /// Display string for the estimated time remaining; empty while idle
    /// or before the speed estimate exists.
    pub fn formatted_eta(&self) -> String {
        let q = self.inner.read().unwrap();
        if q.speed_bps <= 0.0 || !q.is_active {
            return String::new();
        }
        let remaining = q.total_bytes.saturating_sub(q.transferred_bytes);
        let secs = (remaining as f64 / q.speed_bps) as u64;
        if secs == 0 {
            return String::new();
        }
        format_eta_seconds(secs)
    }

    /// Read-only copy of the queue aggregates for observers.
    pub fn snapshot(&self) -> QueueSnapshot {
        let q = self.inner.read().unwrap();
        let overall = if q.total_bytes == 0 {
            0.0
        } else {
            q.transferred_bytes as f64 / q.total_bytes as f64 * 100.0
        };
        QueueSnapshot {
            direction: q.direction,
            total_count: q.operations.len(),
            completed_count: q.completed_count,
            error_count: q.error_count,
            skipped_count: q.skipped_count,
            total_bytes: q.total_bytes,
            transferred_bytes: q.transferred_bytes,
            overall_progress_percent: overall,
            current_index: q.current_index,
            current_file: q
                .current_index
                .and_then(|i| q.operations.get(i))
                .map(|op| op.file_name().to_string()),
            is_active: q.is_active,
            speed_bps: q.speed_bps,
        }
    }

    /// Read-only copy of one operation, or `None` past the end.
    pub fn operation(&self, index: usize) -> Option<OperationSnapshot> {
        let q = self.inner.read().unwrap();
        q.operations.get(index).map(OperationSnapshot::from)
    }

    /// Snapshots of every operation, in execution order.
    pub fn operations(&self) -> Vec<OperationSnapshot> {
        let q = self.inner.read().unwrap();
        q.operations.iter().map(OperationSnapshot::from).collect()
    }
}

fn format_eta_seconds(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if days >= 1 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours >= 1 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes >= 1 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
