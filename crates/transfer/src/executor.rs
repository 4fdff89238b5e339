//! Sequential batch executor.
//!
//! Walks a [`TransferQueue`] in order, one operation at a time, pushing
//! byte-level progress into the queue aggregates and snapshots into the
//! configured [`ProgressSink`]. A single item's failure never aborts the
//! batch; only cancellation stops the loop, leaving the tail pending.
//!
//! Uploads carry the permission fallback: devices that reject adb's
//! post-push ownership repair are flagged in the shared [`QuirkRegistry`]
//! and served through a scratch push plus device-side move for the rest
//! of the session.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::TransferError;
use crate::diagnostics::{
    is_benign_transfer_stderr, is_ownership_repair_rejection, shell_output_indicates_error,
};
use crate::queue::{TransferDirection, TransferQueue};
use crate::quirks::QuirkRegistry;
use crate::shell::single_quote;
use crate::sink::{NullSink, OperationSnapshot, ProgressSink};
use crate::transport::{DeviceTransport, ProgressFn};

/// Device-side staging area for the permission fallback.
const DEFAULT_SCRATCH_DIR: &str = "/data/local/tmp/.droidfiles";

/// Modes applied after an upload lands, matching what the device's own
/// media apps produce.
const FILE_MODE: &str = "660";
const DIR_MODE: &str = "770";

/// How often the worker re-checks a paused queue.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub completed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchResult {
    /// A batch succeeds exactly when no operation errored.
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

/// Runs transfer batches against one device.
pub struct TransferExecutor {
    transport: Arc<dyn DeviceTransport>,
    quirks: QuirkRegistry,
    sink: Arc<dyn ProgressSink>,
    scratch_dir: String,
    skip_requested: AtomicBool,
}

impl TransferExecutor {
    /// Creates an executor with no sink and the default scratch location.
    pub fn new(transport: Arc<dyn DeviceTransport>, quirks: QuirkRegistry) -> Self {
        Self {
            transport,
            quirks,
            sink: Arc::new(NullSink),
            scratch_dir: DEFAULT_SCRATCH_DIR.to_string(),
            skip_requested: AtomicBool::new(false),
        }
    }

    /// Attaches a progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Overrides the device-side scratch directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<String>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Requests that the next not-yet-started operation be skipped.
    /// An operation already mid-transfer is unaffected.
    pub fn request_skip(&self) {
        self.skip_requested.store(true, Ordering::SeqCst);
    }

    /// Executes every operation of `queue` in order and returns the batch
    /// outcome. Cancellation leaves unexecuted operations pending and the
    /// in-flight one in its last observed state.
    pub async fn run(&self, queue: &Arc<TransferQueue>) -> BatchResult {
        queue.begin();
        self.sink.queue_changed(&queue.snapshot());
        let count = queue.len();
        let direction = queue.direction();
        let cancel = queue.cancel_token();
        info!(serial = self.transport.serial(), count, ?direction, "batch started");

        let mut cancelled = false;
        for index in 0..count {
            // Pause is honored here, between operations only.
            while queue.is_paused() && !cancel.is_cancelled() {
                tokio::time::sleep(PAUSE_POLL).await;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if self.skip_requested.swap(false, Ordering::SeqCst) {
                queue.mark_skipped(index);
                self.notify(queue, index);
                continue;
            }

            queue.set_current(Some(index));
            queue.mark_in_progress(index);
            self.notify(queue, index);

            let Some(op) = queue.operation(index) else {
                continue;
            };
            debug!(source = %op.source_path, dest = %op.destination_path, "operation started");

            let outcome = match direction {
                TransferDirection::Upload => self.upload_one(queue, index, &op).await,
                TransferDirection::Download => self.download_one(queue, index, &op).await,
                TransferDirection::DeviceCopy => self.copy_on_device(&op).await,
            };

            match outcome {
                Ok(true) => queue.mark_completed(index),
                Ok(false) => queue.mark_error(index, "Transfer failed"),
                Err(TransferError::Cancelled) => {
                    // Indeterminate: the loop stops and the operation keeps
                    // its last status, which callers must not read as done.
                    cancelled = true;
                    self.notify(queue, index);
                    break;
                }
                Err(e) => {
                    warn!(source = %op.source_path, error = %e, "operation failed");
                    queue.mark_error(index, &e.to_string());
                }
            }
            self.notify(queue, index);
        }

        queue.finish();
        self.sink.queue_changed(&queue.snapshot());

        let result = BatchResult {
            completed: queue.completed_count() - queue.skipped_count(),
            errors: queue.error_count(),
            skipped: queue.skipped_count(),
            cancelled,
        };
        info!(
            completed = result.completed,
            errors = result.errors,
            skipped = result.skipped,
            cancelled = result.cancelled,
            "batch finished"
        );
        result
    }

    async fn upload_one(
        &self,
        queue: &Arc<TransferQueue>,
        index: usize,
        op: &OperationSnapshot,
    ) -> Result<bool, TransferError> {
        let serial = self.transport.serial().to_string();
        let cancel = queue.cancel_token();
        let progress = self.progress_fn(queue, index);

        if self.quirks.requires_push_workaround(&serial) {
            self.push_via_scratch(op, progress, &cancel).await?;
            return Ok(true);
        }

        let status = self
            .transport
            .push(Path::new(&op.source_path), &op.destination_path, progress, cancel)
            .await?;

        if is_ownership_repair_rejection(&status.stderr) {
            // The data copy succeeded; only the post-copy ownership repair
            // was rejected. Remember the device for the rest of the session.
            self.quirks.mark_push_workaround(&serial);
            self.apply_modes(op).await;
            return Ok(true);
        }
        if status.ok() || is_benign_transfer_stderr(&status.stderr) {
            self.apply_modes(op).await;
            return Ok(true);
        }
        if !status.stderr.trim().is_empty() {
            return Err(TransferError::Transport(status.stderr.trim().to_string()));
        }
        Ok(false)
    }

    /// Pushes to a private scratch path, then moves into place with a
    /// device-local command that never triggers the ownership repair.
    /// Directories are merged via `cp -r` so existing destination contents
    /// survive.
    async fn push_via_scratch(
        &self,
        op: &OperationSnapshot,
        progress: ProgressFn,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<(), TransferError> {
        let scratch = format!("{}/{}", self.scratch_dir.trim_end_matches('/'), Uuid::new_v4());
        debug!(dest = %op.destination_path, scratch = %scratch, "push via scratch");

        let _ = self
            .transport
            .shell(&format!("mkdir -p {}", single_quote(&self.scratch_dir)))
            .await;

        let status = match self
            .transport
            .push(Path::new(&op.source_path), &scratch, progress, cancel.clone())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                self.cleanup_scratch(&scratch).await;
                return Err(e);
            }
        };
        let push_ok = status.ok()
            || is_benign_transfer_stderr(&status.stderr)
            || is_ownership_repair_rejection(&status.stderr);
        if !push_ok {
            self.cleanup_scratch(&scratch).await;
            return Err(TransferError::Fallback(format!(
                "scratch push failed: {}",
                status.stderr.trim()
            )));
        }

        let move_cmd = if op.is_directory {
            format!(
                "cp -r {}/. {}",
                single_quote(&scratch),
                single_quote(&op.destination_path)
            )
        } else {
            format!(
                "mv {} {}",
                single_quote(&scratch),
                single_quote(&op.destination_path)
            )
        };
        let output = match self.transport.shell(&move_cmd).await {
            Ok(output) => output,
            Err(e) => {
                self.cleanup_scratch(&scratch).await;
                return Err(e);
            }
        };
        if shell_output_indicates_error(&output) {
            self.cleanup_scratch(&scratch).await;
            return Err(TransferError::Fallback(output.trim().to_string()));
        }

        if op.is_directory {
            self.cleanup_scratch(&scratch).await;
        }
        self.apply_modes(op).await;
        Ok(())
    }

    async fn cleanup_scratch(&self, scratch: &str) {
        let _ = self
            .transport
            .shell(&format!("rm -rf {}", single_quote(scratch)))
            .await;
    }

    /// Best-effort permission normalization; some paths reject chmod.
    async fn apply_modes(&self, op: &OperationSnapshot) {
        let dest = single_quote(&op.destination_path);
        if op.is_directory {
            let _ = self
                .transport
                .shell(&format!("chmod -R {DIR_MODE} {dest}"))
                .await;
            let _ = self
                .transport
                .shell(&format!(
                    "find {dest} -type f -exec chmod {FILE_MODE} {{}} \\;"
                ))
                .await;
        } else {
            let _ = self
                .transport
                .shell(&format!("chmod {FILE_MODE} {dest}"))
                .await;
        }
    }

    async fn download_one(
        &self,
        queue: &Arc<TransferQueue>,
        index: usize,
        op: &OperationSnapshot,
    ) -> Result<bool, TransferError> {
        let cancel = queue.cancel_token();
        let progress = self.progress_fn(queue, index);

        let status = self
            .transport
            .pull(&op.source_path, Path::new(&op.destination_path), progress, cancel)
            .await?;

        if status.ok() || is_benign_transfer_stderr(&status.stderr) {
            return Ok(true);
        }
        if !status.stderr.trim().is_empty() {
            return Err(TransferError::Transport(status.stderr.trim().to_string()));
        }
        Ok(false)
    }

    /// Device-to-device copy has no byte-level progress; the completion
    /// credit in `mark_completed` brings the aggregate up to size.
    async fn copy_on_device(&self, op: &OperationSnapshot) -> Result<bool, TransferError> {
        let cmd = if op.is_directory {
            format!(
                "cp -r {} {}",
                single_quote(&op.source_path),
                single_quote(&op.destination_path)
            )
        } else {
            format!(
                "cp {} {}",
                single_quote(&op.source_path),
                single_quote(&op.destination_path)
            )
        };
        let output = self.transport.shell(&cmd).await?;
        Ok(!shell_output_indicates_error(&output))
    }

    fn progress_fn(&self, queue: &Arc<TransferQueue>, index: usize) -> ProgressFn {
        let queue = Arc::clone(queue);
        let sink = Arc::clone(&self.sink);
        Arc::new(move |bytes| {
            queue.update_progress(index, bytes);
            sink.queue_changed(&queue.snapshot());
            if let Some(op) = queue.operation(index) {
                sink.operation_changed(index, &op);
            }
        })
    }

    fn notify(&self, queue: &Arc<TransferQueue>, index: usize) {
        self.sink.queue_changed(&queue.snapshot());
        if let Some(op) = queue.operation(index) {
            self.sink.operation_changed(index, &op);
        }
    }
}
