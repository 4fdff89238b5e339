//! Batched file-transfer engine for Android devices driven over adb.
//!
//! This crate implements the **business logic** of multi-file
//! upload/download/on-device-copy batches. It is a library crate with no
//! UI or subprocess dependencies — the host app provides a
//! [`DeviceTransport`] implementation that bridges to the actual adb
//! binary (see the `droidfiles-adb` crate).
//!
//! # Pipeline
//!
//! 1. **Plan** — expand `(source, destination)` pairs into a
//!    [`TransferQueue`] of sized [`TransferOperation`]s
//! 2. **Execute** — run operations one at a time, forwarding byte-level
//!    progress into the queue aggregates
//! 3. **Observe** — a [`ProgressSink`] receives queue and operation
//!    snapshots on every mutation
//!
//! Per-item failures never abort the batch; only explicit cancellation
//! stops the loop, leaving unexecuted items pending. Devices that reject
//! adb's post-push ownership repair are remembered in a [`QuirkRegistry`]
//! and served through a scratch-and-move fallback for the rest of the
//! session.

pub mod diagnostics;
pub mod executor;
pub mod operation;
pub mod planner;
pub mod queue;
pub mod quirks;
pub mod shell;
pub mod sink;
pub mod transport;

// Re-export primary types for convenience.
pub use executor::{BatchResult, TransferExecutor};
pub use operation::{TransferOperation, TransferStatus, format_size, format_speed};
pub use planner::{plan_device_copy, plan_download, plan_upload};
pub use queue::{TransferDirection, TransferQueue};
pub use quirks::QuirkRegistry;
pub use sink::{ChannelSink, NullSink, OperationSnapshot, ProgressSink, QueueSnapshot, TransferEvent};
pub use transport::{DeviceTransport, DirectoryEnumerator, ProgressFn, RemoteEntry, TransportStatus};

/// Errors produced by the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no device selected")]
    NoDevice,

    #[error("permission fallback failed: {0}")]
    Fallback(String),

    #[error("cancelled")]
    Cancelled,
}
