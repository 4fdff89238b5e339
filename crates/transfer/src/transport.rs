//! Collaborator contracts the engine is built against.
//!
//! `DeviceTransport` is implemented by the host on top of the actual adb
//! subprocess layer (see `droidfiles-adb`). Using traits keeps the engine
//! decoupled from process management and testable with mocks.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// Callback invoked with the cumulative byte count of an in-flight
/// transfer. Crosses task boundaries, so it is shared and `'static`.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Outcome of a push/pull invocation that ran to completion.
///
/// A nonzero exit does not by itself mean failure: adb emits benign
/// diagnostics (ownership-repair rejections, warnings) on stderr that the
/// engine classifies separately.
#[derive(Debug, Clone)]
pub struct TransportStatus {
    pub exit_code: i32,
    pub stderr: String,
}

impl TransportStatus {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstract connection to one Android device.
pub trait DeviceTransport: Send + Sync {
    /// Stable identity of the target device for the session.
    fn serial(&self) -> &str;

    /// Runs a shell command on the device and resolves to its stdout.
    fn shell<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>>;

    /// Copies a local file or directory onto the device.
    ///
    /// `progress` receives cumulative bytes; `cancel` must force-terminate
    /// the underlying subprocess promptly when fired.
    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote: &'a str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransportStatus, TransferError>> + Send + 'a>>;

    /// Copies a device file or directory to the local filesystem.
    fn pull<'a>(
        &'a self,
        remote: &'a str,
        local: &'a Path,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransportStatus, TransferError>> + Send + 'a>>;
}

/// One entry of a remote directory listing, as much of it as batch
/// planning needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Lists directory contents for batch planning.
pub trait DirectoryEnumerator: Send + Sync {
    /// Lists the entries of `path`. A failure applies to this path only;
    /// planning degrades the affected item rather than aborting.
    fn list<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteEntry>, TransferError>> + Send + 'a>>;
}
