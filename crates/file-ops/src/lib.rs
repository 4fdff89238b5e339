//! Device filesystem browsing and management.
//!
//! Everything here rides on the engine's `DeviceTransport` shell contract:
//! listings come from `ls -la` (the only inventory adb offers), mutations
//! from `mkdir`/`rm`/`mv`/`cp`. Android's toybox tools report errors on
//! stdout as often as stderr, so results are classified by the shared
//! diagnostic vocabulary.

pub mod browse;
pub mod manage;

pub use browse::{FileItem, RemoteLister, parse_ls_line};
pub use manage::DeviceFileManager;

use droidfiles_transfer::TransferError;

/// Errors produced by browsing and file management.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{command} failed: {output}")]
    CommandFailed { command: String, output: String },
}
