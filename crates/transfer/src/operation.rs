use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single transfer operation.
///
/// `Pending -> InProgress -> {Completed | Error | Skipped}`; an operation
/// never re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Error,
    Skipped,
}

impl TransferStatus {
    /// Returns `true` for the three end states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Error | TransferStatus::Skipped
        )
    }
}

/// One file or directory transfer within a batch.
///
/// Mutated exclusively by the queue/executor during execution; observers
/// read cloned snapshots.
#[derive(Debug, Clone)]
pub struct TransferOperation {
    source_path: String,
    destination_path: String,
    total_size: u64,
    bytes_transferred: u64,
    status: TransferStatus,
    error_message: Option<String>,
    is_directory: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TransferOperation {
    /// Creates a pending operation. `total_size` of 0 means the size could
    /// not be determined ("Calculating..." while running).
    pub fn new(source_path: &str, destination_path: &str, total_size: u64, is_directory: bool) -> Self {
        Self {
            source_path: source_path.to_string(),
            destination_path: destination_path.to_string(),
            total_size,
            bytes_transferred: 0,
            status: TransferStatus::Pending,
            error_message: None,
            is_directory,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn destination_path(&self) -> &str {
        &self.destination_path
    }

    /// Final path component of the source, for display.
    pub fn file_name(&self) -> &str {
        self.source_path
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.source_path)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Percentage complete; 0 while the size is unknown.
    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            self.bytes_transferred as f64 / self.total_size as f64 * 100.0
        }
    }

    /// Display label for the operation's progress cell.
    pub fn formatted_progress(&self) -> String {
        match self.status {
            TransferStatus::Pending => "Waiting...".to_string(),
            TransferStatus::Error => "Error".to_string(),
            TransferStatus::Skipped => "Skipped".to_string(),
            TransferStatus::Completed => "Completed".to_string(),
            TransferStatus::InProgress => {
                if self.total_size == 0 {
                    "Calculating...".to_string()
                } else {
                    format!("{:.1}%", self.progress_percent())
                }
            }
        }
    }

    /// Transitions the status, stamping `started_at` on the first entry
    /// into `InProgress` and `finished_at` on the first terminal state.
    /// Neither stamp is ever overwritten.
    pub(crate) fn set_status(&mut self, status: TransferStatus) {
        self.status = status;
        match status {
            TransferStatus::InProgress => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            s if s.is_terminal() => {
                if self.finished_at.is_none() {
                    self.finished_at = Some(Utc::now());
                }
            }
            _ => {}
        }
    }

    pub(crate) fn set_bytes_transferred(&mut self, bytes: u64) {
        self.bytes_transferred = bytes;
    }

    pub(crate) fn set_error_message(&mut self, message: &str) {
        self.error_message = Some(message.to_string());
    }
}

/// Formats a byte count for display (`1.5 KB`, `2.00 GB`).
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}

/// Formats a transfer rate for display (`3.2 MB/s`).
pub fn format_speed(bytes_per_second: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    if bytes_per_second < KB {
        format!("{bytes_per_second:.0} B/s")
    } else if bytes_per_second < MB {
        format!("{:.1} KB/s", bytes_per_second / KB)
    } else if bytes_per_second < GB {
        format!("{:.1} MB/s", bytes_per_second / MB)
    } else {
        format!("{:.1} GB/s", bytes_per_second / GB)
    }
}
