//! Device-side file management over the shell.
//!
//! The shell tools report success with silence; anything matching the
//! failure vocabulary in their output is treated as the operation
//! failing. Permission normalization after a copy is best-effort, since
//! plenty of paths reject chmod.

use std::sync::Arc;

use tracing::{debug, info};

use droidfiles_transfer::DeviceTransport;
use droidfiles_transfer::diagnostics::shell_output_indicates_error;
use droidfiles_transfer::shell::{double_quote, single_quote};

use crate::FileOpsError;

/// Creates, deletes, renames and copies files on the device.
pub struct DeviceFileManager {
    transport: Arc<dyn DeviceTransport>,
}

impl DeviceFileManager {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self { transport }
    }

    /// Creates a directory (and parents), then normalizes its mode.
    pub async fn create_directory(&self, path: &str) -> Result<(), FileOpsError> {
        let quoted = single_quote(path);
        self.checked(&format!("mkdir -p {quoted}")).await?;
        // Some paths reject chmod; the directory still exists.
        let _ = self.transport.shell(&format!("chmod 770 {quoted}")).await;
        info!(path, "created directory");
        Ok(())
    }

    /// Removes a file or directory tree.
    pub async fn remove(&self, path: &str) -> Result<(), FileOpsError> {
        let command = if self.is_directory(path).await {
            format!("rm -rf {}", single_quote(path))
        } else {
            format!("rm -f {}", single_quote(path))
        };
        self.checked(&command).await?;
        info!(path, "removed");
        Ok(())
    }

    /// Renames or moves an entry.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FileOpsError> {
        self.checked(&format!(
            "mv {} {}",
            single_quote(from),
            single_quote(to)
        ))
        .await?;
        info!(from, to, "renamed");
        Ok(())
    }

    /// Copies an entry on the device, then normalizes modes like the
    /// device's own media apps would.
    pub async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<(), FileOpsError> {
        let source = single_quote(from);
        let dest = single_quote(to);
        let command = if recursive {
            format!("cp -r {source} {dest}")
        } else {
            format!("cp {source} {dest}")
        };
        self.checked(&command).await?;

        if recursive {
            let _ = self.transport.shell(&format!("chmod -R 770 {dest}")).await;
            let _ = self
                .transport
                .shell(&format!("find {dest} -type f -exec chmod 660 {{}} \\;"))
                .await;
        } else {
            let _ = self.transport.shell(&format!("chmod 660 {dest}")).await;
        }
        info!(from, to, "copied");
        Ok(())
    }

    async fn is_directory(&self, path: &str) -> bool {
        let command = format!(
            "test -d {} 2>/dev/null && echo dir || echo file",
            double_quote(path)
        );
        match self.transport.shell(&command).await {
            Ok(output) => output.trim() == "dir",
            Err(_) => false,
        }
    }

    /// Runs a mutating command and classifies its output.
    async fn checked(&self, command: &str) -> Result<(), FileOpsError> {
        let output = self.transport.shell(command).await?;
        if shell_output_indicates_error(&output) {
            debug!(command, output = %output.trim(), "shell command failed");
            return Err(FileOpsError::CommandFailed {
                command: command.to_string(),
                output: output.trim().to_string(),
            });
        }
        Ok(())
    }
}
