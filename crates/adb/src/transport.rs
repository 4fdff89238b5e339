//! Bridge from [`AdbClient`] to the engine's `DeviceTransport` contract.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use droidfiles_transfer::{DeviceTransport, ProgressFn, TransferError, TransportStatus};
use tokio_util::sync::CancellationToken;

use crate::client::AdbClient;

/// A [`DeviceTransport`] bound to one device for the life of a batch.
pub struct AdbTransport {
    client: Arc<AdbClient>,
    serial: String,
}

impl AdbTransport {
    /// Binds `client` to `serial` and selects it for addressed commands.
    pub fn new(client: Arc<AdbClient>, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        client.set_device(&serial);
        Self { client, serial }
    }
}

impl DeviceTransport for AdbTransport {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn shell<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.client.shell(command).await?) })
    }

    fn push<'a>(
        &'a self,
        local: &'a Path,
        remote: &'a str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransportStatus, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let output = self
                .client
                .push_with_progress(local, remote, progress, cancel)
                .await?;
            Ok(TransportStatus {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        })
    }

    fn pull<'a>(
        &'a self,
        remote: &'a str,
        local: &'a Path,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TransportStatus, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let output = self
                .client
                .pull_with_progress(remote, local, progress, cancel)
                .await?;
            Ok(TransportStatus {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        })
    }
}
