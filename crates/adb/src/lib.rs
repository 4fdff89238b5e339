//! adb subprocess transport.
//!
//! Everything the engine knows about a device goes through the `adb`
//! binary: one short-lived subprocess per command, stdout/stderr captured,
//! long-running push/pull children owned by the call so cancellation can
//! kill them. No part of the adb wire protocol is reimplemented here.

pub mod client;
pub mod config;
pub mod devices;
pub mod tracker;
pub mod transport;

pub use client::{AdbClient, CommandOutput};
pub use config::AdbConfig;
pub use devices::{Device, DeviceState, parse_devices};
pub use tracker::{DeviceEvent, DeviceTracker};
pub use transport::AdbTransport;

use droidfiles_transfer::TransferError;

/// Errors produced by the adb layer.
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no device selected")]
    NoDevice,

    #[error("cancelled")]
    Cancelled,
}

impl From<AdbError> for TransferError {
    fn from(err: AdbError) -> Self {
        match err {
            AdbError::Io(e) => TransferError::Io(e),
            AdbError::NoDevice => TransferError::NoDevice,
            AdbError::Cancelled => TransferError::Cancelled,
        }
    }
}
