//! Reading the raw data characteristic from the thermometer.
//!
//! This module provides a trait-based abstraction over the Bluetooth backends
//! so the run can be tested without hardware. Every transport failure is turned
//! into a [`ReadError`]; nothing from the backends leaks to the caller.

#[cfg(feature = "att")]
pub mod att;

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::config::DeviceConfig;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Attribute handle of the thermometer's data characteristic value.
pub const DATA_CHARACTERISTIC_HANDLE: u16 = 0x28;

/// Extra time a backend gets after `timeout` to tear its connection down.
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Bytes read from the data characteristic.
pub type RawPayload = Vec<u8>;

/// Error type for characteristic reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Adapter, connection or D-Bus error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    #[error("characteristic with handle {0:#06x} not found")]
    CharacteristicNotFound(u16),
    /// The device answered the read with an ATT error response
    #[error("ATT error {code:#04x} reading handle {handle:#06x}")]
    Att { handle: u16, code: u8 },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The read succeeded but returned no bytes
    #[error("device returned no data")]
    Empty,
}

/// Available Bluetooth backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw L2CAP ATT socket (direct kernel access, no daemon required)
    #[cfg(feature = "att")]
    Att,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "att", not(feature = "bluer")))]
        return Backend::Att;
        #[cfg(not(any(feature = "bluer", feature = "att")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "att")]
            Backend::Att => write!(f, "att"),
            #[cfg(not(any(feature = "bluer", feature = "att")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

/// Sensor abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait SensorReader: Send + Sync {
    fn read<'a>(
        &'a self,
        device: &'a DeviceConfig,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, ReadError>> + Send + 'a>>;
}

/// Reads the data characteristic through one of the compiled-in backends.
///
/// One connection per call, no retries. Connecting and reading are bounded by
/// `timeout`; the backend gets [`TEARDOWN_GRACE`] on top of that to
/// disconnect before the read is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct BleSensorReader {
    pub backend: Backend,
    pub timeout: Duration,
}

impl BleSensorReader {
    pub fn new(backend: Backend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }
}

impl SensorReader for BleSensorReader {
    fn read<'a>(
        &'a self,
        device: &'a DeviceConfig,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, ReadError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(
                address = %device.address,
                backend = %self.backend,
                handle = DATA_CHARACTERISTIC_HANDLE,
                "reading data characteristic"
            );
            let read = read_characteristic(
                self.backend,
                device,
                DATA_CHARACTERISTIC_HANDLE,
                self.timeout,
            );
            bounded_read(read, self.timeout + TEARDOWN_GRACE).await
        })
    }
}

/// Await a backend read for at most `limit`.
///
/// A read that returns no bytes is reported as [`ReadError::Empty`].
async fn bounded_read<F>(read: F, limit: Duration) -> Result<RawPayload, ReadError>
where
    F: Future<Output = Result<RawPayload, ReadError>>,
{
    let raw = tokio::time::timeout(limit, read)
        .await
        .map_err(|_| ReadError::Timeout(limit))??;
    if raw.is_empty() {
        Err(ReadError::Empty)
    } else {
        Ok(raw)
    }
}

/// Read one characteristic value by attribute handle using the given backend.
pub async fn read_characteristic(
    backend: Backend,
    device: &DeviceConfig,
    handle: u16,
    timeout: Duration,
) -> Result<RawPayload, ReadError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::read_characteristic(device, handle, timeout).await,
        #[cfg(feature = "att")]
        Backend::Att => att::read_characteristic(device.clone(), handle, timeout).await,
    }
}
