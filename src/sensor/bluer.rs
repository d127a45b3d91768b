//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to talk to the BlueZ daemon via D-Bus.
//! It requires the `bluetoothd` daemon to be running.

use super::{RawPayload, ReadError};
use crate::config::DeviceConfig;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, Address, Device, Session};
use std::time::Duration;

/// Interval between checks for GATT service resolution after connecting.
const SERVICES_RESOLVED_POLL: Duration = Duration::from_millis(100);

impl From<bluer::Error> for ReadError {
    fn from(err: bluer::Error) -> Self {
        ReadError::Bluetooth(err.to_string())
    }
}

/// BlueZ names characteristic objects after their declaration handle; the
/// value attribute read by handle immediately follows the declaration.
fn is_value_handle(characteristic_id: u16, value_handle: u16) -> bool {
    characteristic_id.checked_add(1) == Some(value_handle)
}

/// Connect to the device, read the characteristic holding `value_handle` and
/// disconnect again.
///
/// Connecting and reading are bounded by `timeout`. The disconnect is
/// attempted afterwards whether the read succeeded, failed or timed out; a
/// failed disconnect is only logged.
pub async fn read_characteristic(
    device: &DeviceConfig,
    value_handle: u16,
    timeout: Duration,
) -> Result<RawPayload, ReadError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let result = tokio::time::timeout(timeout, connect_and_read(&adapter, device, value_handle))
        .await
        .unwrap_or(Err(ReadError::Timeout(timeout)));

    disconnect(&adapter, device).await;
    result
}

async fn connect_and_read(
    adapter: &Adapter,
    device: &DeviceConfig,
    value_handle: u16,
) -> Result<RawPayload, ReadError> {
    let peripheral = connect(adapter, device).await?;
    read_connected(&peripheral, value_handle).await
}

/// Disconnect by address, so a connection left half-open by a timeout is
/// torn down as well.
async fn disconnect(adapter: &Adapter, device: &DeviceConfig) {
    let result = match adapter.device(device.address.into()) {
        Ok(peripheral) => peripheral.disconnect().await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => tracing::debug!(address = %device.address, "disconnected"),
        Err(err) => tracing::warn!(%err, address = %device.address, "failed to disconnect"),
    }
}

/// Reuse a device BlueZ already knows about, otherwise ask BlueZ to connect to
/// the address directly with the configured address type.
async fn connect(adapter: &Adapter, device: &DeviceConfig) -> Result<Device, ReadError> {
    let address: Address = device.address.into();

    if adapter.device_addresses().await?.contains(&address) {
        let peripheral = adapter.device(address)?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        tracing::debug!(address = %device.address, "connected to known device");
        return Ok(peripheral);
    }

    let peripheral = adapter
        .connect_device(address, device.address_type.into())
        .await?;
    tracing::debug!(address = %device.address, "connected");
    Ok(peripheral)
}

async fn read_connected(peripheral: &Device, value_handle: u16) -> Result<RawPayload, ReadError> {
    while !peripheral.is_services_resolved().await? {
        tokio::time::sleep(SERVICES_RESOLVED_POLL).await;
    }

    let characteristic = find_characteristic(peripheral, value_handle).await?;
    Ok(characteristic.read().await?)
}

async fn find_characteristic(
    peripheral: &Device,
    value_handle: u16,
) -> Result<Characteristic, ReadError> {
    for service in peripheral.services().await? {
        for characteristic in service.characteristics().await? {
            if is_value_handle(characteristic.id(), value_handle) {
                return Ok(characteristic);
            }
        }
    }
    Err(ReadError::CharacteristicNotFound(value_handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_value_handle() {
        assert!(is_value_handle(0x27, 0x28));
        assert!(!is_value_handle(0x28, 0x28));
        assert!(!is_value_handle(u16::MAX, 0x00));
    }
}
