use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::Central;
use btleplug::api::Characteristic;
use btleplug::api::Manager as _;
use btleplug::api::Peripheral as _;
use btleplug::api::ScanFilter;
use btleplug::api::WriteType;
use btleplug::platform::Adapter;
use btleplug::platform::Manager;
use btleplug::platform::Peripheral;
use tracing::debug;
use uuid::Uuid;

use super::Advertisement;
use super::BluetoothApi;
use super::BluetoothScanner;
use super::Command;
use super::wire;
use crate::integrations::lamarzocco::error::DeviceError;

const AUTH_CHARACTERISTIC: Uuid = Uuid::from_u128(0x090b7847_e12b_09a8_b04b_8e0922a9abab);
const SETTINGS_CHARACTERISTIC: Uuid = Uuid::from_u128(0x050b7847_e12b_09a8_b04b_8e0922a9abab);

const SCAN_DURATION: Duration = Duration::from_secs(5);

fn ble_error(e: btleplug::Error) -> DeviceError {
    DeviceError::Bluetooth(e.to_string())
}

async fn first_adapter() -> Result<Adapter, DeviceError> {
    let manager = Manager::new().await.map_err(ble_error)?;
    manager
        .adapters()
        .await
        .map_err(ble_error)?
        .into_iter()
        .next()
        .ok_or_else(|| DeviceError::Bluetooth("No Bluetooth adapter found".to_string()))
}

/// Writes commands to a machine's settings characteristic
pub struct BleClient {
    address: String,
    name: String,
    token: String,
}

impl BleClient {
    pub fn new(address: &str, name: &str, token: &str) -> Self {
        Self {
            address: address.to_string(),
            name: name.to_string(),
            token: token.to_string(),
        }
    }

    async fn peripheral(&self) -> Result<Peripheral, DeviceError> {
        let adapter = first_adapter().await?;
        for peripheral in adapter.peripherals().await.map_err(ble_error)? {
            if peripheral
                .address()
                .to_string()
                .eq_ignore_ascii_case(&self.address)
            {
                return Ok(peripheral);
            }
        }
        Err(DeviceError::Bluetooth(format!(
            "{} ({}) is not in range",
            self.name, self.address
        )))
    }

    async fn write(&self, peripheral: &Peripheral, payload: &[u8]) -> Result<(), DeviceError> {
        if !peripheral.is_connected().await.map_err(ble_error)? {
            peripheral.connect().await.map_err(ble_error)?;
        }
        peripheral.discover_services().await.map_err(ble_error)?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid| -> Result<Characteristic, DeviceError> {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| DeviceError::Bluetooth(format!("Characteristic {} missing", uuid)))
        };

        peripheral
            .write(
                &find(AUTH_CHARACTERISTIC)?,
                self.token.as_bytes(),
                WriteType::WithResponse,
            )
            .await
            .map_err(ble_error)?;
        peripheral
            .write(&find(SETTINGS_CHARACTERISTIC)?, payload, WriteType::WithResponse)
            .await
            .map_err(ble_error)
    }
}

#[async_trait]
impl BluetoothApi for BleClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send(&self, command: &Command) -> Result<(), DeviceError> {
        let payload = wire::bluetooth_payload(command).ok_or_else(|| {
            DeviceError::Bluetooth(format!("{} cannot be sent over Bluetooth", command.name()))
        })?;
        let payload = serde_json::to_vec(&payload)
            .map_err(|e| DeviceError::Bluetooth(format!("Failed to encode payload: {}", e)))?;

        debug!("Sending {} to {} over Bluetooth", command.name(), self.address);
        let peripheral = self.peripheral().await?;
        let result = self.write(&peripheral, &payload).await;
        if let Err(e) = peripheral.disconnect().await {
            debug!("Bluetooth disconnect from {} failed: {}", self.address, e);
        }
        result
    }
}

/// Performs a short active scan on the first adapter
#[derive(Default)]
pub struct BleScanner;

#[async_trait]
impl BluetoothScanner for BleScanner {
    async fn discovered(&self) -> Result<Vec<Advertisement>, DeviceError> {
        let adapter = first_adapter().await?;
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_error)?;
        tokio::time::sleep(SCAN_DURATION).await;

        let mut found = Vec::new();
        for peripheral in adapter.peripherals().await.map_err(ble_error)? {
            let name = peripheral
                .properties()
                .await
                .map_err(ble_error)?
                .and_then(|p| p.local_name);
            found.push(Advertisement {
                name,
                address: peripheral.address().to_string(),
            });
        }

        if let Err(e) = adapter.stop_scan().await {
            debug!("Failed to stop Bluetooth scan: {}", e);
        }
        Ok(found)
    }
}
