//! In-memory transports for tests.
//!
//! All transports of one mock machine share its state, so a command sent
//! over any link is visible to the next config fetch.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use super::Advertisement;
use super::BluetoothApi;
use super::BluetoothScanner;
use super::CloudApi;
use super::CloudCredentials;
use super::Command;
use super::LocalApi;
use super::Transports;
use crate::integrations::lamarzocco::error::DeviceError;
use crate::integrations::lamarzocco::model::Boiler;
use crate::integrations::lamarzocco::model::BoilerType;
use crate::integrations::lamarzocco::model::Firmware;
use crate::integrations::lamarzocco::model::FirmwareType;
use crate::integrations::lamarzocco::model::FirmwareVersion;
use crate::integrations::lamarzocco::model::FleetDevice;
use crate::integrations::lamarzocco::model::MachineConfig;
use crate::integrations::lamarzocco::model::Statistics;

pub const SERIAL: &str = "GS01234";
pub const TOKEN: &str = "token";

#[derive(Debug, Default)]
pub struct MockMachine {
    pub config: Mutex<MachineConfig>,
    pub firmware: Mutex<Firmware>,
    pub statistics: Mutex<Statistics>,
}

impl MockMachine {
    /// A powered-off machine with both boilers, current firmware and a few
    /// counters
    pub fn sample() -> Arc<Self> {
        let mut config = MachineConfig {
            water_contact: true,
            ..MachineConfig::default()
        };
        config.boilers.insert(
            BoilerType::Coffee,
            Boiler {
                enabled: true,
                target_temperature: 95.0,
                current_temperature: 94.8,
            },
        );
        config.boilers.insert(
            BoilerType::Steam,
            Boiler {
                enabled: true,
                target_temperature: 128.0,
                current_temperature: 127.5,
            },
        );

        let version = |v: &str| FirmwareVersion {
            current_version: v.to_string(),
            latest_version: v.to_string(),
        };
        let mut firmware = Firmware::default();
        firmware
            .versions
            .insert(FirmwareType::Gateway, version("v3.5-rc3"));
        firmware
            .versions
            .insert(FirmwareType::Machine, version("1.40"));

        Arc::new(Self {
            config: Mutex::new(config),
            firmware: Mutex::new(firmware),
            statistics: Mutex::new(Statistics::from([
                ("drinks_k1", 1047),
                ("total_flushing", 1740),
                ("total_coffee", 1047),
            ])),
        })
    }

    pub fn config(&self) -> MachineConfig {
        self.config.lock().unwrap().clone()
    }

    fn apply(&self, command: &Command) {
        let mut config = self.config.lock().unwrap();
        match command {
            Command::SetPower(on) => config.turned_on = *on,
            Command::SetSteam(on) => {
                config.boilers.entry(BoilerType::Steam).or_default().enabled = *on;
            }
            Command::SetTemperature {
                boiler,
                temperature,
            } => {
                config.boilers.entry(*boiler).or_default().target_temperature = *temperature;
            }
            Command::SetSmartStandby(standby) => config.smart_standby = *standby,
            Command::SetScheduleDay { day, schedule } => {
                config.auto_on_off_schedule.days.insert(*day, *schedule);
            }
            Command::SetSchedule(schedule) => config.auto_on_off_schedule = schedule.clone(),
            Command::EnableSchedule(enabled) => config.auto_on_off_schedule.enabled = *enabled,
            Command::StartBackflush => config.backflush_enabled = true,
        }
    }
}

/// Failure injection and a log of what went over one link
#[derive(Debug, Default)]
pub struct Link {
    failures: Mutex<VecDeque<DeviceError>>,
    sent: Mutex<Vec<Command>>,
    calls: AtomicUsize,
}

impl Link {
    /// Fail the next call on this link with `error`
    pub fn fail_next(&self, error: DeviceError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) -> Result<(), DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn send(&self, machine: &MockMachine, command: &Command) -> Result<(), DeviceError> {
        self.call()?;
        self.sent.lock().unwrap().push(command.clone());
        machine.apply(command);
        Ok(())
    }
}

pub struct MockCloud {
    pub machine: Arc<MockMachine>,
    pub link: Link,
    pub fleet: Mutex<HashMap<String, FleetDevice>>,
    pub reauths: AtomicUsize,
}

impl MockCloud {
    pub fn new(machine: Arc<MockMachine>) -> Self {
        let mut fleet = HashMap::new();
        fleet.insert(
            SERIAL.to_string(),
            FleetDevice {
                serial_number: SERIAL.to_string(),
                model: "GS3 AV".to_string(),
                name: SERIAL.to_string(),
                communication_key: TOKEN.to_string(),
            },
        );
        Self {
            machine,
            link: Link::default(),
            fleet: Mutex::new(fleet),
            reauths: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CloudApi for MockCloud {
    async fn get_fleet(&self) -> Result<HashMap<String, FleetDevice>, DeviceError> {
        self.link.call()?;
        Ok(self.fleet.lock().unwrap().clone())
    }

    async fn get_config(&self, _serial: &str) -> Result<MachineConfig, DeviceError> {
        self.link.call()?;
        let mut config = self.machine.config();
        // The cloud does not report the shot timer.
        config.brew_active_duration = None;
        Ok(config)
    }

    async fn get_firmware(&self, _serial: &str) -> Result<Firmware, DeviceError> {
        self.link.call()?;
        Ok(self.machine.firmware.lock().unwrap().clone())
    }

    async fn get_statistics(&self, _serial: &str) -> Result<Statistics, DeviceError> {
        self.link.call()?;
        Ok(self.machine.statistics.lock().unwrap().clone())
    }

    async fn send(&self, _serial: &str, command: &Command) -> Result<(), DeviceError> {
        self.link.send(&self.machine, command)
    }

    async fn reauthenticate(&self) -> Result<(), DeviceError> {
        self.link.call()?;
        self.reauths.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockLocal {
    pub machine: Arc<MockMachine>,
    pub link: Link,
}

#[async_trait]
impl LocalApi for MockLocal {
    async fn get_config(&self) -> Result<MachineConfig, DeviceError> {
        self.link.call()?;
        Ok(self.machine.config())
    }

    async fn send(&self, command: &Command) -> Result<(), DeviceError> {
        self.link.send(&self.machine, command)
    }
}

pub struct MockBluetooth {
    pub machine: Arc<MockMachine>,
    pub link: Link,
    pub address: String,
}

#[async_trait]
impl BluetoothApi for MockBluetooth {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send(&self, command: &Command) -> Result<(), DeviceError> {
        self.link.send(&self.machine, command)
    }
}

#[derive(Default)]
pub struct MockScanner {
    pub advertisements: Mutex<Vec<Advertisement>>,
}

impl MockScanner {
    pub fn with(advertisements: &[(&str, &str)]) -> Self {
        Self {
            advertisements: Mutex::new(
                advertisements
                    .iter()
                    .map(|(name, address)| Advertisement {
                        name: Some(name.to_string()),
                        address: address.to_string(),
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl BluetoothScanner for MockScanner {
    async fn discovered(&self) -> Result<Vec<Advertisement>, DeviceError> {
        Ok(self.advertisements.lock().unwrap().clone())
    }
}

/// Hands out the same mock clients every time
pub struct MockTransports {
    pub machine: Arc<MockMachine>,
    pub cloud: Arc<MockCloud>,
    pub local: Arc<MockLocal>,
    pub bluetooth: Arc<MockBluetooth>,
    pub scanner: Option<Arc<MockScanner>>,
    pub credentials: Mutex<Vec<CloudCredentials>>,
}

impl MockTransports {
    pub fn new(machine: Arc<MockMachine>) -> Self {
        Self {
            cloud: Arc::new(MockCloud::new(machine.clone())),
            local: Arc::new(MockLocal {
                machine: machine.clone(),
                link: Link::default(),
            }),
            bluetooth: Arc::new(MockBluetooth {
                machine: machine.clone(),
                link: Link::default(),
                address: "AA:BB:CC:DD:EE:FF".to_string(),
            }),
            machine,
            scanner: None,
            credentials: Mutex::new(Vec::new()),
        }
    }

    pub fn with_scanner(mut self, scanner: MockScanner) -> Self {
        self.scanner = Some(Arc::new(scanner));
        self
    }
}

impl Transports for MockTransports {
    fn cloud(&self, credentials: CloudCredentials) -> Arc<dyn CloudApi> {
        self.credentials.lock().unwrap().push(credentials);
        self.cloud.clone()
    }

    fn local(&self, _host: &str, _token: &str) -> Arc<dyn LocalApi> {
        self.local.clone()
    }

    fn bluetooth(&self, _address: &str, _name: &str, _token: &str) -> Option<Arc<dyn BluetoothApi>> {
        Some(self.bluetooth.clone())
    }

    fn scanner(&self) -> Option<Arc<dyn BluetoothScanner>> {
        self.scanner
            .clone()
            .map(|s| s as Arc<dyn BluetoothScanner>)
    }
}
