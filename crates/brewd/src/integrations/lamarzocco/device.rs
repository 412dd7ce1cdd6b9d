use std::sync::Arc;

use chrono::NaiveTime;
use tracing::debug;
use tracing::warn;

use super::client::BluetoothApi;
use super::client::CloudApi;
use super::client::Command;
use super::client::LocalApi;
use super::error::DeviceError;
use super::error::TransportKind;
use super::model::BoilerType;
use super::model::Firmware;
use super::model::MachineConfig;
use super::model::MachineModel;
use super::model::Schedule;
use super::model::ScheduleDay;
use super::model::SmartStandby;
use super::model::SmartStandbyMode;
use super::model::Statistics;
use super::model::WeekDay;

/// One physical machine and the links that reach it
///
/// Reads go local-first with a cloud fallback; writes try the transports in
/// a per-command preference order.
pub struct Device {
    serial: String,
    name: String,
    model: MachineModel,
    cloud: Arc<dyn CloudApi>,
    local: Option<Arc<dyn LocalApi>>,
    bluetooth: Option<Arc<dyn BluetoothApi>>,
}

/// Transports to try for a command, most preferred first
fn preference(command: &Command) -> &'static [TransportKind] {
    match command {
        Command::SetPower(_) | Command::SetSteam(_) => &[
            TransportKind::Bluetooth,
            TransportKind::Local,
            TransportKind::Cloud,
        ],
        _ => &[TransportKind::Local, TransportKind::Cloud],
    }
}

impl Device {
    pub fn new(serial: &str, name: &str, model: MachineModel, cloud: Arc<dyn CloudApi>) -> Self {
        Self {
            serial: serial.to_string(),
            name: name.to_string(),
            model,
            cloud,
            local: None,
            bluetooth: None,
        }
    }

    pub fn with_local(mut self, local: Arc<dyn LocalApi>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_bluetooth(mut self, bluetooth: Arc<dyn BluetoothApi>) -> Self {
        self.bluetooth = Some(bluetooth);
        self
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> MachineModel {
        self.model
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_bluetooth(&self) -> bool {
        self.bluetooth.is_some()
    }

    pub async fn get_config(&self) -> Result<MachineConfig, DeviceError> {
        if let Some(local) = &self.local {
            match local.get_config().await {
                Ok(config) => return Ok(config),
                Err(e) if e.falls_through(TransportKind::Local) => {
                    warn!(
                        "{}: local config fetch failed, using cloud: {}",
                        self.serial, e
                    );
                }
                // A rejected key rules out the local link; the cloud still
                // serves reads.
                Err(e) if e.rejected_by(TransportKind::Local) => {
                    warn!(
                        "{}: machine rejected its communication key, using cloud: {}",
                        self.serial, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        self.cloud.get_config(&self.serial).await
    }

    pub async fn get_firmware(&self) -> Result<Firmware, DeviceError> {
        self.cloud.get_firmware(&self.serial).await
    }

    pub async fn get_statistics(&self) -> Result<Statistics, DeviceError> {
        self.cloud.get_statistics(&self.serial).await
    }

    pub async fn reauthenticate(&self) -> Result<(), DeviceError> {
        self.cloud.reauthenticate().await
    }

    pub async fn set_power(&self, on: bool) -> Result<(), DeviceError> {
        self.dispatch(&Command::SetPower(on)).await
    }

    pub async fn set_steam(&self, on: bool) -> Result<(), DeviceError> {
        self.dispatch(&Command::SetSteam(on)).await
    }

    pub async fn set_temp(&self, boiler: BoilerType, temperature: f64) -> Result<(), DeviceError> {
        self.dispatch(&Command::SetTemperature {
            boiler,
            temperature,
        })
        .await
    }

    pub async fn set_smart_standby(
        &self,
        enabled: bool,
        mode: SmartStandbyMode,
        minutes: u16,
    ) -> Result<(), DeviceError> {
        self.dispatch(&Command::SetSmartStandby(SmartStandby {
            enabled,
            mode,
            minutes,
        }))
        .await
    }

    pub async fn set_schedule_day(
        &self,
        day: WeekDay,
        enabled: bool,
        on: NaiveTime,
        off: NaiveTime,
    ) -> Result<(), DeviceError> {
        self.dispatch(&Command::SetScheduleDay {
            day,
            schedule: ScheduleDay::new(enabled, on, off),
        })
        .await
    }

    /// Replace the whole weekly schedule
    pub async fn set_schedule(&self, schedule: Schedule) -> Result<(), DeviceError> {
        self.dispatch(&Command::SetSchedule(schedule)).await
    }

    pub async fn enable_schedule_globally(&self, enabled: bool) -> Result<(), DeviceError> {
        self.dispatch(&Command::EnableSchedule(enabled)).await
    }

    pub async fn start_backflush(&self) -> Result<(), DeviceError> {
        self.dispatch(&Command::StartBackflush).await
    }

    /// Send `command` over the first transport that accepts it
    async fn dispatch(&self, command: &Command) -> Result<(), DeviceError> {
        let mut last_error = None;

        for &transport in preference(command) {
            let result = match transport {
                TransportKind::Bluetooth => match &self.bluetooth {
                    Some(bluetooth) => {
                        debug!(
                            "{}: sending {} to {}",
                            self.serial,
                            command.name(),
                            bluetooth.address()
                        );
                        bluetooth.send(command).await
                    }
                    None => continue,
                },
                TransportKind::Local => match &self.local {
                    Some(local) => local.send(command).await,
                    None => continue,
                },
                TransportKind::Cloud => self.cloud.send(&self.serial, command).await,
            };

            match result {
                Ok(()) => {
                    debug!(
                        "{}: {} sent over {}",
                        self.serial,
                        command.name(),
                        transport
                    );
                    return Ok(());
                }
                Err(e) if e.falls_through(transport) => {
                    warn!(
                        "{}: {} over {} failed, trying next transport: {}",
                        self.serial,
                        command.name(),
                        transport,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(DeviceError::NoTransport(command.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::lamarzocco::client::mock::MockTransports;
    use crate::integrations::lamarzocco::client::mock::MockMachine;
    use crate::integrations::lamarzocco::client::mock::SERIAL;

    fn mocks() -> MockTransports {
        MockTransports::new(MockMachine::sample())
    }

    fn cloud_only(m: &MockTransports) -> Device {
        Device::new(SERIAL, SERIAL, MachineModel::Gs3Av, m.cloud.clone())
    }

    fn all_links(m: &MockTransports) -> Device {
        cloud_only(m)
            .with_local(m.local.clone())
            .with_bluetooth(m.bluetooth.clone())
    }

    #[tokio::test]
    async fn test_power_prefers_bluetooth() {
        let m = mocks();
        let device = all_links(&m);

        device.set_power(true).await.unwrap();

        assert_eq!(m.bluetooth.link.sent(), vec![Command::SetPower(true)]);
        assert!(m.local.link.sent().is_empty());
        assert!(m.cloud.link.sent().is_empty());
        assert!(m.machine.config().turned_on);
    }

    #[tokio::test]
    async fn test_bluetooth_failure_falls_through_to_local() {
        let m = mocks();
        let device = all_links(&m);
        m.bluetooth
            .link
            .fail_next(DeviceError::Bluetooth("out of range".into()));

        device.set_steam(false).await.unwrap();

        assert!(m.bluetooth.link.sent().is_empty());
        assert_eq!(m.local.link.sent(), vec![Command::SetSteam(false)]);
    }

    #[tokio::test]
    async fn test_unreachable_local_falls_through_to_cloud() {
        let m = mocks();
        let device = cloud_only(&m).with_local(m.local.clone());
        m.local
            .link
            .fail_next(DeviceError::unreachable(TransportKind::Local, "refused"));

        device.start_backflush().await.unwrap();

        assert_eq!(m.cloud.link.sent(), vec![Command::StartBackflush]);
    }

    #[tokio::test]
    async fn test_local_rejection_is_final() {
        let m = mocks();
        let device = cloud_only(&m).with_local(m.local.clone());
        m.local
            .link
            .fail_next(DeviceError::RequestNotSuccessful("500".into()));

        let result = device.set_temp(BoilerType::Coffee, 93.0).await;

        assert_eq!(
            result,
            Err(DeviceError::RequestNotSuccessful("500".into()))
        );
        assert!(m.cloud.link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_never_uses_bluetooth() {
        let m = mocks();
        let device = cloud_only(&m).with_bluetooth(m.bluetooth.clone());

        device
            .set_schedule_day(
                WeekDay::Monday,
                true,
                NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            )
            .await
            .unwrap();

        assert!(m.bluetooth.link.sent().is_empty());
        let day = m.machine.config().auto_on_off_schedule.day(WeekDay::Monday);
        assert_eq!((day.h_on, day.h_off, day.m_off), (7, 9, 30));
    }

    #[tokio::test]
    async fn test_rejected_key_is_final_for_commands() {
        let m = mocks();
        let device = cloud_only(&m).with_local(m.local.clone());
        m.local
            .link
            .fail_next(DeviceError::auth_fail(TransportKind::Local, "bad key"));

        let result = device.start_backflush().await;

        assert!(result.is_err_and(|e| e.rejected_by(TransportKind::Local)));
        assert!(m.cloud.link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_key_reads_config_from_cloud() {
        let m = mocks();
        let device = cloud_only(&m).with_local(m.local.clone());
        m.local
            .link
            .fail_next(DeviceError::auth_fail(TransportKind::Local, "bad key"));

        device.get_config().await.unwrap();
        assert_eq!(m.local.link.calls(), 1);
        assert_eq!(m.cloud.link.calls(), 1);
    }

    #[tokio::test]
    async fn test_config_falls_back_to_cloud() {
        let m = mocks();
        let device = cloud_only(&m).with_local(m.local.clone());
        m.local
            .link
            .fail_next(DeviceError::unreachable(TransportKind::Local, "refused"));

        device.get_config().await.unwrap();
        assert_eq!(m.local.link.calls(), 1);
        assert_eq!(m.cloud.link.calls(), 1);
    }

    #[tokio::test]
    async fn test_cloud_error_propagates() {
        let m = mocks();
        let device = cloud_only(&m);
        m.cloud
            .link
            .fail_next(DeviceError::Timeout(TransportKind::Cloud));

        assert_eq!(
            device.set_power(false).await,
            Err(DeviceError::Timeout(TransportKind::Cloud))
        );
    }
}
