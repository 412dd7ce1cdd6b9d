use async_trait::async_trait;

use super::Attributes;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use super::Source;
use crate::integrations::lamarzocco::device::Device;
use crate::integrations::lamarzocco::model::FirmwareType;

/// Installed versus latest firmware; installing is left to the vendor app
#[derive(Debug, Clone, Copy)]
pub struct Update(FirmwareType);

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![
        Box::new(Update(FirmwareType::Machine)),
        Box::new(Update(FirmwareType::Gateway)),
    ]
}

#[async_trait]
impl EntityKind for Update {
    fn key(&self) -> &'static str {
        match self.0 {
            FirmwareType::Machine => "machine_firmware",
            FirmwareType::Gateway => "gateway_firmware",
        }
    }

    fn platform(&self) -> Platform {
        Platform::Update
    }

    fn name(&self) -> Option<&'static str> {
        Some(match self.0 {
            FirmwareType::Machine => "Machine firmware",
            FirmwareType::Gateway => "Gateway firmware",
        })
    }

    fn source(&self) -> Source {
        Source::Firmware
    }

    fn describe(&self, attributes: &mut Attributes) {
        attributes.insert("device_class".into(), "firmware".into());
        attributes.insert("icon".into(), "mdi:cloud-download".into());
        attributes.insert("entity_category".into(), "diagnostic".into());
    }

    fn read(&self, _device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        let version = snapshots.firmware.as_deref()?.get(self.0)?;
        Some(
            Reading::on_off(version.update_available())
                .with("installed_version", version.current_version.clone())
                .with("latest_version", version.latest_version.clone()),
        )
    }
}
