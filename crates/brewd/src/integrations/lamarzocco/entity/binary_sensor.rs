use async_trait::async_trait;

use super::Attributes;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use crate::integrations::lamarzocco::device::Device;

#[derive(Debug, Clone, Copy)]
pub enum BinarySensor {
    WaterReservoir,
    BrewActive,
    BackflushEnabled,
}

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![
        Box::new(BinarySensor::WaterReservoir),
        Box::new(BinarySensor::BrewActive),
        Box::new(BinarySensor::BackflushEnabled),
    ]
}

#[async_trait]
impl EntityKind for BinarySensor {
    fn key(&self) -> &'static str {
        match self {
            Self::WaterReservoir => "water_reservoir",
            Self::BrewActive => "brew_active",
            Self::BackflushEnabled => "backflush_enabled",
        }
    }

    fn platform(&self) -> Platform {
        Platform::BinarySensor
    }

    fn name(&self) -> Option<&'static str> {
        Some(match self {
            Self::WaterReservoir => "Water tank empty",
            Self::BrewActive => "Brewing active",
            Self::BackflushEnabled => "Backflush active",
        })
    }

    /// Brewing state is only pushed over the local API
    fn supported(&self, device: &Device) -> bool {
        match self {
            Self::BrewActive => device.has_local(),
            _ => true,
        }
    }

    fn describe(&self, attributes: &mut Attributes) {
        let (device_class, icon) = match self {
            Self::WaterReservoir => ("problem", "mdi:water-well"),
            Self::BrewActive => ("running", "mdi:cup-water"),
            Self::BackflushEnabled => ("running", "mdi:water-sync"),
        };
        attributes.insert("device_class".into(), device_class.into());
        attributes.insert("icon".into(), icon.into());
        if matches!(self, Self::WaterReservoir | Self::BackflushEnabled) {
            attributes.insert("entity_category".into(), "diagnostic".into());
        }
    }

    fn read(&self, _device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        let config = snapshots.config.as_deref()?;
        Some(Reading::on_off(match self {
            // Contact closed means water is present.
            Self::WaterReservoir => !config.water_contact,
            Self::BrewActive => config.brew_active,
            Self::BackflushEnabled => config.backflush_enabled,
        }))
    }
}
