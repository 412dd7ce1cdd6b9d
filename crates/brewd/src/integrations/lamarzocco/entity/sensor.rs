use async_trait::async_trait;

use super::Attributes;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use super::Source;
use super::format_number;
use crate::integrations::lamarzocco::device::Device;
use crate::integrations::lamarzocco::model::BoilerType;
use crate::integrations::lamarzocco::model::CONTINUOUS;
use crate::integrations::lamarzocco::model::DRINKS_K1;
use crate::integrations::lamarzocco::model::DRINKS_K2;
use crate::integrations::lamarzocco::model::DRINKS_K3;
use crate::integrations::lamarzocco::model::DRINKS_K4;
use crate::integrations::lamarzocco::model::MachineModel;
use crate::integrations::lamarzocco::model::TOTAL_COFFEE;
use crate::integrations::lamarzocco::model::TOTAL_FLUSHING;

/// Counters the GS3 AV reports, one per programmable key
const GS3_AV_COUNTERS: [&str; 7] = [
    DRINKS_K1,
    DRINKS_K2,
    DRINKS_K3,
    DRINKS_K4,
    CONTINUOUS,
    TOTAL_COFFEE,
    TOTAL_FLUSHING,
];

const SINGLE_KEY_COUNTERS: [&str; 3] = [DRINKS_K1, TOTAL_FLUSHING, TOTAL_COFFEE];

fn counters_for(model: MachineModel) -> &'static [&'static str] {
    match model {
        MachineModel::Gs3Av => &GS3_AV_COUNTERS[..],
        _ => &SINGLE_KEY_COUNTERS[..],
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Sensor {
    DrinkStats,
    ShotTimer,
    CoffeeTemp,
    SteamTemp,
}

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![
        Box::new(Sensor::DrinkStats),
        Box::new(Sensor::ShotTimer),
        Box::new(Sensor::CoffeeTemp),
        Box::new(Sensor::SteamTemp),
    ]
}

#[async_trait]
impl EntityKind for Sensor {
    fn key(&self) -> &'static str {
        match self {
            Self::DrinkStats => "drink_stats",
            Self::ShotTimer => "shot_timer",
            Self::CoffeeTemp => "current_temp_coffee",
            Self::SteamTemp => "current_temp_steam",
        }
    }

    fn platform(&self) -> Platform {
        Platform::Sensor
    }

    fn name(&self) -> Option<&'static str> {
        Some(match self {
            Self::DrinkStats => "Drink Statistics",
            Self::ShotTimer => "Shot Timer",
            Self::CoffeeTemp => "Current coffee temperature",
            Self::SteamTemp => "Current steam temperature",
        })
    }

    fn source(&self) -> Source {
        match self {
            Self::DrinkStats => Source::Statistics,
            _ => Source::Config,
        }
    }

    fn supported(&self, device: &Device) -> bool {
        match self {
            Self::ShotTimer => device.has_local(),
            _ => true,
        }
    }

    fn describe(&self, attributes: &mut Attributes) {
        attributes.insert("state_class".into(), "measurement".into());
        match self {
            Self::DrinkStats => {
                attributes.insert("icon".into(), "mdi:chart-line".into());
                attributes.insert("unit_of_measurement".into(), "drinks".into());
                attributes.insert("entity_category".into(), "diagnostic".into());
            }
            Self::ShotTimer => {
                attributes.insert("icon".into(), "mdi:timer".into());
                attributes.insert("unit_of_measurement".into(), "s".into());
                attributes.insert("device_class".into(), "duration".into());
                attributes.insert("entity_category".into(), "diagnostic".into());
            }
            Self::CoffeeTemp | Self::SteamTemp => {
                attributes.insert("unit_of_measurement".into(), "°C".into());
                attributes.insert("device_class".into(), "temperature".into());
            }
        }
    }

    fn read(&self, device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        match self {
            Self::DrinkStats => {
                let statistics = snapshots.statistics.as_deref()?;
                let total = statistics
                    .get(DRINKS_K1)?
                    .checked_add(statistics.get(TOTAL_FLUSHING)?)?;

                let mut reading = Reading::new(total.to_string());
                for counter in counters_for(device.model()) {
                    if let Some(value) = statistics.get(counter) {
                        reading = reading.with(counter, value);
                    }
                }
                Some(reading)
            }
            Self::ShotTimer => {
                let duration = snapshots.config.as_deref()?.brew_active_duration?;
                Some(Reading::new(format_number(duration)))
            }
            Self::CoffeeTemp | Self::SteamTemp => {
                let boiler = match self {
                    Self::CoffeeTemp => BoilerType::Coffee,
                    _ => BoilerType::Steam,
                };
                let boiler = snapshots.config.as_deref()?.boiler(boiler)?;
                Some(Reading::new(format_number(boiler.current_temperature)))
            }
        }
    }
}
