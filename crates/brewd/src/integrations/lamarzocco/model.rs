//! Domain types for La Marzocco machines.
//!
//! These are the transport-independent shapes the coordinators store and
//! the entities read. Wire formats live in `client::wire`.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use chrono::Timelike;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;

/// Supported machine models
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum MachineModel {
    #[serde(rename = "GS3 AV")]
    #[strum(to_string = "GS3 AV")]
    Gs3Av,
    #[serde(rename = "GS3 MP")]
    #[strum(to_string = "GS3 MP")]
    Gs3Mp,
    #[serde(rename = "Linea Mini")]
    #[strum(to_string = "Linea Mini")]
    LineaMini,
    #[serde(rename = "Linea Micra", alias = "Micra")]
    #[strum(to_string = "Linea Micra", serialize = "Micra")]
    LineaMicra,
}

impl MachineModel {
    pub fn is_gs3(self) -> bool {
        matches!(self, Self::Gs3Av | Self::Gs3Mp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BoilerType {
    Coffee,
    Steam,
}

impl BoilerType {
    /// Boiler identifier used by the machine's APIs
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Coffee => "CoffeeBoiler1",
            Self::Steam => "SteamBoiler",
        }
    }

    pub fn from_identifier(id: &str) -> Option<Self> {
        match id {
            "CoffeeBoiler1" => Some(Self::Coffee),
            "SteamBoiler" => Some(Self::Steam),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Boiler {
    pub enabled: bool,
    pub target_temperature: f64,
    pub current_temperature: f64,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WeekDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<chrono::Weekday> for WeekDay {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// One day of the auto on/off schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub enabled: bool,
    pub h_on: u8,
    pub m_on: u8,
    pub h_off: u8,
    pub m_off: u8,
}

impl ScheduleDay {
    pub fn new(enabled: bool, on: NaiveTime, off: NaiveTime) -> Self {
        // hour() < 24 and minute() < 60, so the narrowing is lossless.
        Self {
            enabled,
            h_on: on.hour() as u8,
            m_on: on.minute() as u8,
            h_off: off.hour() as u8,
            m_off: off.minute() as u8,
        }
    }

    pub fn on_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.h_on.into(), self.m_on.into(), 0)
    }

    pub fn off_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.h_off.into(), self.m_off.into(), 0)
    }
}

/// Weekly auto on/off schedule
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Global switch; individual days only apply while this is set
    pub enabled: bool,
    pub days: BTreeMap<WeekDay, ScheduleDay>,
}

impl Schedule {
    pub fn day(&self, day: WeekDay) -> ScheduleDay {
        self.days.get(&day).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum SmartStandbyMode {
    /// Count down from when the machine was powered on
    PowerOn,
    /// Count down from the last brew
    #[default]
    LastBrewing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmartStandby {
    pub enabled: bool,
    pub mode: SmartStandbyMode,
    pub minutes: u16,
}

/// Machine configuration as last fetched
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineConfig {
    pub turned_on: bool,
    pub boilers: BTreeMap<BoilerType, Boiler>,
    pub brew_active: bool,
    /// Seconds the current (or last) shot has been running; local API only
    pub brew_active_duration: Option<f64>,
    /// Reservoir contact closed means water is present
    pub water_contact: bool,
    pub backflush_enabled: bool,
    pub plumbed_in: bool,
    pub auto_on_off_schedule: Schedule,
    pub smart_standby: SmartStandby,
}

impl MachineConfig {
    pub fn boiler(&self, boiler: BoilerType) -> Option<&Boiler> {
        self.boilers.get(&boiler)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FirmwareType {
    Gateway,
    Machine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub current_version: String,
    pub latest_version: String,
}

impl FirmwareVersion {
    pub fn update_available(&self) -> bool {
        self.current_version != self.latest_version
    }
}

/// Firmware versions per subsystem
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Firmware {
    pub versions: BTreeMap<FirmwareType, FirmwareVersion>,
}

impl Firmware {
    pub fn get(&self, kind: FirmwareType) -> Option<&FirmwareVersion> {
        self.versions.get(&kind)
    }
}

pub const DRINKS_K1: &str = "drinks_k1";
pub const DRINKS_K2: &str = "drinks_k2";
pub const DRINKS_K3: &str = "drinks_k3";
pub const DRINKS_K4: &str = "drinks_k4";
pub const CONTINUOUS: &str = "continuous";
pub const TOTAL_COFFEE: &str = "total_coffee";
pub const TOTAL_FLUSHING: &str = "total_flushing";

/// Drink counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub counters: BTreeMap<String, u64>,
}

impl Statistics {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counters.get(key).copied()
    }
}

impl<const N: usize> From<[(&str, u64); N]> for Statistics {
    fn from(counters: [(&str, u64); N]) -> Self {
        Self {
            counters: counters
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// A machine as listed in the cloud account's fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetDevice {
    pub serial_number: String,
    /// Model name as reported by the cloud, e.g. "GS3 AV"
    pub model: String,
    pub name: String,
    pub communication_key: String,
}
