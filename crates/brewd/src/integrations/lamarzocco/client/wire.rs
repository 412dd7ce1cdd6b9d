//! JSON shapes spoken by the cloud gateway, the local API and the Bluetooth
//! settings characteristic, and their conversion into domain types.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use super::Command;
use crate::integrations::lamarzocco::model::Boiler;
use crate::integrations::lamarzocco::model::BoilerType;
use crate::integrations::lamarzocco::model::CONTINUOUS;
use crate::integrations::lamarzocco::model::DRINKS_K1;
use crate::integrations::lamarzocco::model::DRINKS_K2;
use crate::integrations::lamarzocco::model::DRINKS_K3;
use crate::integrations::lamarzocco::model::DRINKS_K4;
use crate::integrations::lamarzocco::model::Firmware;
use crate::integrations::lamarzocco::model::FirmwareType;
use crate::integrations::lamarzocco::model::FirmwareVersion;
use crate::integrations::lamarzocco::model::FleetDevice;
use crate::integrations::lamarzocco::model::MachineConfig;
use crate::integrations::lamarzocco::model::Schedule;
use crate::integrations::lamarzocco::model::ScheduleDay;
use crate::integrations::lamarzocco::model::SmartStandby;
use crate::integrations::lamarzocco::model::Statistics;
use crate::integrations::lamarzocco::model::TOTAL_COFFEE;
use crate::integrations::lamarzocco::model::TOTAL_FLUSHING;
use crate::integrations::lamarzocco::model::WeekDay;

const MODE_BREWING: &str = "BrewingMode";
const MODE_STANDBY: &str = "StandBy";

/// Cloud responses wrap their payload in `{"status": bool, "data": ...}`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_true")]
    pub status: bool,
    pub data: Option<T>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConfig {
    pub machine_mode: String,
    #[serde(default)]
    pub boilers: Vec<WireBoiler>,
    #[serde(default)]
    pub tank_status: bool,
    #[serde(default)]
    pub is_back_flush_enabled: bool,
    #[serde(default)]
    pub is_plumbed_in: bool,
    #[serde(default)]
    pub brew_active: bool,
    #[serde(default)]
    pub brew_active_duration: Option<f64>,
    #[serde(default)]
    pub weekly_scheduling_config: Option<WireSchedule>,
    #[serde(default, rename = "smartStandBy")]
    pub smart_standby: Option<SmartStandby>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBoiler {
    pub id: String,
    pub is_enabled: bool,
    pub target: f64,
    pub current: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireSchedule {
    pub enabled: bool,
    #[serde(flatten)]
    pub days: BTreeMap<WeekDay, ScheduleDay>,
}

impl From<WireConfig> for MachineConfig {
    fn from(wire: WireConfig) -> Self {
        let boilers = wire
            .boilers
            .into_iter()
            .filter_map(|b| {
                BoilerType::from_identifier(&b.id).map(|kind| {
                    (
                        kind,
                        Boiler {
                            enabled: b.is_enabled,
                            target_temperature: b.target,
                            current_temperature: b.current,
                        },
                    )
                })
            })
            .collect();

        let auto_on_off_schedule = wire
            .weekly_scheduling_config
            .map(|s| Schedule {
                enabled: s.enabled,
                days: s.days,
            })
            .unwrap_or_default();

        Self {
            turned_on: wire.machine_mode == MODE_BREWING,
            boilers,
            brew_active: wire.brew_active,
            brew_active_duration: wire.brew_active_duration,
            water_contact: wire.tank_status,
            backflush_enabled: wire.is_back_flush_enabled,
            plumbed_in: wire.is_plumbed_in,
            auto_on_off_schedule,
            smart_standby: wire.smart_standby.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFirmwareVersion {
    pub current_version: String,
    pub latest_version: String,
}

/// Firmware payload: `{"gateway": {...}, "machine": {...}}`
pub fn firmware_from_wire(wire: BTreeMap<FirmwareType, WireFirmwareVersion>) -> Firmware {
    Firmware {
        versions: wire
            .into_iter()
            .map(|(kind, v)| {
                (
                    kind,
                    FirmwareVersion {
                        current_version: v.current_version,
                        latest_version: v.latest_version,
                    },
                )
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCounter {
    pub coffee_type: i32,
    pub count: u64,
}

/// Counter list keyed by coffee type: 0..=3 are the four programmable
/// keys, 4 is continuous dosing, -1 is flushing
pub fn statistics_from_wire(counters: Vec<WireCounter>) -> Statistics {
    let mut stats = Statistics::default();
    let mut total_coffee = 0;
    for counter in counters {
        let key = match counter.coffee_type {
            0 => DRINKS_K1,
            1 => DRINKS_K2,
            2 => DRINKS_K3,
            3 => DRINKS_K4,
            4 => CONTINUOUS,
            -1 => TOTAL_FLUSHING,
            _ => continue,
        };
        if key != TOTAL_FLUSHING {
            total_coffee += counter.count;
        }
        stats.counters.insert(key.to_string(), counter.count);
    }
    stats.counters.insert(TOTAL_COFFEE.to_string(), total_coffee);
    stats
}

#[derive(Debug, Deserialize)]
pub struct WireCustomer {
    #[serde(default)]
    pub fleet: Vec<WireFleetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFleetEntry {
    pub machine: WireFleetMachine,
    pub name: String,
    pub communication_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFleetMachine {
    pub serial_number: String,
    pub model: WireFleetModel,
}

#[derive(Debug, Deserialize)]
pub struct WireFleetModel {
    pub name: String,
}

impl From<WireFleetEntry> for FleetDevice {
    fn from(entry: WireFleetEntry) -> Self {
        Self {
            serial_number: entry.machine.serial_number,
            model: entry.machine.model.name,
            name: entry.name,
            communication_key: entry.communication_key,
        }
    }
}

fn mode(on: bool) -> &'static str {
    if on { MODE_BREWING } else { MODE_STANDBY }
}

/// Path (relative to the machine's base URL) and JSON body for a command
pub fn http_request(command: &Command) -> (String, Value) {
    match command {
        Command::SetPower(on) => ("status".to_string(), json!({ "status": mode(*on) })),
        Command::SetSteam(on) => (
            "enable-boiler".to_string(),
            json!({ "identifier": BoilerType::Steam.identifier(), "state": on }),
        ),
        Command::SetTemperature {
            boiler,
            temperature,
        } => (
            "target-boiler".to_string(),
            json!({ "identifier": boiler.identifier(), "value": temperature }),
        ),
        Command::SetSmartStandby(standby) => (
            "smart-standby".to_string(),
            json!({
                "enabled": standby.enabled,
                "minutes": standby.minutes,
                "mode": standby.mode,
            }),
        ),
        Command::SetScheduleDay { day, schedule } => (
            format!("scheduling/{}", day),
            json!({
                "enabled": schedule.enabled,
                "h_on": schedule.h_on,
                "h_off": schedule.h_off,
                "m_on": schedule.m_on,
                "m_off": schedule.m_off,
            }),
        ),
        Command::SetSchedule(schedule) => (
            "scheduling".to_string(),
            json!(WireSchedule {
                enabled: schedule.enabled,
                days: schedule.days.clone(),
            }),
        ),
        Command::EnableSchedule(enabled) => (
            "scheduling/enable".to_string(),
            json!({ "enabled": enabled }),
        ),
        Command::StartBackflush => (
            "enable-backflush".to_string(),
            json!({ "enabled": true }),
        ),
    }
}

/// Payload for the Bluetooth settings characteristic, if the command can be
/// sent that way
pub fn bluetooth_payload(command: &Command) -> Option<Value> {
    match command {
        Command::SetPower(on) => Some(json!({
            "name": "MachineChangeMode",
            "parameter": { "mode": mode(*on) },
        })),
        Command::SetSteam(on) => Some(json!({
            "name": "SettingBoilerEnable",
            "parameter": { "identifier": BoilerType::Steam.identifier(), "state": on },
        })),
        Command::SetTemperature {
            boiler,
            temperature,
        } => Some(json!({
            "name": "SettingBoilerTarget",
            "parameter": { "identifier": boiler.identifier(), "value": temperature },
        })),
        _ => None,
    }
}
