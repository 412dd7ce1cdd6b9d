//! Entity adapters.
//!
//! Each platform module defines an enum of entity kinds implementing
//! [`EntityKind`]. Kinds are stateless views over coordinator snapshots;
//! [`Entity`] adds identity (ids, friendly name) and availability.

mod binary_sensor;
mod button;
mod calendar;
mod sensor;
mod switch;
mod update;
mod water_heater;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::Display;

use super::DOMAIN;
use super::device::Device;
use super::error::DeviceError;
use super::model::Firmware;
use super::model::MachineConfig;
use super::model::Statistics;
use crate::engine::EntityState;
use crate::engine::ServiceError;
use crate::engine::state::STATE_UNAVAILABLE;

pub type Attributes = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Button,
    Calendar,
    Sensor,
    Switch,
    Update,
    WaterHeater,
}

/// Which coordinator an entity renders from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Config,
    Firmware,
    Statistics,
}

/// Latest data of every coordinator
#[derive(Debug, Clone, Default)]
pub struct Snapshots {
    pub config: Option<Arc<MachineConfig>>,
    pub firmware: Option<Arc<Firmware>>,
    pub statistics: Option<Arc<Statistics>>,
}

/// An entity's view of its data
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub state: String,
    pub attributes: Attributes,
}

impl Reading {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn on_off(on: bool) -> Self {
        Self::new(if on { "on" } else { "off" })
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Render a number the way the machine reports it: integral values without
/// a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Why an entity could not carry out a service call
#[derive(Debug)]
pub enum CallError {
    Unsupported,
    InvalidData(String),
    /// The snapshot the call needs has not been fetched yet
    NotReady,
    Device(DeviceError),
}

impl From<DeviceError> for CallError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

/// Deserialize service data, treating a missing body as an empty object
pub fn parse_data<T: DeserializeOwned>(data: &Value) -> Result<T, CallError> {
    let data = match data {
        Value::Null => Value::Object(Attributes::new()),
        other => other.clone(),
    };
    serde_json::from_value(data).map_err(|e| CallError::InvalidData(e.to_string()))
}

#[async_trait]
pub trait EntityKind: Send + Sync {
    /// Stable key, unique per machine
    fn key(&self) -> &'static str;

    fn platform(&self) -> Platform;

    /// Appended to the device name; `None` for the device's primary entity
    fn name(&self) -> Option<&'static str>;

    fn source(&self) -> Source {
        Source::Config
    }

    fn supported(&self, _device: &Device) -> bool {
        true
    }

    /// Attributes independent of the data (icon, device class, unit)
    fn describe(&self, _attributes: &mut Attributes) {}

    /// `None` when the data the entity needs is missing
    fn read(&self, device: &Device, snapshots: &Snapshots) -> Option<Reading>;

    async fn call(
        &self,
        _device: &Device,
        _snapshots: &Snapshots,
        _service: &str,
        _data: &Value,
    ) -> Result<(), CallError> {
        Err(CallError::Unsupported)
    }
}

/// Lower-case `name`, replacing runs of anything but letters and digits
/// with a single underscore
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

pub struct Entity {
    kind: Box<dyn EntityKind>,
    entity_id: String,
    unique_id: String,
    friendly_name: String,
}

impl Entity {
    pub fn new(kind: Box<dyn EntityKind>, device: &Device) -> Self {
        let friendly_name = match kind.name() {
            Some(name) => format!("{} {}", device.name(), name),
            None => device.name().to_string(),
        };
        Self {
            entity_id: format!("{}.{}", kind.platform(), slugify(&friendly_name)),
            unique_id: format!("{}_{}", device.serial(), kind.key()),
            friendly_name,
            kind,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn source(&self) -> Source {
        self.kind.source()
    }

    /// Render the entity; `available` is the availability of its source
    /// coordinator
    pub fn render(&self, device: &Device, snapshots: &Snapshots, available: bool) -> EntityState {
        let mut attributes = Attributes::new();
        attributes.insert("friendly_name".to_string(), self.friendly_name.clone().into());
        self.kind.describe(&mut attributes);

        let reading = if available {
            self.kind.read(device, snapshots)
        } else {
            None
        };

        let (state, available) = match reading {
            Some(reading) => {
                attributes.extend(reading.attributes);
                (reading.state, true)
            }
            None => (STATE_UNAVAILABLE.to_string(), false),
        };

        EntityState {
            platform: self.kind.platform().to_string(),
            unique_id: self.unique_id.clone(),
            state,
            available,
            attributes,
        }
    }

    /// Run a service against this entity
    ///
    /// Accepts the entity's platform domain and the integration's own
    /// domain.
    pub async fn call(
        &self,
        device: &Device,
        snapshots: &Snapshots,
        domain: &str,
        service: &str,
        data: &Value,
    ) -> Result<(), ServiceError> {
        let unsupported = || ServiceError::NotSupported {
            service: format!("{}.{}", domain, service),
            entity_id: self.entity_id.clone(),
        };
        if domain != DOMAIN && domain != self.kind.platform().to_string() {
            return Err(unsupported());
        }

        self.kind
            .call(device, snapshots, service, data)
            .await
            .map_err(|e| match e {
                CallError::Unsupported => unsupported(),
                CallError::InvalidData(msg) => ServiceError::InvalidData(msg),
                CallError::NotReady => ServiceError::Failed(format!(
                    "{} has no data yet, try again shortly",
                    self.entity_id
                )),
                CallError::Device(e) => {
                    ServiceError::Failed(format!("Service call encountered an error: {}", e))
                }
            })
    }
}

/// Every entity the machine supports
pub fn entities_for(device: &Device) -> Vec<Entity> {
    let kinds = binary_sensor::kinds()
        .into_iter()
        .chain(button::kinds())
        .chain(calendar::kinds())
        .chain(sensor::kinds())
        .chain(switch::kinds())
        .chain(update::kinds())
        .chain(water_heater::kinds());

    kinds
        .filter(|kind| kind.supported(device))
        .map(|kind| Entity::new(kind, device))
        .collect()
}
