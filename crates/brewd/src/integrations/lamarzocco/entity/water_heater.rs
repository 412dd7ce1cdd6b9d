use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::Attributes;
use super::CallError;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use super::parse_data;
use crate::integrations::lamarzocco::device::Device;
use crate::integrations::lamarzocco::model::BoilerType;

/// The machine accepts tenths of a degree
const TEMPERATURE_STEP: f64 = 0.1;

/// A boiler's target temperature
///
/// On/off follows machine power for the coffee boiler and the steam boiler
/// flag for the steam boiler.
#[derive(Debug, Clone, Copy)]
pub struct WaterHeater(BoilerType);

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![
        Box::new(WaterHeater(BoilerType::Coffee)),
        Box::new(WaterHeater(BoilerType::Steam)),
    ]
}

impl WaterHeater {
    fn range(&self) -> (f64, f64) {
        match self.0 {
            BoilerType::Coffee => (85.0, 104.0),
            BoilerType::Steam => (126.0, 131.0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetTemperature {
    temperature: f64,
}

#[async_trait]
impl EntityKind for WaterHeater {
    fn key(&self) -> &'static str {
        match self.0 {
            BoilerType::Coffee => "coffee_boiler",
            BoilerType::Steam => "steam_boiler",
        }
    }

    fn platform(&self) -> Platform {
        Platform::WaterHeater
    }

    fn name(&self) -> Option<&'static str> {
        Some(match self.0 {
            BoilerType::Coffee => "Coffee boiler",
            BoilerType::Steam => "Steam boiler",
        })
    }

    /// Only the GS3 lets the steam temperature be set
    fn supported(&self, device: &Device) -> bool {
        match self.0 {
            BoilerType::Coffee => true,
            BoilerType::Steam => device.model().is_gs3(),
        }
    }

    fn describe(&self, attributes: &mut Attributes) {
        let (min, max) = self.range();
        attributes.insert("min_temp".into(), min.into());
        attributes.insert("max_temp".into(), max.into());
        attributes.insert("target_temp_step".into(), TEMPERATURE_STEP.into());
        attributes.insert("unit_of_measurement".into(), "°C".into());
        attributes.insert(
            "icon".into(),
            match self.0 {
                BoilerType::Coffee => "mdi:coffee-maker",
                BoilerType::Steam => "mdi:kettle-steam",
            }
            .into(),
        );
    }

    fn read(&self, _device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        let config = snapshots.config.as_deref()?;
        let boiler = config.boiler(self.0)?;
        let on = match self.0 {
            BoilerType::Coffee => config.turned_on,
            BoilerType::Steam => boiler.enabled,
        };
        Some(
            Reading::on_off(on)
                .with("temperature", boiler.target_temperature)
                .with("current_temperature", boiler.current_temperature),
        )
    }

    async fn call(
        &self,
        device: &Device,
        _snapshots: &Snapshots,
        service: &str,
        data: &Value,
    ) -> Result<(), CallError> {
        match service {
            "set_temperature" => {
                let SetTemperature { temperature } = parse_data(data)?;
                let (min, max) = self.range();
                if !(min..=max).contains(&temperature) {
                    return Err(CallError::InvalidData(format!(
                        "temperature {} outside {}..={}",
                        temperature, min, max
                    )));
                }
                let temperature = (temperature * 10.0).round() / 10.0;
                device.set_temp(self.0, temperature).await?;
            }
            "turn_on" | "turn_off" => {
                let on = service == "turn_on";
                match self.0 {
                    BoilerType::Coffee => device.set_power(on).await?,
                    BoilerType::Steam => device.set_steam(on).await?,
                }
            }
            _ => return Err(CallError::Unsupported),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_util::Fixture;
    use super::*;
    use crate::engine::ServiceError;
    use crate::integrations::lamarzocco::client::Command;
    use crate::integrations::lamarzocco::model::MachineModel;

    #[test]
    fn test_render() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        let state = fixture.render("water_heater.gs01234_steam_boiler");
        assert_eq!(state.state, "on");
        assert_eq!(state.attribute("temperature"), Some(&json!(128.0)));
        assert_eq!(state.attribute("current_temperature"), Some(&json!(127.5)));
        assert_eq!(state.attribute("min_temp"), Some(&json!(126.0)));
    }

    #[tokio::test]
    async fn test_set_temperature() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        fixture
            .entity("water_heater.gs01234_coffee_boiler")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "water_heater",
                "set_temperature",
                &json!({"temperature": 93}),
            )
            .await
            .unwrap();

        assert_eq!(
            fixture.mocks.cloud.link.sent(),
            vec![Command::SetTemperature {
                boiler: BoilerType::Coffee,
                temperature: 93.0,
            }]
        );
    }

    #[tokio::test]
    async fn test_temperature_out_of_range() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        let err = fixture
            .entity("water_heater.gs01234_coffee_boiler")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "water_heater",
                "set_temperature",
                &json!({"temperature": 120}),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidData(_)));
        assert_eq!(fixture.mocks.cloud.link.calls(), 0);
    }

    #[tokio::test]
    async fn test_turn_off_steam() {
        let fixture = Fixture::new(MachineModel::Gs3Mp, false);
        fixture
            .entity("water_heater.gs01234_steam_boiler")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "water_heater",
                "turn_off",
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(fixture.mocks.cloud.link.sent(), vec![Command::SetSteam(false)]);
        assert_eq!(fixture.render("water_heater.gs01234_steam_boiler").state, "off");
    }
}
