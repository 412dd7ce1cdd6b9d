use async_trait::async_trait;
use serde_json::Value;

use super::Attributes;
use super::CallError;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use crate::integrations::lamarzocco::device::Device;
use crate::integrations::lamarzocco::model::BoilerType;

#[derive(Debug, Clone, Copy)]
pub enum Switch {
    Main,
    AutoOnOff,
    SteamBoiler,
    SmartStandby,
}

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![
        Box::new(Switch::Main),
        Box::new(Switch::AutoOnOff),
        Box::new(Switch::SteamBoiler),
        Box::new(Switch::SmartStandby),
    ]
}

#[async_trait]
impl EntityKind for Switch {
    fn key(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::AutoOnOff => "auto_on_off",
            Self::SteamBoiler => "steam_boiler_enable",
            Self::SmartStandby => "smart_standby_enabled",
        }
    }

    fn platform(&self) -> Platform {
        Platform::Switch
    }

    fn name(&self) -> Option<&'static str> {
        match self {
            Self::Main => None,
            Self::AutoOnOff => Some("Auto on/off"),
            Self::SteamBoiler => Some("Steam boiler"),
            Self::SmartStandby => Some("Smart standby enabled"),
        }
    }

    fn describe(&self, attributes: &mut Attributes) {
        match self {
            Self::Main => {}
            Self::AutoOnOff => {
                attributes.insert("icon".into(), "mdi:alarm".into());
                attributes.insert("entity_category".into(), "config".into());
            }
            Self::SteamBoiler => {
                attributes.insert("icon".into(), "mdi:water-boiler".into());
            }
            Self::SmartStandby => {
                attributes.insert("entity_category".into(), "config".into());
            }
        }
    }

    fn read(&self, _device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        let config = snapshots.config.as_deref()?;
        let on = match self {
            Self::Main => config.turned_on,
            Self::AutoOnOff => config.auto_on_off_schedule.enabled,
            Self::SteamBoiler => config.boiler(BoilerType::Steam)?.enabled,
            Self::SmartStandby => config.smart_standby.enabled,
        };
        let reading = Reading::on_off(on);

        Some(match self {
            Self::SmartStandby => reading
                .with("mode", config.smart_standby.mode.to_string())
                .with("minutes", config.smart_standby.minutes),
            _ => reading,
        })
    }

    async fn call(
        &self,
        device: &Device,
        snapshots: &Snapshots,
        service: &str,
        _data: &Value,
    ) -> Result<(), CallError> {
        let on = match service {
            "turn_on" => true,
            "turn_off" => false,
            _ => return Err(CallError::Unsupported),
        };

        match self {
            Self::Main => device.set_power(on).await?,
            Self::AutoOnOff => device.enable_schedule_globally(on).await?,
            Self::SteamBoiler => device.set_steam(on).await?,
            Self::SmartStandby => {
                let standby = snapshots
                    .config
                    .as_deref()
                    .ok_or(CallError::NotReady)?
                    .smart_standby;
                device
                    .set_smart_standby(on, standby.mode, standby.minutes)
                    .await?
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_util::Fixture;
    use crate::engine::ServiceError;
    use crate::integrations::lamarzocco::client::Command;
    use crate::integrations::lamarzocco::error::DeviceError;
    use crate::integrations::lamarzocco::model::MachineModel;
    use crate::integrations::lamarzocco::model::SmartStandby;
    use crate::integrations::lamarzocco::model::SmartStandbyMode;

    #[test]
    fn test_render() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        assert_eq!(fixture.render("switch.gs01234").state, "off");
        assert_eq!(fixture.render("switch.gs01234_steam_boiler").state, "on");

        let auto = fixture.render("switch.gs01234_auto_on_off");
        assert_eq!(auto.state, "off");
        assert_eq!(auto.attribute("entity_category"), Some(&json!("config")));
    }

    #[tokio::test]
    async fn test_turn_on_main() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        fixture
            .entity("switch.gs01234")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "switch",
                "turn_on",
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(fixture.mocks.cloud.link.sent(), vec![Command::SetPower(true)]);
        assert_eq!(fixture.render("switch.gs01234").state, "on");
    }

    #[tokio::test]
    async fn test_smart_standby_keeps_mode_and_minutes() {
        let fixture = Fixture::new(MachineModel::LineaMini, false);
        fixture.mocks.machine.config.lock().unwrap().smart_standby = SmartStandby {
            enabled: false,
            mode: SmartStandbyMode::PowerOn,
            minutes: 42,
        };

        fixture
            .entity("switch.gs01234_smart_standby_enabled")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "switch",
                "turn_on",
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(
            fixture.mocks.cloud.link.sent(),
            vec![Command::SetSmartStandby(SmartStandby {
                enabled: true,
                mode: SmartStandbyMode::PowerOn,
                minutes: 42,
            })]
        );
    }

    #[tokio::test]
    async fn test_failure_message() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        fixture
            .mocks
            .cloud
            .link
            .fail_next(DeviceError::RequestNotSuccessful("boom".into()));

        let err = fixture
            .entity("switch.gs01234")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "switch",
                "turn_off",
                &json!({}),
            )
            .await
            .unwrap_err();

        match err {
            ServiceError::Failed(msg) => {
                assert!(msg.starts_with("Service call encountered an error: "));
                assert!(msg.contains("boom"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        let err = fixture
            .entity("switch.gs01234")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "switch",
                "toggle",
                &json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotSupported { .. }));
    }
}
