use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde_json::Value;

use super::Attributes;
use super::CallError;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use crate::integrations::lamarzocco::device::Device;

/// Starts a backflush cycle; the state is the time of the last press
#[derive(Default)]
pub struct StartBackflush {
    last_pressed: Mutex<Option<DateTime<Utc>>>,
}

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![Box::new(StartBackflush::default())]
}

impl StartBackflush {
    fn last_pressed(&self) -> Option<DateTime<Utc>> {
        match self.last_pressed.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EntityKind for StartBackflush {
    fn key(&self) -> &'static str {
        "start_backflush"
    }

    fn platform(&self) -> Platform {
        Platform::Button
    }

    fn name(&self) -> Option<&'static str> {
        Some("Start backflush")
    }

    fn describe(&self, attributes: &mut Attributes) {
        attributes.insert("icon".into(), "mdi:water-sync".into());
    }

    fn read(&self, _device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        snapshots.config.as_ref()?;
        Some(Reading::new(match self.last_pressed() {
            Some(at) => at.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => "unknown".to_string(),
        }))
    }

    async fn call(
        &self,
        device: &Device,
        _snapshots: &Snapshots,
        service: &str,
        _data: &Value,
    ) -> Result<(), CallError> {
        if service != "press" {
            return Err(CallError::Unsupported);
        }

        device.start_backflush().await?;
        let now = Utc::now();
        match self.last_pressed.lock() {
            Ok(mut guard) => *guard = Some(now),
            Err(poisoned) => *poisoned.into_inner() = Some(now),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_util::Fixture;
    use crate::integrations::lamarzocco::client::Command;
    use crate::integrations::lamarzocco::model::MachineModel;

    #[tokio::test]
    async fn test_press() {
        let fixture = Fixture::new(MachineModel::LineaMicra, false);
        let button = fixture.entity("button.gs01234_start_backflush");
        let state = button.render(&fixture.device, &fixture.snapshots(), true);
        assert_eq!(state.state, "unknown");

        button
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "button",
                "press",
                &json!({}),
            )
            .await
            .unwrap();

        assert_eq!(fixture.mocks.cloud.link.sent(), vec![Command::StartBackflush]);
        let state = button.render(&fixture.device, &fixture.snapshots(), true);
        assert!(state.state.ends_with('Z'));
        assert_eq!(
            fixture.render("binary_sensor.gs01234_backflush_active").state,
            "on"
        );
    }
}
