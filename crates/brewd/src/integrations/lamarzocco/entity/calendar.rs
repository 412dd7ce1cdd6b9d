//! Auto on/off schedule as a calendar, plus the schedule services.

use async_trait::async_trait;
use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use super::Attributes;
use super::CallError;
use super::EntityKind;
use super::Platform;
use super::Reading;
use super::Snapshots;
use super::parse_data;
use crate::integrations::lamarzocco::device::Device;
use crate::integrations::lamarzocco::model::Schedule;
use crate::integrations::lamarzocco::model::WeekDay;

pub const SET_AUTO_ON_OFF_ENABLE: &str = "set_auto_on_off_enable";
pub const SET_AUTO_ON_OFF_TIMES: &str = "set_auto_on_off_times";

/// How far ahead the next event is looked for
const LOOKAHEAD_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub summary: String,
    pub description: String,
}

fn event_on(schedule: &Schedule, name: &str, at: NaiveDateTime) -> Option<CalendarEvent> {
    if !schedule.enabled {
        return None;
    }
    let day = schedule.day(at.weekday().into());
    if !day.enabled {
        return None;
    }

    let date = at.date();
    Some(CalendarEvent {
        start: date.and_time(day.on_time()?),
        end: date.and_time(day.off_time()?),
        summary: format!("Machine {} on", name),
        description: "Machine is scheduled to turn on at the start time and off at the end time"
            .to_string(),
    })
}

/// Scheduled on/off periods from `start` to `end`, one per enabled day
///
/// Events that ended before `start` are left out.
pub fn events(
    schedule: &Schedule,
    name: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut at = start;
    while at <= end {
        if let Some(event) = event_on(schedule, name, at) {
            if event.end >= start {
                events.push(event);
            }
        }
        at += Duration::days(1);
    }
    events
}

fn reading_at(schedule: &Schedule, name: &str, now: NaiveDateTime) -> Reading {
    let next = events(schedule, name, now, now + Duration::days(LOOKAHEAD_DAYS))
        .into_iter()
        .next();

    match next {
        Some(event) => {
            let fmt = |t: NaiveDateTime| t.format("%Y-%m-%d %H:%M:%S").to_string();
            Reading::on_off(event.start <= now && now < event.end)
                .with("message", event.summary)
                .with("description", event.description)
                .with("start_time", fmt(event.start))
                .with("end_time", fmt(event.end))
                .with("all_day", false)
        }
        None => Reading::on_off(false),
    }
}

/// Accepts `HH:MM:SS` and `HH:MM`
fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map_err(|_| serde::de::Error::custom(format!("invalid time '{}'", raw)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnableData {
    day_of_week: WeekDay,
    enable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimesData {
    day_of_week: WeekDay,
    #[serde(deserialize_with = "deserialize_time")]
    time_on: NaiveTime,
    #[serde(deserialize_with = "deserialize_time")]
    time_off: NaiveTime,
    #[serde(default)]
    enable: Option<bool>,
}

pub struct AutoOnOffCalendar;

pub fn kinds() -> Vec<Box<dyn EntityKind>> {
    vec![Box::new(AutoOnOffCalendar)]
}

#[async_trait]
impl EntityKind for AutoOnOffCalendar {
    fn key(&self) -> &'static str {
        "auto_on_off_schedule"
    }

    fn platform(&self) -> Platform {
        Platform::Calendar
    }

    fn name(&self) -> Option<&'static str> {
        Some("Auto on/off schedule")
    }

    fn describe(&self, attributes: &mut Attributes) {
        attributes.insert("icon".into(), "mdi:calendar-clock".into());
    }

    fn read(&self, device: &Device, snapshots: &Snapshots) -> Option<Reading> {
        let config = snapshots.config.as_deref()?;
        let now = chrono::Local::now().naive_local();
        Some(reading_at(&config.auto_on_off_schedule, device.name(), now))
    }

    async fn call(
        &self,
        device: &Device,
        snapshots: &Snapshots,
        service: &str,
        data: &Value,
    ) -> Result<(), CallError> {
        match service {
            SET_AUTO_ON_OFF_ENABLE => {
                let data: EnableData = parse_data(data)?;
                let mut schedule = snapshots
                    .config
                    .as_deref()
                    .ok_or(CallError::NotReady)?
                    .auto_on_off_schedule
                    .clone();
                let mut day = schedule.day(data.day_of_week);
                day.enabled = data.enable;
                schedule.days.insert(data.day_of_week, day);
                device.set_schedule(schedule).await?;
            }
            SET_AUTO_ON_OFF_TIMES => {
                let data: TimesData = parse_data(data)?;
                device
                    .set_schedule_day(
                        data.day_of_week,
                        data.enable.unwrap_or(true),
                        data.time_on,
                        data.time_off,
                    )
                    .await?;
            }
            _ => return Err(CallError::Unsupported),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::super::test_util::Fixture;
    use super::*;
    use crate::engine::ServiceError;
    use crate::integrations::lamarzocco::client::Command;
    use crate::integrations::lamarzocco::model::MachineModel;
    use crate::integrations::lamarzocco::model::ScheduleDay;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2024-01-01 is a Monday.
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule() -> Schedule {
        let mut schedule = Schedule {
            enabled: true,
            ..Schedule::default()
        };
        schedule
            .days
            .insert(WeekDay::Monday, ScheduleDay::new(true, time(7, 0), time(9, 30)));
        schedule
            .days
            .insert(WeekDay::Wednesday, ScheduleDay::new(true, time(6, 15), time(8, 0)));
        schedule
            .days
            .insert(WeekDay::Thursday, ScheduleDay::new(false, time(6, 0), time(7, 0)));
        schedule
    }

    #[test]
    fn test_events() {
        let events = events(&schedule(), "GS01234", at(1, 0, 0), at(7, 23, 59));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, at(1, 7, 0));
        assert_eq!(events[0].end, at(1, 9, 30));
        assert_eq!(events[0].summary, "Machine GS01234 on");
        assert_eq!(events[1].start, at(3, 6, 15));
    }

    #[test]
    fn test_events_drop_finished() {
        let events = events(&schedule(), "GS01234", at(1, 10, 0), at(3, 10, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, at(3, 6, 15));
    }

    #[test]
    fn test_globally_disabled() {
        let mut schedule = schedule();
        schedule.enabled = false;
        assert!(events(&schedule, "GS01234", at(1, 0, 0), at(7, 0, 0)).is_empty());
    }

    #[test]
    fn test_reading() {
        let reading = reading_at(&schedule(), "GS01234", at(1, 8, 0));
        assert_eq!(reading.state, "on");
        assert_eq!(reading.attributes["start_time"], json!("2024-01-01 07:00:00"));

        let reading = reading_at(&schedule(), "GS01234", at(1, 12, 0));
        assert_eq!(reading.state, "off");
        assert_eq!(reading.attributes["start_time"], json!("2024-01-03 06:15:00"));

        let reading = reading_at(&Schedule::default(), "GS01234", at(1, 12, 0));
        assert_eq!(reading.state, "off");
        assert!(reading.attributes.is_empty());
    }

    #[tokio::test]
    async fn test_set_times_every_day() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        let calendar = fixture.entity("calendar.gs01234_auto_on_off_schedule");

        for day in WeekDay::iter() {
            calendar
                .call(
                    &fixture.device,
                    &fixture.snapshots(),
                    "lamarzocco",
                    SET_AUTO_ON_OFF_TIMES,
                    &json!({
                        "day_of_week": day.to_string(),
                        "time_on": "06:30",
                        "time_off": "09:15:00",
                        "enable": true,
                    }),
                )
                .await
                .unwrap();

            let schedule = fixture.device.get_config().await.unwrap().auto_on_off_schedule;
            let stored = schedule.day(day);
            assert!(stored.enabled);
            assert_eq!(stored.on_time(), Some(time(6, 30)));
            assert_eq!(stored.off_time(), Some(time(9, 15)));
        }
    }

    #[tokio::test]
    async fn test_set_enable_sends_whole_schedule() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        fixture.mocks.machine.config.lock().unwrap().auto_on_off_schedule = schedule();

        fixture
            .entity("calendar.gs01234_auto_on_off_schedule")
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "lamarzocco",
                SET_AUTO_ON_OFF_ENABLE,
                &json!({"day_of_week": "thursday", "enable": true}),
            )
            .await
            .unwrap();

        let mut expected = schedule();
        expected.days.get_mut(&WeekDay::Thursday).unwrap().enabled = true;
        assert_eq!(
            fixture.mocks.cloud.link.sent(),
            vec![Command::SetSchedule(expected)]
        );
    }

    #[tokio::test]
    async fn test_invalid_data_rejected_before_sending() {
        let fixture = Fixture::new(MachineModel::Gs3Av, false);
        let calendar = fixture.entity("calendar.gs01234_auto_on_off_schedule");

        for data in [
            json!({"day_of_week": "funday", "enable": true}),
            json!({"day_of_week": "monday"}),
        ] {
            let err = calendar
                .call(
                    &fixture.device,
                    &fixture.snapshots(),
                    "lamarzocco",
                    SET_AUTO_ON_OFF_ENABLE,
                    &data,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidData(_)));
        }

        let err = calendar
            .call(
                &fixture.device,
                &fixture.snapshots(),
                "lamarzocco",
                SET_AUTO_ON_OFF_TIMES,
                &json!({"day_of_week": "monday", "time_on": "25:00", "time_off": "09:00"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
        assert_eq!(fixture.mocks.cloud.link.calls(), 0);
    }
}
