//! Layout of the stored config entry.

use serde::Deserialize;
use serde_json::Value;

use super::DOMAIN;
use super::model::MachineModel;
use crate::config::LaMarzoccoConfig;
use crate::store::ConfigEntry;

/// Schema version written by this code
pub const CURRENT_VERSION: u32 = 2;

pub const CONF_USERNAME: &str = "username";
pub const CONF_PASSWORD: &str = "password";
pub const CONF_MODEL: &str = "model";
pub const CONF_NAME: &str = "name";
pub const CONF_HOST: &str = "host";
pub const CONF_MAC: &str = "mac";
pub const CONF_TOKEN: &str = "token";
/// Advertised Bluetooth name, kept apart from the display name
pub const CONF_BLUETOOTH_NAME: &str = "bluetooth_name";

pub const OPT_USE_BLUETOOTH: &str = "use_bluetooth";

/// Typed view of a current-version entry's data
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntryData {
    pub username: String,
    pub password: String,
    pub model: MachineModel,
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub bluetooth_name: Option<String>,
}

impl EntryData {
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(entry.data.clone()))
    }
}

fn set(entry: &mut ConfigEntry, key: &str, value: Value) -> bool {
    if entry.data.get(key) == Some(&value) {
        return false;
    }
    entry.data.insert(key.to_string(), value);
    true
}

/// Bring a stored entry in line with the user's configuration
///
/// Creates a version 1 entry (credentials only) when nothing is stored yet,
/// so that the regular migration fills in the rest from the cloud. Returns
/// the entry and whether it differs from what was stored.
pub fn reconcile(
    entry_id: &str,
    stored: Option<ConfigEntry>,
    config: &LaMarzoccoConfig,
) -> (ConfigEntry, bool) {
    let (mut entry, mut changed) = match stored {
        Some(entry) => (entry, false),
        None => (
            ConfigEntry {
                entry_id: entry_id.to_string(),
                domain: DOMAIN.to_string(),
                version: 1,
                unique_id: config.serial.clone(),
                data: serde_json::Map::new(),
                options: serde_json::Map::new(),
            },
            true,
        ),
    };

    changed |= set(&mut entry, CONF_USERNAME, config.username.clone().into());
    changed |= set(&mut entry, CONF_PASSWORD, config.password.clone().into());
    match &config.host {
        Some(host) => changed |= set(&mut entry, CONF_HOST, host.clone().into()),
        None => changed |= entry.data.remove(CONF_HOST).is_some(),
    }
    if let Some(mac) = &config.mac {
        changed |= set(&mut entry, CONF_MAC, mac.clone().into());
    }

    if entry.option_bool(OPT_USE_BLUETOOTH) != Some(config.use_bluetooth) {
        entry
            .options
            .insert(OPT_USE_BLUETOOTH.to_string(), config.use_bluetooth.into());
        changed = true;
    }

    (entry, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LaMarzoccoConfig {
        LaMarzoccoConfig {
            serial: "GS01234".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            host: Some("192.168.1.42".to_string()),
            mac: None,
            use_bluetooth: true,
            client_id: None,
            client_secret: None,
        }
    }

    #[test]
    fn test_new_entry_starts_at_v1() {
        let (entry, changed) = reconcile("kitchen", None, &config());
        assert!(changed);
        assert_eq!(entry.version, 1);
        assert_eq!(entry.unique_id, "GS01234");
        assert_eq!(entry.data_str(CONF_HOST), Some("192.168.1.42"));
        assert_eq!(entry.option_bool(OPT_USE_BLUETOOTH), Some(true));
    }

    #[test]
    fn test_reconcile_is_stable() {
        let (entry, _) = reconcile("kitchen", None, &config());
        let (again, changed) = reconcile("kitchen", Some(entry.clone()), &config());
        assert!(!changed);
        assert_eq!(again, entry);
    }

    #[test]
    fn test_reconcile_keeps_discovered_mac() {
        let (mut entry, _) = reconcile("kitchen", None, &config());
        entry.data.insert(CONF_MAC.to_string(), "AA:BB".into());

        let mut cfg = config();
        cfg.host = None;
        let (entry, changed) = reconcile("kitchen", Some(entry), &cfg);
        assert!(changed);
        assert_eq!(entry.data_str(CONF_HOST), None);
        assert_eq!(entry.data_str(CONF_MAC), Some("AA:BB"));
    }

    #[test]
    fn test_entry_data_requires_model() {
        let (entry, _) = reconcile("kitchen", None, &config());
        assert!(EntryData::from_entry(&entry).is_err());
    }
}
