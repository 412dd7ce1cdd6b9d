use tracing::info;
use tracing::warn;

use super::client::CloudApi;
use super::entry::CONF_HOST;
use super::entry::CONF_MAC;
use super::entry::CONF_MODEL;
use super::entry::CONF_NAME;
use super::entry::CONF_PASSWORD;
use super::entry::CONF_TOKEN;
use super::entry::CONF_USERNAME;
use super::entry::CURRENT_VERSION;
use super::error::DeviceError;
use crate::store::ConfigEntry;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Config entry version {0} is newer than supported version {CURRENT_VERSION}")]
    Downgrade(u32),

    #[error("Config entry version {0} cannot be migrated")]
    Unsupported(u32),

    #[error("Config entry is missing '{0}'")]
    MissingField(&'static str),

    #[error("Fleet lookup failed: {0}")]
    Fleet(#[source] DeviceError),

    #[error("Machine {0} is not registered to this account")]
    NotInFleet(String),
}

/// Upgrade `entry` to the current schema version
///
/// Returns the upgraded entry without touching the original; the caller
/// persists it. A current entry is returned unchanged.
pub async fn migrate(entry: &ConfigEntry, cloud: &dyn CloudApi) -> Result<ConfigEntry, MigrationError> {
    match entry.version {
        v if v > CURRENT_VERSION => Err(MigrationError::Downgrade(v)),
        CURRENT_VERSION => Ok(entry.clone()),
        1 => migrate_v1(entry, cloud).await,
        v => Err(MigrationError::Unsupported(v)),
    }
}

/// v1 stored only credentials; v2 adds model, name and the local token,
/// all taken from the account's fleet listing
async fn migrate_v1(entry: &ConfigEntry, cloud: &dyn CloudApi) -> Result<ConfigEntry, MigrationError> {
    let username = entry
        .data_str(CONF_USERNAME)
        .ok_or(MigrationError::MissingField(CONF_USERNAME))?;
    let password = entry
        .data_str(CONF_PASSWORD)
        .ok_or(MigrationError::MissingField(CONF_PASSWORD))?;

    let fleet = cloud.get_fleet().await.map_err(|e| {
        warn!("Migration of {} failed: {}", entry.entry_id, e);
        MigrationError::Fleet(e)
    })?;
    let machine = fleet
        .get(&entry.unique_id)
        .ok_or_else(|| MigrationError::NotInFleet(entry.unique_id.clone()))?;

    let mut data = serde_json::Map::new();
    data.insert(CONF_USERNAME.to_string(), username.into());
    data.insert(CONF_PASSWORD.to_string(), password.into());
    data.insert(CONF_MODEL.to_string(), machine.model.clone().into());
    data.insert(CONF_NAME.to_string(), machine.name.clone().into());
    data.insert(
        CONF_TOKEN.to_string(),
        machine.communication_key.clone().into(),
    );
    for key in [CONF_HOST, CONF_MAC] {
        if let Some(value) = entry.data.get(key) {
            data.insert(key.to_string(), value.clone());
        }
    }

    info!(
        "Migrated config entry {} from version 1 to {}",
        entry.entry_id, CURRENT_VERSION
    );
    Ok(ConfigEntry {
        version: CURRENT_VERSION,
        data,
        ..entry.clone()
    })
}
