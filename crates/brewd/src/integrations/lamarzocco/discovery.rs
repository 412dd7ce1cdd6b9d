use tracing::info;
use tracing::warn;

use super::client::Advertisement;
use super::client::BluetoothScanner;
use super::entry::CONF_BLUETOOTH_NAME;
use super::entry::CONF_MAC;
use super::error::DeviceError;
use crate::store::ConfigEntry;

/// Name prefixes the machines advertise with, e.g. `GS3_GS01234`
pub const MODEL_PREFIXES: [&str; 3] = ["MICRA", "MINI", "GS3"];

/// Whether an advertised name belongs to the machine with `serial`
pub fn name_matches(name: &str, serial: &str) -> bool {
    MODEL_PREFIXES.iter().any(|p| name.starts_with(p))
        && name.split('_').nth(1) == Some(serial)
}

#[derive(Debug, PartialEq, Eq)]
pub enum Selection {
    None,
    Found(Advertisement),
    /// More than one distinct address claims the serial
    Ambiguous(Vec<String>),
}

pub fn select(advertisements: &[Advertisement], serial: &str) -> Selection {
    let mut matches: Vec<&Advertisement> = advertisements
        .iter()
        .filter(|a| a.name.as_deref().is_some_and(|n| name_matches(n, serial)))
        .collect();
    matches.sort_by_key(|a| a.address.to_ascii_uppercase());
    matches.dedup_by(|a, b| a.address.eq_ignore_ascii_case(&b.address));

    match matches.as_slice() {
        [] => Selection::None,
        [one] => Selection::Found((*one).clone()),
        many => Selection::Ambiguous(many.iter().map(|a| a.address.clone()).collect()),
    }
}

/// Look for the machine among nearby Bluetooth devices
///
/// On a unique match the address and advertised name are written into
/// `entry`; returns whether the entry changed.
pub async fn discover(
    entry: &mut ConfigEntry,
    scanner: &dyn BluetoothScanner,
) -> Result<bool, DeviceError> {
    let serial = entry.unique_id.clone();
    let advertisements = scanner.discovered().await?;

    match select(&advertisements, &serial) {
        Selection::None => {
            info!("{}: no Bluetooth advertisement found", serial);
            Ok(false)
        }
        Selection::Found(ad) => {
            info!("{}: found over Bluetooth at {}", serial, ad.address);
            entry
                .data
                .insert(CONF_MAC.to_string(), ad.address.into());
            if let Some(name) = ad.name {
                entry
                    .data
                    .insert(CONF_BLUETOOTH_NAME.to_string(), name.into());
            }
            Ok(true)
        }
        Selection::Ambiguous(addresses) => {
            warn!(
                "{}: several Bluetooth devices claim this serial ({}), not pairing",
                serial,
                addresses.join(", ")
            );
            Ok(false)
        }
    }
}
