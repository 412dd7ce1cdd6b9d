use semver::Version;
use tracing::debug;

use super::DOMAIN;
use super::model::Firmware;
use super::model::FirmwareType;
use crate::engine::Issue;
use crate::engine::IssueSeverity;

/// Oldest gateway firmware with the API this integration speaks
pub const MIN_GATEWAY_VERSION: &str = "v3.4-rc5";

pub const UNSUPPORTED_GATEWAY_ISSUE: &str = "unsupported_gateway_firmware";

/// Parse vendor version strings such as `v3.4-rc5` or `1.40`
///
/// Missing minor/patch components are taken as zero.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches(['v', 'V']);
    let (core, pre) = match raw.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (raw, None),
    };

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    let mut normalized = parts.join(".");
    if let Some(pre) = pre {
        normalized.push('-');
        normalized.push_str(pre);
    }
    Version::parse(&normalized).ok()
}

/// Issue to raise if the gateway firmware is too old
///
/// Unparseable versions are given the benefit of the doubt.
pub fn gateway_advisory(serial: &str, firmware: &Firmware) -> Option<Issue> {
    let current = &firmware.get(FirmwareType::Gateway)?.current_version;
    let (Some(installed), Some(minimum)) =
        (parse_version(current), parse_version(MIN_GATEWAY_VERSION))
    else {
        debug!("{}: cannot compare gateway firmware '{}'", serial, current);
        return None;
    };

    if installed >= minimum {
        return None;
    }

    Some(Issue {
        domain: DOMAIN.to_string(),
        issue_id: UNSUPPORTED_GATEWAY_ISSUE.to_string(),
        severity: IssueSeverity::Warning,
        message: format!(
            "Machine {} runs gateway firmware {}; {} or newer is required for full support",
            serial, current, MIN_GATEWAY_VERSION
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::lamarzocco::model::FirmwareVersion;

    fn firmware(gateway: &str) -> Firmware {
        let mut firmware = Firmware::default();
        firmware.versions.insert(
            FirmwareType::Gateway,
            FirmwareVersion {
                current_version: gateway.to_string(),
                latest_version: "v3.5-rc3".to_string(),
            },
        );
        firmware
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v3.4-rc5"), Version::parse("3.4.0-rc5").ok());
        assert_eq!(parse_version("1.40"), Version::parse("1.40.0").ok());
        assert_eq!(parse_version("garbage"), None);
        assert!(parse_version("v3.4").unwrap() > parse_version("v3.4-rc5").unwrap());
    }

    #[test]
    fn test_old_gateway_raises_issue() {
        let issue = gateway_advisory("GS01234", &firmware("v3.1-rc4")).unwrap();
        assert_eq!(issue.issue_id, UNSUPPORTED_GATEWAY_ISSUE);
        assert_eq!(issue.severity, IssueSeverity::Warning);
        assert!(issue.message.contains("v3.1-rc4"));
    }

    #[test]
    fn test_current_gateway_is_fine() {
        assert_eq!(gateway_advisory("GS01234", &firmware("v3.4-rc5")), None);
        assert_eq!(gateway_advisory("GS01234", &firmware("v3.5-rc3")), None);
        assert_eq!(gateway_advisory("GS01234", &firmware("unknown")), None);
        assert_eq!(gateway_advisory("GS01234", &Firmware::default()), None);
    }
}
