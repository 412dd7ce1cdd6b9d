use strum::Display;

/// Which link a command or fetch went over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    Cloud,
    Local,
    Bluetooth,
}

/// How a failure should be treated by the coordinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FailureKind {
    /// Credentials were rejected; re-authenticate before the next attempt
    Auth,
    /// Network-level trouble; keep the last data and try again later
    Transient,
    /// Anything else
    Unknown,
}

/// Errors raised by device clients
///
/// Clients report errors as plain strings so that failures can be cloned,
/// queued in tests, and carried in published coordinator state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Authentication failed: {reason}")]
    AuthFail {
        transport: TransportKind,
        reason: String,
    },

    #[error("Request not successful: {0}")]
    RequestNotSuccessful(String),

    #[error("Request timed out ({0})")]
    Timeout(TransportKind),

    #[error("{transport} transport unreachable: {reason}")]
    Unreachable {
        transport: TransportKind,
        reason: String,
    },

    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    #[error("No transport available for {0}")]
    NoTransport(&'static str),
}

impl DeviceError {
    pub fn unreachable(transport: TransportKind, reason: impl ToString) -> Self {
        Self::Unreachable {
            transport,
            reason: reason.to_string(),
        }
    }

    pub fn auth_fail(transport: TransportKind, reason: impl ToString) -> Self {
        Self::AuthFail {
            transport,
            reason: reason.to_string(),
        }
    }

    /// Whether `transport` rejected our credentials
    pub fn rejected_by(&self, transport: TransportKind) -> bool {
        matches!(self, Self::AuthFail { transport: t, .. } if *t == transport)
    }

    /// Only a cloud rejection is fixed by logging in again; a machine that
    /// refuses its communication key needs the entry reconfigured.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthFail {
                transport: TransportKind::Cloud,
                ..
            } => FailureKind::Auth,
            Self::AuthFail { .. } => FailureKind::Unknown,
            Self::Timeout(_) | Self::Unreachable { .. } | Self::Bluetooth(_) => {
                FailureKind::Transient
            }
            Self::RequestNotSuccessful(_) | Self::NoTransport(_) => FailureKind::Unknown,
        }
    }

    /// Whether a command that failed this way on `transport` may be retried
    /// on the next transport in preference order
    ///
    /// Bluetooth is a best-effort shortcut, so any failure there falls
    /// through. The local API only falls through when it could not be
    /// reached at all; a rejection from a reachable machine is final.
    pub fn falls_through(&self, transport: TransportKind) -> bool {
        match transport {
            TransportKind::Bluetooth => true,
            TransportKind::Local => matches!(
                self,
                Self::Unreachable {
                    transport: TransportKind::Local,
                    ..
                }
            ),
            TransportKind::Cloud => false,
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(transport: TransportKind, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(transport)
        } else if e.is_connect() {
            Self::unreachable(transport, e)
        } else if e.is_decode() {
            Self::RequestNotSuccessful(format!("Invalid response: {}", e))
        } else {
            Self::RequestNotSuccessful(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            DeviceError::auth_fail(TransportKind::Cloud, "nope").kind(),
            FailureKind::Auth
        );
        assert_eq!(
            DeviceError::auth_fail(TransportKind::Local, "bad key").kind(),
            FailureKind::Unknown
        );
        assert_eq!(
            DeviceError::Timeout(TransportKind::Cloud).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            DeviceError::unreachable(TransportKind::Local, "refused").kind(),
            FailureKind::Transient
        );
        assert_eq!(
            DeviceError::RequestNotSuccessful("500".into()).kind(),
            FailureKind::Unknown
        );
    }

    #[test]
    fn test_fall_through() {
        let unreachable = DeviceError::unreachable(TransportKind::Local, "refused");
        assert!(unreachable.falls_through(TransportKind::Local));
        assert!(!DeviceError::Timeout(TransportKind::Local).falls_through(TransportKind::Local));
        assert!(!DeviceError::auth_fail(TransportKind::Local, "x").falls_through(TransportKind::Local));
        assert!(DeviceError::Bluetooth("gone".into()).falls_through(TransportKind::Bluetooth));
        assert!(!unreachable.falls_through(TransportKind::Cloud));
    }

    #[test]
    fn test_rejected_by() {
        let rejected = DeviceError::auth_fail(TransportKind::Local, "bad key");
        assert!(rejected.rejected_by(TransportKind::Local));
        assert!(!rejected.rejected_by(TransportKind::Cloud));
        assert!(!DeviceError::Timeout(TransportKind::Local).rejected_by(TransportKind::Local));
    }
}
