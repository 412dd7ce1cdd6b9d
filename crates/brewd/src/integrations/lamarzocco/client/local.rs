use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::Command;
use super::LocalApi;
use super::wire;
use crate::integrations::lamarzocco::error::DeviceError;
use crate::integrations::lamarzocco::error::TransportKind;
use crate::integrations::lamarzocco::model::MachineConfig;

const LOCAL_PORT: u16 = 8081;

/// Client for the machine's HTTP API on the local network
///
/// Authenticates with the machine's communication key as a bearer token.
pub struct LocalClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl LocalClient {
    /// `host` is a bare host name or address; a full URL is used as-is
    pub fn new(http: reqwest::Client, host: &str, token: &str) -> Self {
        let base = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", host, LOCAL_PORT)
        };
        Self {
            http,
            base_url: format!("{}/api/v1", base),
            token: token.to_string(),
        }
    }

    fn check(&self, url: &str, status: StatusCode) -> Result<(), DeviceError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DeviceError::auth_fail(
                TransportKind::Local,
                format!("Machine rejected the communication key ({})", status),
            ));
        }
        if !status.is_success() {
            return Err(DeviceError::RequestNotSuccessful(format!(
                "Request to endpoint {} failed with status code {}",
                url, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalApi for LocalClient {
    async fn get_config(&self) -> Result<MachineConfig, DeviceError> {
        let url = format!("{}/config", self.base_url);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Local, e))?;
        self.check(&url, response.status())?;

        let config: wire::WireConfig = response
            .json()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Local, e))?;
        Ok(config.into())
    }

    async fn send(&self, command: &Command) -> Result<(), DeviceError> {
        let (path, body) = wire::http_request(command);
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Local, e))?;
        self.check(&url, response.status())
    }
}
