use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use super::CloudApi;
use super::Command;
use super::wire;
use crate::integrations::lamarzocco::error::DeviceError;
use crate::integrations::lamarzocco::error::TransportKind;
use crate::integrations::lamarzocco::model::Firmware;
use crate::integrations::lamarzocco::model::FirmwareType;
use crate::integrations::lamarzocco::model::FleetDevice;
use crate::integrations::lamarzocco::model::MachineConfig;
use crate::integrations::lamarzocco::model::Statistics;

const DEFAULT_CLIENT_ID: &str = "7_1xwei9rtkuckso44ks4o8s0c0oc4swowo00wgw0ogsok84kosg";
const DEFAULT_CLIENT_SECRET: &str = "2mgjqpikbfuok8g4s44oo4gsw0ks44okk4kc4kkkko0c8soc8s";

/// Refresh the token this long before the server says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Cloud URLs; overridable so tests can point at a mock server
#[derive(Debug, Clone)]
pub struct CloudEndpoints {
    pub token_url: String,
    pub customer_url: String,
    pub gateway_url: String,
}

impl Default for CloudEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://cms.lamarzocco.io/oauth/v2/token".to_string(),
            customer_url: "https://cms.lamarzocco.io/api/customer".to_string(),
            gateway_url: "https://gw-lmz.lamarzocco.io/v1/home/machines".to_string(),
        }
    }
}

impl CloudEndpoints {
    /// All endpoints under one base URL
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{}/oauth/v2/token", base),
            customer_url: format!("{}/api/customer", base),
            gateway_url: format!("{}/v1/home/machines", base),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudCredentials {
    pub username: String,
    pub password: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Client for the vendor cloud
pub struct CloudClient {
    http: reqwest::Client,
    endpoints: CloudEndpoints,
    credentials: CloudCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl CloudClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: CloudEndpoints,
        credentials: CloudCredentials,
    ) -> Self {
        Self {
            http,
            endpoints,
            credentials,
            token: Mutex::new(None),
        }
    }

    fn machine_url(&self, serial: &str, path: &str) -> String {
        format!("{}/{}/{}", self.endpoints.gateway_url, serial, path)
    }

    /// Current bearer token, logging in if there is none or it is stale
    async fn token(&self) -> Result<String, DeviceError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let token = self.login().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn login(&self) -> Result<AccessToken, DeviceError> {
        debug!("Requesting cloud token for {}", self.credentials.username);

        let client_id = self
            .credentials
            .client_id
            .as_deref()
            .unwrap_or(DEFAULT_CLIENT_ID);
        let client_secret = self
            .credentials
            .client_secret
            .as_deref()
            .unwrap_or(DEFAULT_CLIENT_SECRET);
        let form = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Cloud, e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(DeviceError::auth_fail(
                TransportKind::Cloud,
                "Invalid username or password",
            ));
        }
        if !status.is_success() {
            return Err(DeviceError::RequestNotSuccessful(format!(
                "Token request failed with status code {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Cloud, e))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<T>, DeviceError> {
        let token = self.token().await?;
        debug!("{} {}", method, url);

        let mut builder = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Cloud, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
            return Err(DeviceError::auth_fail(
                TransportKind::Cloud,
                "Cloud rejected the access token",
            ));
        }
        if !status.is_success() {
            return Err(DeviceError::RequestNotSuccessful(format!(
                "Request to endpoint {} failed with status code {}",
                url, status
            )));
        }

        let envelope: wire::Envelope<T> = response
            .json()
            .await
            .map_err(|e| DeviceError::from_reqwest(TransportKind::Cloud, e))?;
        if !envelope.status {
            return Err(DeviceError::RequestNotSuccessful(format!(
                "Request to endpoint {} was rejected",
                url
            )));
        }
        Ok(envelope.data)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, DeviceError> {
        self.request(Method::GET, url, None).await?.ok_or_else(|| {
            DeviceError::RequestNotSuccessful(format!("Response from {} carried no data", url))
        })
    }
}

#[async_trait]
impl CloudApi for CloudClient {
    async fn get_fleet(&self) -> Result<HashMap<String, FleetDevice>, DeviceError> {
        let customer: wire::WireCustomer = self.fetch(&self.endpoints.customer_url).await?;
        Ok(customer
            .fleet
            .into_iter()
            .map(FleetDevice::from)
            .map(|d| (d.serial_number.clone(), d))
            .collect())
    }

    async fn get_config(&self, serial: &str) -> Result<MachineConfig, DeviceError> {
        let config: wire::WireConfig = self.fetch(&self.machine_url(serial, "configuration")).await?;
        Ok(config.into())
    }

    async fn get_firmware(&self, serial: &str) -> Result<Firmware, DeviceError> {
        let firmware: BTreeMap<FirmwareType, wire::WireFirmwareVersion> =
            self.fetch(&self.machine_url(serial, "firmware/")).await?;
        Ok(wire::firmware_from_wire(firmware))
    }

    async fn get_statistics(&self, serial: &str) -> Result<Statistics, DeviceError> {
        let counters: Vec<wire::WireCounter> = self
            .fetch(&self.machine_url(serial, "statistics/counters"))
            .await?;
        Ok(wire::statistics_from_wire(counters))
    }

    async fn send(&self, serial: &str, command: &Command) -> Result<(), DeviceError> {
        let (path, body) = wire::http_request(command);
        let url = self.machine_url(serial, &path);
        self.request::<Value>(Method::POST, &url, Some(&body))
            .await?;
        Ok(())
    }

    async fn reauthenticate(&self) -> Result<(), DeviceError> {
        info!("Re-authenticating cloud session for {}", self.credentials.username);
        let token = self.login().await?;
        *self.token.lock().await = Some(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_json;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    use super::*;

    async fn setup() -> (MockServer, CloudClient) {
        let server = MockServer::start().await;
        let client = CloudClient::new(
            reqwest::Client::new(),
            CloudEndpoints::with_base(&server.uri()),
            CloudCredentials {
                username: "user@example.com".to_string(),
                password: "secret".to_string(),
                client_id: None,
                client_secret: None,
            },
        );
        (server, client)
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok", "expires_in": 3600})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_config() {
        let (server, client) = setup().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/home/machines/GS01234/configuration"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": {
                    "machineMode": "StandBy",
                    "boilers": [{"id": "CoffeeBoiler1", "isEnabled": true, "target": 95, "current": 42}],
                    "tankStatus": true
                }
            })))
            .mount(&server)
            .await;

        let config = client.get_config("GS01234").await.unwrap();
        assert!(!config.turned_on);
        assert!(config.water_contact);
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/home/machines/GS01234/statistics/counters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": [{"coffeeType": 0, "count": 3}, {"coffeeType": -1, "count": 2}]
            })))
            .mount(&server)
            .await;

        client.get_statistics("GS01234").await.unwrap();
        let stats = client.get_statistics("GS01234").await.unwrap();
        assert_eq!(stats.get("drinks_k1"), Some(3));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let (server, client) = setup().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let result = client.get_fleet().await;
        assert!(
            matches!(result, Err(DeviceError::AuthFail { .. })),
            "expected AuthFail, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_auth_failure() {
        let (server, client) = setup().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/home/machines/GS01234/firmware/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client.get_firmware("GS01234").await;
        assert!(matches!(result, Err(DeviceError::AuthFail { .. })));
        assert!(client.token.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_server_error() {
        let (server, client) = setup().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/home/machines/GS01234/firmware/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client.get_firmware("GS01234").await;
        assert!(matches!(result, Err(DeviceError::RequestNotSuccessful(_))));
    }

    #[tokio::test]
    async fn test_get_fleet() {
        let (server, client) = setup().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/customer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": {
                    "fleet": [{
                        "machine": {"serialNumber": "GS01234", "model": {"name": "GS3 AV"}},
                        "name": "GS01234",
                        "communicationKey": "token"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let fleet = client.get_fleet().await.unwrap();
        assert_eq!(fleet["GS01234"].model, "GS3 AV");
        assert_eq!(fleet["GS01234"].communication_key, "token");
    }

    #[tokio::test]
    async fn test_send_command() {
        let (server, client) = setup().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/home/machines/GS01234/enable-boiler"))
            .and(body_json(json!({"identifier": "SteamBoiler", "state": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        client
            .send("GS01234", &Command::SetSteam(false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_command() {
        let (server, client) = setup().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/home/machines/GS01234/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": false})))
            .mount(&server)
            .await;

        let result = client.send("GS01234", &Command::SetPower(true)).await;
        assert!(matches!(result, Err(DeviceError::RequestNotSuccessful(_))));
    }
}
