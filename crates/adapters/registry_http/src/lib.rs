//! # homewatch-adapter-registry-http
//!
//! Registry adapter — talks to the device catalog over its REST API.
//!
//! ## Responsibilities
//! - `GET /houses` → topology snapshot
//! - `GET /broker` → bus address
//! - `GET /topic` → base topic
//! - `PUT /devices` → upsert one device record
//! - Bound every request with a timeout and report every failure as
//!   `RegistryUnavailable`
//!
//! ## Dependency rule
//! Same as other adapters: depends on `homewatch-app` and `homewatch-domain`.

pub mod config;
pub mod error;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use homewatch_app::ports::Registry;
use homewatch_domain::broker::BrokerAddress;
use homewatch_domain::error::HomeWatchError;
use homewatch_domain::topology::{DeviceRecord, Topology};

pub use config::RegistryConfig;
pub use error::RegistryError;

const HOUSES: &str = "/houses";
const BROKER: &str = "/broker";
const TOPIC: &str = "/topic";
const DEVICES: &str = "/devices";

/// [`Registry`] backed by the catalog's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    http: Client,
    base_url: String,
}

impl HttpRegistry {
    /// Build a client for the registry at `config.url`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn get(&self, endpoint: &'static str) -> Result<Vec<u8>, RegistryError> {
        let res = self.http.get(self.url(endpoint)).send().await?;
        let res = check_status(endpoint, res).await?;
        Ok(res.bytes().await?.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str) -> Result<T, RegistryError> {
        let body = self.get(endpoint).await?;
        serde_json::from_slice(&body).map_err(|source| RegistryError::Decode { endpoint, source })
    }

    async fn topic(&self) -> Result<String, RegistryError> {
        let body = self.get(TOPIC).await?;
        Ok(parse_topic(&body))
    }

    async fn put(&self, device: &DeviceRecord) -> Result<(), RegistryError> {
        let res = self.http.put(self.url(DEVICES)).json(device).send().await?;
        check_status(DEVICES, res).await?;
        Ok(())
    }
}

async fn check_status(endpoint: &'static str, res: Response) -> Result<Response, RegistryError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(RegistryError::UnexpectedStatus {
        endpoint,
        status,
        body,
    })
}

/// The base topic is served as a JSON string; a bare body is accepted too.
fn parse_topic(body: &[u8]) -> String {
    serde_json::from_slice::<String>(body).unwrap_or_else(|_| {
        String::from_utf8_lossy(body)
            .trim()
            .trim_matches('"')
            .to_string()
    })
}

impl Registry for HttpRegistry {
    #[tracing::instrument(skip(self), fields(url = %self.base_url))]
    async fn fetch_topology(&self) -> Result<Topology, HomeWatchError> {
        let topology: Topology = self.get_json(HOUSES).await?;
        tracing::debug!(houses = topology.houses.len(), "topology fetched");
        Ok(topology)
    }

    async fn fetch_broker(&self) -> Result<BrokerAddress, HomeWatchError> {
        Ok(self.get_json(BROKER).await?)
    }

    async fn fetch_base_topic(&self) -> Result<String, HomeWatchError> {
        Ok(self.topic().await?)
    }

    async fn put_device(&self, device: &DeviceRecord) -> Result<(), HomeWatchError> {
        self.put(device).await?;
        tracing::debug!(device = ?device.device_id, "device status written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, put};
    use homewatch_domain::unit::UnitKey;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Recorded = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn houses() -> Json<serde_json::Value> {
        Json(serde_json::json!([
            {"houseID": 1, "floors": [{"floorID": "2", "units": [
                {"unitID": 3, "devicesList": [{"deviceID": 7, "deviceName": "light_switch"}]}
            ]}]}
        ]))
    }

    async fn broker() -> Json<serde_json::Value> {
        Json(serde_json::json!({"IP": "mqtt.local", "port": "1883"}))
    }

    async fn topic() -> Json<&'static str> {
        Json("ThiefDetector")
    }

    async fn devices(State(recorded): State<Recorded>, Json(body): Json<serde_json::Value>) {
        recorded.lock().unwrap().push(body);
    }

    /// Serve `router` on an ephemeral port and return a client for it.
    async fn serve(router: Router) -> HttpRegistry {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        HttpRegistry::new(&RegistryConfig {
            url: format!("http://{addr}/"),
            timeout_secs: 1,
        })
        .unwrap()
    }

    async fn catalog() -> (HttpRegistry, Recorded) {
        let recorded = Recorded::default();
        let router = Router::new()
            .route("/houses", get(houses))
            .route("/broker", get(broker))
            .route("/topic", get(topic))
            .route("/devices", put(devices))
            .with_state(Arc::clone(&recorded));
        (serve(router).await, recorded)
    }

    #[tokio::test]
    async fn should_fetch_topology() {
        let (registry, _) = catalog().await;

        let topology = registry.fetch_topology().await.unwrap();

        assert_eq!(
            topology.unit_keys().into_iter().collect::<Vec<_>>(),
            vec![UnitKey::new(1, 2, 3)]
        );
    }

    #[tokio::test]
    async fn should_fetch_broker_with_string_port() {
        let (registry, _) = catalog().await;

        let broker = registry.fetch_broker().await.unwrap();

        assert_eq!(broker.host, "mqtt.local");
        assert_eq!(broker.port, 1883);
    }

    #[tokio::test]
    async fn should_strip_quotes_from_base_topic() {
        let (registry, _) = catalog().await;

        assert_eq!(registry.fetch_base_topic().await.unwrap(), "ThiefDetector");
    }

    #[tokio::test]
    async fn should_put_device_record() {
        let (registry, recorded) = catalog().await;
        let topology = registry.fetch_topology().await.unwrap();
        let mut device = topology
            .device(UnitKey::new(1, 2, 3), "light_switch")
            .unwrap()
            .clone();
        device.device_status = Some("ON".to_string());
        device.last_command_reason = Some("Motion Detected".to_string());

        registry.put_device(&device).await.unwrap();

        let bodies = recorded.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["deviceID"], 7);
        assert_eq!(bodies[0]["deviceStatus"], "ON");
        assert_eq!(bodies[0]["lastCommandReason"], "Motion Detected");
    }

    #[tokio::test]
    async fn should_report_server_error_as_registry_unavailable() {
        let router = Router::new().route(
            "/houses",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let registry = serve(router).await;

        let err = registry.fetch_topology().await.unwrap_err();

        assert!(matches!(err, HomeWatchError::RegistryUnavailable(_)));
    }

    #[tokio::test]
    async fn should_report_malformed_topology_as_registry_unavailable() {
        let router = Router::new().route("/houses", get(|| async { "not json" }));
        let registry = serve(router).await;

        let err = registry.fetch_topology().await.unwrap_err();

        assert!(matches!(err, HomeWatchError::RegistryUnavailable(_)));
    }

    #[tokio::test]
    async fn should_time_out_slow_registry() {
        let router = Router::new().route(
            "/houses",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "[]"
            }),
        );
        let registry = serve(router).await;

        let started = std::time::Instant::now();
        let err = registry.fetch_topology().await.unwrap_err();

        assert!(matches!(err, HomeWatchError::RegistryUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn should_report_unreachable_registry() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let registry = HttpRegistry::new(&RegistryConfig {
            url: format!("http://{addr}"),
            timeout_secs: 1,
        })
        .unwrap();

        let err = registry.fetch_broker().await.unwrap_err();

        assert!(matches!(err, HomeWatchError::RegistryUnavailable(_)));
    }

    #[test]
    fn should_parse_quoted_and_bare_topics() {
        assert_eq!(parse_topic(br#""ThiefDetector""#), "ThiefDetector");
        assert_eq!(parse_topic(b"ThiefDetector\n"), "ThiefDetector");
    }
}
