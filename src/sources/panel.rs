//! Control panel REST client (the standard telemetry source)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::config::ApiConfig;
use crate::util::{parse_capacity, parse_leading_number};
use crate::{NetworkCounters, ServerInfo, ServerSnapshot, ServerStatus, TelemetrySample};

use super::error::FetchError;

/// Account owning the API key
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Power commands understood by the control panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Start,
    Restart,
    Stop,
    Kill,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown power action: {0}")]
pub struct UnknownPowerAction(pub String);

impl PowerAction {
    fn endpoint(&self) -> &'static str {
        match self {
            PowerAction::Start => "boot",
            PowerAction::Restart => "restart",
            PowerAction::Stop => "shutdown",
            PowerAction::Kill => "powerOff",
        }
    }
}

impl FromStr for PowerAction {
    type Err = UnknownPowerAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(PowerAction::Start),
            "restart" => Ok(PowerAction::Restart),
            "stop" => Ok(PowerAction::Stop),
            "kill" => Ok(PowerAction::Kill),
            other => Err(UnknownPowerAction(other.to_string())),
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerAction::Start => "start",
            PowerAction::Restart => "restart",
            PowerAction::Stop => "stop",
            PowerAction::Kill => "kill",
        })
    }
}

/// Client for the control panel API
///
/// The HTTP client is built once with the bearer token baked into its
/// default headers and reused for every request.
#[derive(Debug, Clone)]
pub struct PanelClient {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl PanelClient {
    pub fn new(api: &ApiConfig, token: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| FetchError::Other("API key contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        let mut base_url = api.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            page_size: api.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self.url(path);
        trace!("requesting {url}");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Other(format!("failed to send HTTP request: {e}")))?;

        if !response.status().is_success() {
            return Err(FetchError::from_status(response.status()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Other(format!("failed to parse response from {url}: {e}")))
    }

    #[instrument(skip(self))]
    pub async fn account(&self) -> Result<Account, FetchError> {
        let envelope: Envelope<Account> = self.get("account", &[]).await?;
        Ok(envelope.data)
    }

    /// List all servers of the account (without state blocks)
    ///
    /// Walks every page up to `last_page`.
    #[instrument(skip(self))]
    pub async fn list_servers(&self) -> Result<Vec<ServerSnapshot>, FetchError> {
        let mut servers = Vec::new();
        let mut page_number = 1;

        loop {
            let page: ServerPage = self
                .get(
                    "server",
                    &[
                        ("results", self.page_size.to_string()),
                        ("page", page_number.to_string()),
                    ],
                )
                .await?;
            let empty = page.data.is_empty();
            servers.extend(page.data.into_iter().map(WireServer::into_snapshot));

            if empty || page.current_page >= page.last_page {
                break;
            }
            page_number = page.current_page + 1;
        }

        debug!("listed {} servers", servers.len());
        Ok(servers)
    }

    /// Server details including the live state block
    #[instrument(skip(self))]
    pub async fn server(&self, server_id: &str) -> Result<ServerSnapshot, FetchError> {
        let envelope: Envelope<WireServer> = self
            .get(&format!("server/{server_id}"), &[("state", "true".to_string())])
            .await?;
        Ok(envelope.data.into_snapshot())
    }

    #[instrument(skip(self))]
    pub async fn power(&self, server_id: &str, action: PowerAction) -> Result<(), FetchError> {
        let url = self.url(&format!("server/{server_id}/{}", action.endpoint()));

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| FetchError::Other(format!("failed to send HTTP request: {e}")))?;

        match response.status() {
            status if status.is_success() => {
                debug!("power action {action} accepted");
                Ok(())
            }
            status => match FetchError::from_status(status) {
                FetchError::Other(_) => Err(FetchError::Other(format!(
                    "power action failed with code: {}",
                    status.as_u16()
                ))),
                classified => Err(classified),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ServerPage {
    data: Vec<WireServer>,
    #[serde(default = "first_page")]
    current_page: u32,
    #[serde(default = "first_page")]
    last_page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct WireServer {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    hostname: Option<String>,
    memory: Option<String>,
    cpu: Option<String>,
    #[serde(default)]
    suspended: bool,
    network: Option<WireNetwork>,
    #[serde(default)]
    storage: Vec<WireStorage>,
    state: Option<WireState>,
}

#[derive(Debug, Deserialize)]
struct WireNetwork {
    primary: Option<WireInterface>,
}

#[derive(Debug, Deserialize)]
struct WireInterface {
    ipv4: Option<Vec<WireIpv4>>,
}

#[derive(Debug, Deserialize)]
struct WireIpv4 {
    address: String,
}

#[derive(Debug, Deserialize)]
struct WireStorage {
    capacity: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct WireState {
    status: String,
    #[serde(default)]
    running: bool,
    cpu: Option<String>,
    network: Option<WireStateNetwork>,
}

#[derive(Debug, Deserialize)]
struct WireStateNetwork {
    primary: Option<WireStateInterface>,
}

#[derive(Debug, Deserialize)]
struct WireStateInterface {
    traffic: Option<WireTraffic>,
}

#[derive(Debug, Deserialize)]
struct WireTraffic {
    rx: u64,
    tx: u64,
}

impl WireServer {
    fn into_snapshot(self) -> ServerSnapshot {
        let disk = self
            .storage
            .iter()
            .find(|disk| disk.enabled && disk.primary)
            .or_else(|| self.storage.iter().find(|disk| disk.enabled))
            .and_then(|disk| parse_capacity(&disk.capacity));

        let ipv4 = self
            .network
            .and_then(|network| network.primary)
            .and_then(|primary| primary.ipv4)
            .map(|addresses| addresses.into_iter().map(|ip| ip.address).collect())
            .unwrap_or_default();

        let info = ServerInfo {
            id: self.id,
            name: self.name,
            hostname: self.hostname,
            memory: self.memory.as_deref().and_then(parse_capacity),
            cores: self
                .cpu
                .as_deref()
                .and_then(parse_leading_number)
                .map(|cores| cores as u32),
            disk,
            suspended: self.suspended,
            ipv4,
        };

        let has_state = self.state.is_some();
        let sample = match self.state {
            Some(state) => state.into_sample(),
            None if info.suspended => TelemetrySample::with_status(ServerStatus::Suspended),
            None => TelemetrySample::with_status(ServerStatus::Unknown),
        };

        ServerSnapshot {
            info,
            has_state,
            sample,
        }
    }
}

impl WireState {
    fn into_sample(self) -> TelemetrySample {
        let status = self
            .status
            .parse::<ServerStatus>()
            .unwrap_or(ServerStatus::Unknown);

        TelemetrySample {
            status,
            running: self.running,
            cpu: self
                .cpu
                .as_deref()
                .and_then(parse_leading_number)
                .map(|cpu| cpu as f32),
            memory: None,
            disk: None,
            network: self
                .network
                .and_then(|network| network.primary)
                .and_then(|primary| primary.traffic)
                .map(|traffic| NetworkCounters {
                    rx: traffic.rx,
                    tx: traffic.tx,
                }),
            uptime: None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
