//! GBFS feed client.
//!
//! Reads `station_status.json` (required) and `station_information.json`
//! (optional, for names and capacity) from a General Bikeshare Feed
//! Specification endpoint and normalizes them into [`StationStatus`] records.
//!
//! Both v2 and v3 encodings are accepted: `num_bikes_available` or v3's
//! `num_vehicles_available`, booleans as `true`/`1`, timestamps as POSIX
//! seconds or RFC 3339 strings, names as plain or localized strings.
//!
//! # Example
//!
//! ```no_run
//! use dockwatch_core::{FeedOptions, GbfsClient, StationFeed};
//!
//! # async fn example() -> Result<(), dockwatch_core::Error> {
//! let client = GbfsClient::new(FeedOptions::default())?;
//! let stations = client.fetch_station_status().await?;
//! println!("{} stations", stations.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dockwatch_types::{StationStatus, truncate_to_seconds};

use crate::error::{Error, FetchError, Result};
use crate::traits::StationFeed;

/// Default station status endpoint (Plymouth, GBFS v2.2).
pub const DEFAULT_STATION_STATUS_URL: &str =
    "https://gbfs.beryl.cc/v2_2/Plymouth/station_status.json";

/// Options for [`GbfsClient`].
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// URL of `station_status.json`.
    pub station_status_url: String,
    /// URL of `station_information.json`, used for names and capacity.
    pub station_information_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Minimum time between two fetches.
    pub min_fetch_interval: Duration,
    /// Keep stations that are not renting.
    pub include_inactive: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            station_status_url: DEFAULT_STATION_STATUS_URL.to_string(),
            station_information_url: None,
            timeout: Duration::from_secs(10),
            min_fetch_interval: Duration::from_secs(1),
            include_inactive: false,
        }
    }
}

/// Static station metadata from `station_information.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationInfo {
    /// Display name.
    pub name: Option<String>,
    /// Dock capacity.
    pub capacity: Option<u32>,
}

/// HTTP client for a GBFS feed.
pub struct GbfsClient {
    client: Client,
    options: FeedOptions,
    last_fetch: Mutex<Option<Instant>>,
    station_info: Mutex<HashMap<String, StationInfo>>,
}

impl std::fmt::Debug for GbfsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbfsClient")
            .field("station_status_url", &self.options.station_status_url)
            .field("station_information_url", &self.options.station_information_url)
            .finish()
    }
}

impl GbfsClient {
    /// Create a client with the given options.
    pub fn new(options: FeedOptions) -> Result<Self> {
        if options.station_status_url.trim().is_empty() {
            return Err(Error::invalid_config("station status URL cannot be empty"));
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("dockwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::invalid_config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            options,
            last_fetch: Mutex::new(None),
            station_info: Mutex::new(HashMap::new()),
        })
    }

    /// The options this client was built with.
    pub fn options(&self) -> &FeedOptions {
        &self.options
    }

    /// Sleep until `min_fetch_interval` has passed since the previous fetch.
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_fetch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.options.min_fetch_interval {
                let wait = self.options.min_fetch_interval - elapsed;
                debug!("Rate limiting feed requests, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    duration: self.options.timeout,
                }
            } else {
                FetchError::Http {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            source: e,
        })
    }

    /// Refresh cached station metadata; failures keep the previous cache.
    async fn refresh_station_info(&self) {
        let Some(url) = self.options.station_information_url.as_deref() else {
            return;
        };

        match self.fetch_json::<Envelope<InfoData>>(url).await {
            Ok(doc) => {
                let info = collect_station_info(doc);
                debug!("Loaded metadata for {} stations", info.len());
                *self.station_info.lock().await = info;
            }
            Err(e) => warn!(url, error = %e, "Failed to refresh station information, using cached metadata"),
        }
    }
}

#[async_trait]
impl StationFeed for GbfsClient {
    async fn fetch_station_status(&self) -> Result<Vec<StationStatus>> {
        self.wait_for_rate_limit().await;
        self.refresh_station_info().await;

        let url = &self.options.station_status_url;
        let doc: Envelope<StatusData> = self.fetch_json(url).await?;
        let timestamp = truncate_to_seconds(OffsetDateTime::now_utc());

        let info = self.station_info.lock().await;
        let mut stations = normalize_status(doc, timestamp, &info)?;
        drop(info);

        let total = stations.len();
        if !self.options.include_inactive {
            stations.retain(|s| s.is_renting);
        }

        info!(
            "Fetched {} stations ({} renting) from {}",
            total,
            stations.iter().filter(|s| s.is_renting).count(),
            url
        );
        Ok(stations)
    }

    fn source(&self) -> &str {
        &self.options.station_status_url
    }
}

// ==========================================================================
// Wire format
// ==========================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    stations: Option<Vec<RawStationStatus>>,
}

#[derive(Debug, Deserialize)]
struct RawStationStatus {
    station_id: RawId,
    // v3 renamed the field
    #[serde(alias = "num_vehicles_available")]
    num_bikes_available: Option<i64>,
    num_docks_available: Option<i64>,
    is_renting: Option<RawFlag>,
    is_returning: Option<RawFlag>,
    last_reported: Option<RawTime>,
}

#[derive(Debug, Deserialize)]
struct InfoData {
    #[serde(default)]
    stations: Vec<RawStationInfo>,
}

#[derive(Debug, Deserialize)]
struct RawStationInfo {
    station_id: RawId,
    name: Option<RawName>,
    capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Number(i64),
}

impl RawFlag {
    fn as_bool(&self) -> bool {
        match self {
            RawFlag::Bool(b) => *b,
            RawFlag::Number(n) => *n != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTime {
    Posix(i64),
    Text(String),
}

impl RawTime {
    fn to_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            RawTime::Posix(secs) => OffsetDateTime::from_unix_timestamp(*secs).ok(),
            RawTime::Text(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawName {
    Plain(String),
    Localized(Vec<LocalizedText>),
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: String,
}

impl RawName {
    fn into_text(self) -> Option<String> {
        match self {
            RawName::Plain(s) => Some(s),
            RawName::Localized(texts) => texts.into_iter().next().map(|t| t.text),
        }
    }
}

fn non_negative(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn collect_station_info(doc: Envelope<InfoData>) -> HashMap<String, StationInfo> {
    doc.data
        .map(|d| d.stations)
        .unwrap_or_default()
        .into_iter()
        .map(|raw| {
            (
                raw.station_id.into_string(),
                StationInfo {
                    name: raw.name.and_then(RawName::into_text),
                    capacity: non_negative(raw.capacity),
                },
            )
        })
        .collect()
}

/// Validate a decoded status document and convert it to normalized records.
fn normalize_status(
    doc: Envelope<StatusData>,
    timestamp: OffsetDateTime,
    info: &HashMap<String, StationInfo>,
) -> std::result::Result<Vec<StationStatus>, FetchError> {
    let stations = doc
        .data
        .ok_or_else(|| FetchError::InvalidResponse("missing 'data' object".to_string()))?
        .stations
        .ok_or_else(|| FetchError::InvalidResponse("missing 'data.stations' array".to_string()))?;

    if stations.is_empty() {
        return Err(FetchError::EmptyFeed);
    }

    stations
        .into_iter()
        .map(|raw| {
            let station_id = raw.station_id.into_string();
            let bikes = raw.num_bikes_available.ok_or_else(|| {
                FetchError::InvalidResponse(format!(
                    "station {station_id}: missing num_bikes_available"
                ))
            })?;
            let bikes_available = u32::try_from(bikes).map_err(|_| {
                FetchError::InvalidResponse(format!(
                    "station {station_id}: invalid num_bikes_available {bikes}"
                ))
            })?;
            let is_renting = raw.is_renting.as_ref().map(RawFlag::as_bool).ok_or_else(|| {
                FetchError::InvalidResponse(format!("station {station_id}: missing is_renting"))
            })?;
            let meta = info.get(&station_id).cloned().unwrap_or_default();

            Ok(StationStatus {
                name: meta.name,
                bikes_available,
                docks_available: non_negative(raw.num_docks_available),
                capacity: meta.capacity,
                is_renting,
                is_returning: raw.is_returning.as_ref().is_none_or(RawFlag::as_bool),
                last_reported: raw.last_reported.as_ref().and_then(RawTime::to_datetime),
                timestamp,
                station_id,
            })
        })
        .collect()
}

/// Parse a `station_status.json` body.
///
/// Exposed for feed fixtures and offline tooling; [`GbfsClient`] uses the same
/// validation.
pub fn parse_station_status(
    body: &[u8],
    timestamp: OffsetDateTime,
) -> std::result::Result<Vec<StationStatus>, FetchError> {
    let doc: Envelope<StatusData> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode {
            url: "<inline>".to_string(),
            source: e,
        })?;
    normalize_status(doc, timestamp, &HashMap::new())
}

/// Parse a `station_information.json` body into per-station metadata.
pub fn parse_station_information(
    body: &[u8],
) -> std::result::Result<HashMap<String, StationInfo>, FetchError> {
    let doc: Envelope<InfoData> = serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        url: "<inline>".to_string(),
        source: e,
    })?;
    Ok(collect_station_info(doc))
}
