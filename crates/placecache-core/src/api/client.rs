//! HTTP client for the public administrative-units API.
//!
//! Endpoints used:
//! - `GET /api/p/` lists provinces
//! - `GET /api/p/{code}?depth=2` returns a province with its districts
//! - `GET /api/d/{code}?depth=2` returns a district with its wards

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use super::{ApiError, LocationSource};
use crate::models::{District, Province, Ward};

// ============================================================================
// Constants
// ============================================================================

/// Default base URL of the administrative-units API
pub const DEFAULT_BASE_URL: &str = "https://provinces.open-api.vn";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

// Wire shapes. Extra fields (codename, division_type, phone_code) are ignored.

#[derive(Debug, Deserialize)]
struct ProvinceDto {
    code: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProvinceDetail {
    #[serde(default)]
    districts: Vec<DistrictDto>,
}

#[derive(Debug, Deserialize)]
struct DistrictDto {
    code: i64,
    name: String,
    province_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DistrictDetail {
    #[serde(default)]
    wards: Vec<WardDto>,
}

#[derive(Debug, Deserialize)]
struct WardDto {
    code: i64,
    name: String,
    district_code: Option<i64>,
}

/// Location source backed by the administrative-units REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpLocationSource {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

impl HttpLocationSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Create a client whose every request is bounded by `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first rate-limit backoff step (doubles on each retry).
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .client
                .get(url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body = response.text().await?;
                return serde_json::from_str(&body)
                    .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)));
            }

            if status.as_u16() != 429 {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(status, &body));
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl LocationSource for HttpLocationSource {
    async fn fetch_provinces(&self) -> Result<Vec<Province>, ApiError> {
        let url = format!("{}/api/p/", self.base_url);
        let provinces: Vec<ProvinceDto> = self.get(&url).await?;
        debug!(count = provinces.len(), "Provinces fetched");
        Ok(provinces
            .into_iter()
            .map(|p| Province::new(p.code, p.name))
            .collect())
    }

    async fn fetch_districts(&self, province_code: i64) -> Result<Vec<District>, ApiError> {
        let url = format!("{}/api/p/{}?depth=2", self.base_url, province_code);
        let detail: ProvinceDetail = self.get(&url).await?;
        debug!(province_code, count = detail.districts.len(), "Districts fetched");
        Ok(detail
            .districts
            .into_iter()
            .map(|d| District::new(d.code, d.province_code.unwrap_or(province_code), d.name))
            .collect())
    }

    async fn fetch_wards(&self, district_code: i64) -> Result<Vec<Ward>, ApiError> {
        let url = format!("{}/api/d/{}?depth=2", self.base_url, district_code);
        let detail: DistrictDetail = self.get(&url).await?;
        debug!(district_code, count = detail.wards.len(), "Wards fetched");
        Ok(detail
            .wards
            .into_iter()
            .map(|w| Ward::new(w.code, w.district_code.unwrap_or(district_code), w.name))
            .collect())
    }
}
