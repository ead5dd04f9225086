use async_trait::async_trait;

use super::ApiError;
use crate::models::{District, Province, Ward};

/// Remote provider of the administrative hierarchy.
///
/// Each call is one request against the provider; callers decide pacing
/// and what to do on failure.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn fetch_provinces(&self) -> Result<Vec<Province>, ApiError>;

    async fn fetch_districts(&self, province_code: i64) -> Result<Vec<District>, ApiError>;

    async fn fetch_wards(&self, district_code: i64) -> Result<Vec<Ward>, ApiError>;
}
