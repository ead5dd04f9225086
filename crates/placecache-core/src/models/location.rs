use serde::{Deserialize, Serialize};

/// Entities keyed by a stable numeric administrative code.
pub trait Coded {
    fn code(&self) -> i64;
}

/// Top level of the hierarchy (tỉnh / thành phố).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Province {
    pub code: i64,
    pub name: String,
}

impl Province {
    pub fn new(code: i64, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

/// Second level (quận / huyện). `province_code` is not checked against
/// the cached provinces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct District {
    pub code: i64,
    pub province_code: i64,
    pub name: String,
}

impl District {
    pub fn new(code: i64, province_code: i64, name: impl Into<String>) -> Self {
        Self {
            code,
            province_code,
            name: name.into(),
        }
    }
}

/// Third level (phường / xã).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Ward {
    pub code: i64,
    pub district_code: i64,
    pub name: String,
}

impl Ward {
    pub fn new(code: i64, district_code: i64, name: impl Into<String>) -> Self {
        Self {
            code,
            district_code,
            name: name.into(),
        }
    }
}

impl Coded for Province {
    fn code(&self) -> i64 {
        self.code
    }
}

impl Coded for District {
    fn code(&self) -> i64 {
        self.code
    }
}

impl Coded for Ward {
    fn code(&self) -> i64 {
        self.code
    }
}
