use serde::{Deserialize, Serialize};

/// Where a sync run currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    #[default]
    Idle,
    FetchingProvinces,
    FetchingChildren,
    Complete,
    Error,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::FetchingProvinces => write!(f, "fetching provinces"),
            SyncPhase::FetchingChildren => write!(f, "fetching children"),
            SyncPhase::Complete => write!(f, "complete"),
            SyncPhase::Error => write!(f, "error"),
        }
    }
}

/// Latest observable state of a run, published after every parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub current: usize,
    pub total: usize,
    pub status: String,
}

impl SyncProgress {
    pub fn new(phase: SyncPhase, current: usize, total: usize, status: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            status: status.into(),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, SyncPhase::Complete | SyncPhase::Error)
    }
}

/// The level whose children a parent fetch was asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ParentLevel {
    Province,
    District,
}

/// A parent whose children could not be fetched during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ParentFailure {
    pub level: ParentLevel,
    pub code: i64,
    pub error: String,
}

/// Outcome of a completed (possibly partial) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncReport {
    /// Provinces merged by the province phase, 0 when it did not run
    pub provinces_merged: usize,
    pub parents_total: usize,
    pub parents_synced: usize,
    /// Districts and wards merged by the children phases
    pub items_merged: usize,
    pub failures: Vec<ParentFailure>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn failed_codes(&self, level: ParentLevel) -> Vec<i64> {
        self.failures
            .iter()
            .filter(|f| f.level == level)
            .map(|f| f.code)
            .collect()
    }

    /// Fold a later phase of the same run into this report.
    pub fn absorb(&mut self, other: SyncReport) {
        self.provinces_merged += other.provinces_merged;
        self.parents_total += other.parents_total;
        self.parents_synced += other.parents_synced;
        self.items_merged += other.items_merged;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} provinces, {}/{} parents, {} items merged",
            self.provinces_merged, self.parents_synced, self.parents_total, self.items_merged
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!(", {} failed", self.failures.len()));
        }
        if self.cancelled {
            summary.push_str(", cancelled");
        }
        summary
    }
}
