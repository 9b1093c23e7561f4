//! Quota resource enumeration. The counting/consumption logic
//! itself lives in the `nexus-quota` crate; this enum plus the per-resource
//! window classification is shared data model that the tenancy manager,
//! quota engine, and dispatcher all need to agree on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    AgentsPerMonth,
    WorkflowsPerMonth,
    StorageGb,
    ApiCallsPerHour,
    TeamMembers,
    ConcurrentWorkflows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    /// Live count; `consume` increments, `release` decrements.
    PointInTime,
    /// Bounded timestamp queue; `check` purges then admits by count.
    Sliding,
}

impl QuotaResource {
    pub const ALL: [QuotaResource; 6] = [
        QuotaResource::AgentsPerMonth,
        QuotaResource::WorkflowsPerMonth,
        QuotaResource::StorageGb,
        QuotaResource::ApiCallsPerHour,
        QuotaResource::TeamMembers,
        QuotaResource::ConcurrentWorkflows,
    ];

    pub fn window(self) -> QuotaWindow {
        match self {
            QuotaResource::ConcurrentWorkflows
            | QuotaResource::TeamMembers
            | QuotaResource::StorageGb => QuotaWindow::PointInTime,
            QuotaResource::ApiCallsPerHour
            | QuotaResource::AgentsPerMonth
            | QuotaResource::WorkflowsPerMonth => QuotaWindow::Sliding,
        }
    }

    /// Width of the sliding window this resource is counted over. Only
    /// meaningful for `QuotaWindow::Sliding` resources.
    pub fn window_duration(self) -> std::time::Duration {
        use std::time::Duration;
        match self {
            QuotaResource::ApiCallsPerHour => Duration::from_secs(3600),
            QuotaResource::AgentsPerMonth | QuotaResource::WorkflowsPerMonth => {
                Duration::from_secs(30 * 24 * 3600)
            }
            _ => Duration::from_secs(0),
        }
    }
}

pub type QuotaMap = HashMap<QuotaResource, u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_in_time_vs_sliding_classification() {
        assert_eq!(QuotaResource::ConcurrentWorkflows.window(), QuotaWindow::PointInTime);
        assert_eq!(QuotaResource::ApiCallsPerHour.window(), QuotaWindow::Sliding);
    }
}
