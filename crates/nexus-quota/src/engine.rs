//! Quota engine: point-in-time counters for `ConcurrentWorkflows`,
//! `TeamMembers`, `StorageGb`; sliding-window admission for
//! `ApiCallsPerHour`, `AgentsPerMonth`, `WorkflowsPerMonth`. Both share one
//! admit-then-consume contract: `check_and_consume` is atomic per
//! `(org_id, resource)` and a rejected consume never mutates state.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use nexus_core::{NexusError, NexusResult, OrgId, QuotaResource, QuotaWindow};
use nexus_tenancy::TenancyManager;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

enum ResourceState {
    /// The persisted `Organization::usage` field is the source of truth
    /// for the count; this variant exists only so the same per-key mutex
    /// serializes point-in-time consumption the same way it serializes
    /// sliding-window consumption.
    PointInTime,
    Sliding { events: VecDeque<DateTime<Utc>> },
}

pub struct QuotaEngine {
    tenancy: Arc<TenancyManager>,
    state: DashMap<(OrgId, QuotaResource), Arc<Mutex<ResourceState>>>,
}

impl QuotaEngine {
    pub fn new(tenancy: Arc<TenancyManager>) -> Self {
        Self {
            tenancy,
            state: DashMap::new(),
        }
    }

    fn slot(&self, org_id: &str, resource: QuotaResource) -> Arc<Mutex<ResourceState>> {
        self.state
            .entry((org_id.to_string(), resource))
            .or_insert_with(|| {
                Arc::new(Mutex::new(match resource.window() {
                    QuotaWindow::PointInTime => ResourceState::PointInTime,
                    QuotaWindow::Sliding => ResourceState::Sliding { events: VecDeque::new() },
                }))
            })
            .clone()
    }

    /// Atomically checks and consumes `amount` units of `resource` for
    /// `org_id`. The per-`(org_id, resource)` mutex is held across the
    /// whole check-then-write, including the persisted-store round trip
    /// for point-in-time resources, so concurrent callers cannot both
    /// observe capacity and both succeed (the admit-then-consume
    /// contract). On success the consumption is already recorded; on
    /// failure nothing changes.
    pub async fn check_and_consume(
        &self,
        org_id: &str,
        resource: QuotaResource,
        amount: u64,
    ) -> NexusResult<()> {
        let slot = self.slot(org_id, resource);
        let mut guard = slot.lock().await;
        let org = self.tenancy.get_organization(org_id).await?;
        let limit = org.quotas.get(&resource).copied();

        match &mut *guard {
            ResourceState::PointInTime => {
                let current = org.usage.get(&resource).copied().unwrap_or(0);
                if let Some(limit) = limit {
                    if current + amount > limit {
                        return Err(NexusError::QuotaExceeded {
                            resource: format!("{resource:?}"),
                        });
                    }
                }
                self.tenancy.adjust_usage(org_id, resource, amount as i64).await?;
                Ok(())
            }
            ResourceState::Sliding { events } => {
                let now = Utc::now();
                let window = Duration::from_std(resource.window_duration())
                    .unwrap_or_else(|_| Duration::zero());
                while let Some(front) = events.front() {
                    if now.signed_duration_since(*front) > window {
                        events.pop_front();
                    } else {
                        break;
                    }
                }
                if let Some(limit) = limit {
                    if events.len() as u64 + amount > limit {
                        return Err(NexusError::QuotaExceeded {
                            resource: format!("{resource:?}"),
                        });
                    }
                }
                for _ in 0..amount {
                    events.push_back(now);
                }
                Ok(())
            }
        }
    }

    /// Releases a point-in-time resource (e.g. a finished workflow freeing
    /// a `ConcurrentWorkflows` slot). Never fails on over-release; clamps
    /// at zero. No-op for sliding-window resources, which only ever age
    /// out on their own.
    pub async fn release(&self, org_id: &str, resource: QuotaResource, amount: u64) -> NexusResult<()> {
        if resource.window() != QuotaWindow::PointInTime {
            return Ok(());
        }
        let slot = self.slot(org_id, resource);
        let _guard = slot.lock().await;
        self.tenancy.adjust_usage(org_id, resource, -(amount as i64)).await?;
        Ok(())
    }

    pub async fn usage(&self, org_id: &str, resource: QuotaResource) -> NexusResult<u64> {
        match resource.window() {
            QuotaWindow::PointInTime => {
                let org = self.tenancy.get_organization(org_id).await?;
                Ok(org.usage.get(&resource).copied().unwrap_or(0))
            }
            QuotaWindow::Sliding => {
                let slot = self.slot(org_id, resource);
                let guard = slot.lock().await;
                let ResourceState::Sliding { events } = &*guard else {
                    unreachable!("sliding resources always get a Sliding state")
                };
                Ok(events.len() as u64)
            }
        }
    }
}
