//! Request and response bodies of the admin API.

use chrono::{DateTime, Utc};
use routeslot_core::{
    assignment::Assignment,
    proxy::{Proxy, ProxyStatus, UsageOutcome},
    slots::SlotStats,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AllocateSlotRequest {
    pub worker_id: String,
}

/// Release body. `success` reports the outcome; omit it to release without one.
#[derive(Debug, Deserialize)]
pub struct ReleaseSlotRequest {
    pub worker_id: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

impl ReleaseSlotRequest {
    #[must_use]
    pub fn outcome(&self) -> Option<UsageOutcome> {
        self.success.map(|success| UsageOutcome { success, latency_ms: self.latency_ms })
    }
}

#[derive(Debug, Deserialize)]
pub struct SwitchProxyRequest {
    pub slot: u32,
    pub proxy: String,
}

/// A binding as exposed over the admin API. Credentials are never included.
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub slot: u32,
    pub worker_id: String,
    pub proxy_id: i64,
    pub proxy_name: String,
    pub proxy_endpoint: String,
    pub assigned_at: DateTime<Utc>,
    /// Local listener port routed through this slot.
    pub listener_port: u32,
}

impl SlotAssignment {
    #[must_use]
    pub fn new(assignment: &Assignment, listener_base_port: u16) -> Self {
        Self {
            slot: assignment.slot,
            worker_id: assignment.worker_id.clone(),
            proxy_id: assignment.proxy_id,
            proxy_name: assignment.proxy_name.clone(),
            proxy_endpoint: assignment.proxy_endpoint.clone(),
            assigned_at: assignment.assigned_at,
            listener_port: u32::from(listener_base_port) + assignment.slot,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlotsOverview {
    pub slots: SlotStats,
    pub assignments: Vec<SlotAssignment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleasedProxy {
    pub id: i64,
    pub status: ProxyStatus,
    pub success_count: u64,
    pub fail_count: u64,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl From<&Proxy> for ReleasedProxy {
    fn from(proxy: &Proxy) -> Self {
        Self {
            id: proxy.id,
            status: proxy.status,
            success_count: proxy.success_count,
            fail_count: proxy.fail_count,
            cooldown_until: proxy.cooldown_until,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseSlotResponse {
    pub slot: u32,
    pub released: bool,
    pub proxy: Option<ReleasedProxy>,
}
