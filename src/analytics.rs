//! Risk analytics.
//!
//! Derived per-equipment health metrics computed from the authoritative
//! request history, never from the mirror. Available on demand and as a
//! cancelable periodic refresh publishing snapshots on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::{self, Credential};
use crate::error::{Error, Result};
use crate::model::{Equipment, EquipmentId, Request, RequestType, Status};
use crate::store::Store;
use crate::telemetry::metrics;

/// Breakdown count above which (strictly) equipment is flagged high risk.
pub const HIGH_RISK_BREAKDOWN_THRESHOLD: usize = 3;
/// Mean repair hours above which equipment is flagged high risk.
pub const HIGH_RISK_AVG_REPAIR_HOURS: f64 = 24.0;

/// Snapshot of one equipment's derived health metrics.
#[derive(Debug, Clone, Serialize)]
pub struct EquipmentStats {
    pub equipment_id: EquipmentId,
    pub equipment_name: String,
    /// Corrective requests ever raised against this equipment.
    pub breakdown_count: u32,
    /// Mean duration over completed repairs, rounded to 2 decimals.
    /// 0 when nothing has been repaired yet.
    pub avg_repair_time: f64,
    pub is_high_risk: bool,
    /// Requests currently New or In Progress.
    pub active_request_count: u32,
}

/// The analytics aggregator.
#[derive(Clone)]
pub struct Analytics {
    store: Arc<dyn Store>,
}

impl Analytics {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stats for one equipment. Any valid credential may ask.
    pub async fn stats_for(
        &self,
        credential: Option<&Credential>,
        equipment_id: EquipmentId,
    ) -> Result<EquipmentStats> {
        auth::require_user(credential)?;
        let equipment = self
            .store
            .get_equipment(equipment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("equipment {equipment_id}")))?;
        let requests = self.store.requests_for_equipment(equipment_id).await?;
        Ok(compute(&equipment, &requests))
    }

    /// Stats for every equipment.
    ///
    /// A failed per-equipment request query skips that equipment instead
    /// of failing the whole computation; partial aggregate data beats
    /// none.
    pub async fn stats_all(&self, credential: Option<&Credential>) -> Result<Vec<EquipmentStats>> {
        auth::require_user(credential)?;
        let equipment = self.store.list_equipment().await?;

        let mut stats = Vec::with_capacity(equipment.len());
        for eq in equipment {
            match self.store.requests_for_equipment(eq.id).await {
                Ok(requests) => stats.push(compute(&eq, &requests)),
                Err(e) => {
                    warn!(equipment = %eq.id, "skipping equipment in analytics: {e}");
                }
            }
        }
        Ok(stats)
    }

    /// Start a periodic refresh task.
    ///
    /// Publishes a fresh snapshot on the returned handle's watch channel
    /// after every interval tick. Cancellation is immediate: the shutdown
    /// signal is raced against both the sleep and the computation, so no
    /// snapshot is published after `stop`.
    pub fn spawn_refresh(&self, credential: Credential, interval: Duration) -> RefreshHandle {
        let shutdown = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(Vec::new());

        let analytics = self.clone();
        let stop = Arc::clone(&shutdown);
        let task = tokio::spawn(async move {
            loop {
                let started = std::time::Instant::now();
                let result = tokio::select! {
                    _ = stop.notified() => {
                        info!("analytics refresh stopping");
                        return;
                    }
                    result = analytics.stats_all(Some(&credential)) => result,
                };

                match result {
                    Ok(stats) => {
                        metrics::analytics_refresh_ms()
                            .record(started.elapsed().as_secs_f64() * 1000.0, &[]);
                        // All receivers gone; nothing left to refresh for.
                        if tx.send(stats).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("analytics refresh failed: {e}"),
                }

                tokio::select! {
                    _ = stop.notified() => {
                        info!("analytics refresh stopping");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        RefreshHandle {
            shutdown,
            snapshots: rx,
            task,
        }
    }
}

/// Handle to a running refresh task.
pub struct RefreshHandle {
    shutdown: Arc<Notify>,
    snapshots: watch::Receiver<Vec<EquipmentStats>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// A receiver for refresh snapshots. The channel closes once the task
    /// stops.
    pub fn snapshots(&self) -> watch::Receiver<Vec<EquipmentStats>> {
        self.snapshots.clone()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Vec<EquipmentStats> {
        self.snapshots.borrow().clone()
    }

    /// Cancel the task and wait for it to wind down.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.task.await;
    }
}

/// Pure computation over one equipment's request history.
fn compute(equipment: &Equipment, requests: &[Request]) -> EquipmentStats {
    let breakdown_count = requests
        .iter()
        .filter(|r| r.kind == RequestType::Corrective)
        .count();

    let completed: Vec<f64> = requests
        .iter()
        .filter(|r| r.status == Status::Repaired)
        .filter_map(|r| r.duration_hours)
        .collect();

    let avg = if completed.is_empty() {
        0.0
    } else {
        completed.iter().sum::<f64>() / completed.len() as f64
    };

    let active_request_count = requests
        .iter()
        .filter(|r| matches!(r.status, Status::New | Status::InProgress))
        .count();

    EquipmentStats {
        equipment_id: equipment.id,
        equipment_name: equipment.name.clone(),
        breakdown_count: breakdown_count as u32,
        // Report rounded; flag on the unrounded mean.
        avg_repair_time: (avg * 100.0).round() / 100.0,
        is_high_risk: breakdown_count > HIGH_RISK_BREAKDOWN_THRESHOLD
            || avg > HIGH_RISK_AVG_REPAIR_HOURS,
        active_request_count: active_request_count as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EquipmentId, RequestId, TeamId};
    use chrono::Utc;

    fn request(
        equipment_id: EquipmentId,
        kind: RequestType,
        status: Status,
        duration_hours: Option<f64>,
    ) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId::new(),
            equipment_id,
            team_id: Some(TeamId::new()),
            kind,
            status,
            duration_hours,
            scheduled_date: None,
            title: "test".to_string(),
            description: String::new(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn zero_requests_yields_zero_stats_not_high_risk() {
        let eq = Equipment::new("idle press");
        let stats = compute(&eq, &[]);
        assert_eq!(stats.breakdown_count, 0);
        assert_eq!(stats.avg_repair_time, 0.0);
        assert_eq!(stats.active_request_count, 0);
        assert!(!stats.is_high_risk);
    }

    #[test]
    fn four_breakdowns_without_repairs_is_high_risk() {
        let eq = Equipment::new("flaky lathe");
        let requests: Vec<Request> = (0..4)
            .map(|_| request(eq.id, RequestType::Corrective, Status::New, None))
            .collect();
        let stats = compute(&eq, &requests);
        assert_eq!(stats.breakdown_count, 4);
        assert_eq!(stats.avg_repair_time, 0.0);
        assert!(stats.is_high_risk);
        assert_eq!(stats.active_request_count, 4);
    }

    #[test]
    fn slow_single_repair_is_high_risk() {
        let eq = Equipment::new("old compressor");
        let requests = vec![request(
            eq.id,
            RequestType::Corrective,
            Status::Repaired,
            Some(30.0),
        )];
        let stats = compute(&eq, &requests);
        assert_eq!(stats.avg_repair_time, 30.0);
        assert!(stats.is_high_risk);
        assert_eq!(stats.active_request_count, 0);
    }

    #[test]
    fn average_is_rounded_to_two_decimals() {
        let eq = Equipment::new("press");
        let requests = vec![
            request(eq.id, RequestType::Corrective, Status::Repaired, Some(1.0)),
            request(eq.id, RequestType::Corrective, Status::Repaired, Some(1.0)),
            request(eq.id, RequestType::Corrective, Status::Repaired, Some(2.0)),
        ];
        let stats = compute(&eq, &requests);
        // 4/3 = 1.333... → 1.33
        assert_eq!(stats.avg_repair_time, 1.33);
        assert!(!stats.is_high_risk);
    }

    #[test]
    fn repaired_without_duration_is_excluded_from_average() {
        let eq = Equipment::new("mixer");
        let requests = vec![
            request(eq.id, RequestType::Corrective, Status::Repaired, Some(10.0)),
            request(eq.id, RequestType::Corrective, Status::Repaired, None),
        ];
        let stats = compute(&eq, &requests);
        assert_eq!(stats.avg_repair_time, 10.0);
    }

    #[test]
    fn preventive_requests_do_not_count_as_breakdowns() {
        let eq = Equipment::new("conveyor");
        let requests = vec![
            request(eq.id, RequestType::Preventive, Status::New, None),
            request(eq.id, RequestType::Preventive, Status::InProgress, None),
        ];
        let stats = compute(&eq, &requests);
        assert_eq!(stats.breakdown_count, 0);
        assert_eq!(stats.active_request_count, 2);
        assert!(!stats.is_high_risk);
    }
}
