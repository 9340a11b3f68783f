//! Request lifecycle engine.
//!
//! Enforces the status state machine and its side effects. The sequence
//! is read-then-validate-then-write with no version token; two concurrent
//! transitions on the same request can both pass validation against a
//! stale read and race to write. The store serializes the row writes, so
//! the stored status always lands on one of the four statuses, but which
//! writer wins is undefined. Known, accepted, and deliberately not fixed
//! here.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::info;

use crate::auth::{self, Credential};
use crate::error::{Error, Result};
use crate::model::{Request, RequestId, Status};
use crate::store::Store;
use crate::telemetry::metrics;

/// The lifecycle engine. All request status mutations go through here.
#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply a status transition.
    ///
    /// Fails with `Forbidden`/`Unauthorized` at the gate, `NotFound` for
    /// an unknown request, `InvalidTransition` for any pair outside the
    /// transition table, and `MissingDuration` when moving to Repaired
    /// without a positive `duration_hours`. On success the status (and
    /// duration, when supplied) are persisted as one atomic row write.
    ///
    /// Moving to Scrap additionally marks the referenced equipment
    /// scrapped with a second write. The two writes are not one
    /// transaction: a reader can observe the request already scrapped
    /// while the equipment flag is still clear. The second write is
    /// idempotent (it only ever sets the flag), so re-driving it is safe.
    pub async fn transition(
        &self,
        credential: Option<&Credential>,
        request_id: RequestId,
        target: Status,
        duration_hours: Option<f64>,
    ) -> Result<Request> {
        let caller = auth::require_manager(credential)?;

        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("request {request_id}")))?;

        let current = request.status;
        if !current.can_transition_to(target) {
            return Err(Error::InvalidTransition {
                from: current,
                to: target,
            });
        }

        // Duration rides along only on the Repaired transition.
        let duration = match target {
            Status::Repaired => match duration_hours {
                Some(hours) if hours > 0.0 => Some(hours),
                _ => return Err(Error::MissingDuration),
            },
            _ => None,
        };

        let updated = self
            .store
            .update_request_status(request_id, target, duration)
            .await?;

        if target == Status::Scrap {
            self.store
                .mark_equipment_scrapped(request.equipment_id)
                .await?;
            metrics::equipment_scrapped().add(1, &[]);
        }

        info!(
            request = %request_id,
            from = %current,
            to = %target,
            by = %caller.id,
            "request transitioned"
        );
        metrics::request_transitions().add(
            1,
            &[
                KeyValue::new("from", current.to_string()),
                KeyValue::new("to", target.to_string()),
            ],
        );

        Ok(updated)
    }

    /// Remove a request outright. Authorization-gated; the mirror observes
    /// the delete event like any other.
    pub async fn delete(
        &self,
        credential: Option<&Credential>,
        request_id: RequestId,
    ) -> Result<()> {
        let caller = auth::require_manager(credential)?;
        self.store.delete_request(request_id).await?;
        info!(request = %request_id, by = %caller.id, "request deleted");
        Ok(())
    }
}
