//! Request intake.
//!
//! Validates a new request and denormalizes the owning team from the
//! equipment record at creation time. The team reference is a snapshot;
//! reassigning the equipment later leaves existing requests untouched.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use opentelemetry::KeyValue;
use serde::Deserialize;
use tracing::info;

use crate::auth::{self, Credential};
use crate::error::{Error, Result};
use crate::model::{EquipmentId, Request, RequestId, RequestType, Status};
use crate::store::Store;
use crate::telemetry::metrics;

/// Byte bounds on free-text fields, matching the schema CHECKs. The
/// change triggers ship the whole row in a NOTIFY payload, which caps
/// out at 8000 bytes.
pub const MAX_TITLE_BYTES: usize = 200;
pub const MAX_DESCRIPTION_BYTES: usize = 2000;

/// Incoming create-request payload. Fields are optional here so that
/// missing input surfaces as a validation error rather than a decode
/// failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    pub equipment_id: Option<EquipmentId>,
    #[serde(rename = "type")]
    pub kind: Option<RequestType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
}

impl CreateRequest {
    pub fn new(equipment_id: EquipmentId, kind: RequestType, title: impl Into<String>) -> Self {
        Self {
            equipment_id: Some(equipment_id),
            kind: Some(kind),
            title: Some(title.into()),
            description: None,
            scheduled_date: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn scheduled_date(mut self, date: NaiveDate) -> Self {
        self.scheduled_date = Some(date);
        self
    }
}

/// The intake validator. The only path that creates requests.
#[derive(Clone)]
pub struct Intake {
    store: Arc<dyn Store>,
}

impl Intake {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a new request with status New.
    ///
    /// `team_id` is resolved from the equipment's `assigned_team_id` at
    /// this instant and stored on the request. Returns the persisted row.
    pub async fn create(
        &self,
        credential: Option<&Credential>,
        payload: CreateRequest,
    ) -> Result<Request> {
        let caller = auth::require_manager(credential)?;

        let (Some(equipment_id), Some(kind), Some(title)) = (
            payload.equipment_id,
            payload.kind,
            payload.title.filter(|t| !t.trim().is_empty()),
        ) else {
            return Err(Error::Validation(
                "missing required fields: equipment_id, type, title".to_string(),
            ));
        };

        if title.len() > MAX_TITLE_BYTES {
            return Err(Error::Validation(format!(
                "title exceeds {MAX_TITLE_BYTES} bytes"
            )));
        }
        let description = payload.description.unwrap_or_default();
        if description.len() > MAX_DESCRIPTION_BYTES {
            return Err(Error::Validation(format!(
                "description exceeds {MAX_DESCRIPTION_BYTES} bytes"
            )));
        }

        let equipment = self
            .store
            .get_equipment(equipment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("equipment {equipment_id}")))?;

        let now = Utc::now();
        let request = Request {
            id: RequestId::new(),
            equipment_id,
            team_id: equipment.assigned_team_id,
            kind,
            status: Status::New,
            duration_hours: None,
            scheduled_date: payload.scheduled_date,
            title,
            description,
            created_by: Some(caller.id),
            created_at: now,
            updated_at: now,
        };

        let persisted = self.store.insert_request(request).await?;

        info!(
            request = %persisted.id,
            equipment = %equipment_id,
            kind = %kind,
            by = %caller.id,
            "request created"
        );
        metrics::requests_created().add(1, &[KeyValue::new("type", kind.to_string())]);

        Ok(persisted)
    }
}
