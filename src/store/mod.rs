//! Authoritative store boundary.
//!
//! The core holds a best-effort mirror; this trait is the single
//! authoritative source it reads from, writes to, and subscribes to.
//! Correctness under concurrent writers relies on the store serializing
//! individual row writes; no in-process locking is layered on top.

pub mod mem;
pub mod pg;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::{ChangeEvent, Collection};
use crate::model::{Equipment, EquipmentId, Profile, Request, RequestId, Status, Team, TeamId};

#[async_trait]
pub trait Store: Send + Sync {
    // Bulk reads. Ordering is part of the contract: teams by name,
    // equipment and requests newest-first.
    async fn list_teams(&self) -> Result<Vec<Team>>;
    async fn list_equipment(&self) -> Result<Vec<Equipment>>;
    async fn list_requests(&self) -> Result<Vec<Request>>;

    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>>;
    async fn get_request(&self, id: RequestId) -> Result<Option<Request>>;
    async fn requests_for_equipment(&self, equipment_id: EquipmentId) -> Result<Vec<Request>>;

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>>;

    // Mutations. Each is a single row write; the store assigns nothing
    // beyond what the row carries and reports failures as `Error::Store`.
    async fn insert_team(&self, team: Team) -> Result<Team>;
    async fn insert_equipment(&self, equipment: Equipment) -> Result<Equipment>;
    async fn insert_request(&self, request: Request) -> Result<Request>;

    /// Replace an equipment row (rename, reassignment, warranty update).
    async fn update_equipment(&self, equipment: Equipment) -> Result<Equipment>;

    /// Atomically write a request's status and, when supplied, its
    /// repair duration.
    async fn update_request_status(
        &self,
        id: RequestId,
        status: Status,
        duration_hours: Option<f64>,
    ) -> Result<Request>;

    /// Set the equipment's scrapped flag. Idempotent; only ever sets,
    /// never clears.
    async fn mark_equipment_scrapped(&self, id: EquipmentId) -> Result<()>;

    /// Renaming a team is the only team mutation this core performs.
    async fn rename_team(&self, id: TeamId, name: &str) -> Result<Team>;

    async fn delete_request(&self, id: RequestId) -> Result<()>;
    async fn delete_equipment(&self, id: EquipmentId) -> Result<()>;

    /// Subscribe to the live change feed of one collection. Events arrive
    /// in per-collection delivery order. Dropping the receiver releases
    /// the subscription.
    async fn subscribe(&self, collection: Collection) -> Result<broadcast::Receiver<ChangeEvent>>;
}
