//! In-memory store for tests and offline development.
//!
//! Mirrors the Postgres store's contract, including the change feed:
//! every mutation publishes a change event on its collection's channel.
//! Failure injection hooks let tests exercise the partial-failure paths
//! (bulk-load errors, per-equipment query errors) without a real store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::event::{ChangeEvent, Collection, RowEvent};
use crate::model::{Equipment, EquipmentId, Profile, Request, RequestId, Status, Team, TeamId};
use crate::store::Store;

const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    teams: HashMap<TeamId, Team>,
    equipment: HashMap<EquipmentId, Equipment>,
    requests: HashMap<RequestId, Request>,
    profiles: HashMap<String, Profile>,

    // Failure injection for tests.
    fail_next_load: HashSet<&'static str>,
    fail_requests_for: HashSet<EquipmentId>,
}

pub struct MemStore {
    inner: Mutex<Inner>,
    teams_tx: broadcast::Sender<ChangeEvent>,
    equipment_tx: broadcast::Sender<ChangeEvent>,
    requests_tx: broadcast::Sender<ChangeEvent>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        let (teams_tx, _) = broadcast::channel(FEED_CAPACITY);
        let (equipment_tx, _) = broadcast::channel(FEED_CAPACITY);
        let (requests_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            teams_tx,
            equipment_tx,
            requests_tx,
        }
    }

    fn sender(&self, collection: Collection) -> &broadcast::Sender<ChangeEvent> {
        match collection {
            Collection::Teams => &self.teams_tx,
            Collection::Equipment => &self.equipment_tx,
            Collection::Requests => &self.requests_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish an event directly onto a collection's feed, bypassing the
    /// row maps. Lets tests drive arbitrary delivery orders (duplicates,
    /// updates for unseen rows) exactly as a remote feed could.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender(event.collection()).send(event);
    }

    /// Number of live feed subscribers for a collection.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.sender(collection).receiver_count()
    }

    /// Make the next bulk load of `collection` fail once.
    pub fn fail_next_load(&self, collection: Collection) {
        self.lock().fail_next_load.insert(collection.table());
    }

    /// Make every request query scoped to this equipment fail.
    pub fn fail_requests_for(&self, equipment_id: EquipmentId) {
        self.lock().fail_requests_for.insert(equipment_id);
    }

    /// Register a profile so `profile_by_email` can resolve it.
    pub fn add_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.email.clone(), profile);
    }

    fn take_load_failure(&self, collection: Collection) -> Option<Error> {
        let mut inner = self.lock();
        if inner.fail_next_load.remove(collection.table()) {
            Some(Error::Store(format!(
                "injected bulk load failure for {collection}"
            )))
        } else {
            None
        }
    }
}

#[async_trait]
impl Store for MemStore {
    async fn list_teams(&self) -> Result<Vec<Team>> {
        if let Some(err) = self.take_load_failure(Collection::Teams) {
            return Err(err);
        }
        let mut teams: Vec<Team> = self.lock().teams.values().cloned().collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    async fn list_equipment(&self) -> Result<Vec<Equipment>> {
        if let Some(err) = self.take_load_failure(Collection::Equipment) {
            return Err(err);
        }
        let mut equipment: Vec<Equipment> = self.lock().equipment.values().cloned().collect();
        equipment.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(equipment)
    }

    async fn list_requests(&self) -> Result<Vec<Request>> {
        if let Some(err) = self.take_load_failure(Collection::Requests) {
            return Err(err);
        }
        let mut requests: Vec<Request> = self.lock().requests.values().cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>> {
        Ok(self.lock().equipment.get(&id).cloned())
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<Request>> {
        Ok(self.lock().requests.get(&id).cloned())
    }

    async fn requests_for_equipment(&self, equipment_id: EquipmentId) -> Result<Vec<Request>> {
        let inner = self.lock();
        if inner.fail_requests_for.contains(&equipment_id) {
            return Err(Error::Store(format!(
                "injected request query failure for equipment {equipment_id}"
            )));
        }
        let mut requests: Vec<Request> = inner
            .requests
            .values()
            .filter(|r| r.equipment_id == equipment_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        Ok(self.lock().profiles.get(email).cloned())
    }

    async fn insert_team(&self, team: Team) -> Result<Team> {
        self.lock().teams.insert(team.id, team.clone());
        self.publish(ChangeEvent::Team(RowEvent::Insert(team.clone())));
        Ok(team)
    }

    async fn insert_equipment(&self, equipment: Equipment) -> Result<Equipment> {
        self.lock().equipment.insert(equipment.id, equipment.clone());
        self.publish(ChangeEvent::Equipment(RowEvent::Insert(equipment.clone())));
        Ok(equipment)
    }

    async fn insert_request(&self, request: Request) -> Result<Request> {
        self.lock().requests.insert(request.id, request.clone());
        self.publish(ChangeEvent::Request(RowEvent::Insert(request.clone())));
        Ok(request)
    }

    async fn update_equipment(&self, mut equipment: Equipment) -> Result<Equipment> {
        equipment.updated_at = Utc::now();
        let mut inner = self.lock();
        if !inner.equipment.contains_key(&equipment.id) {
            return Err(Error::NotFound(format!("equipment {}", equipment.id)));
        }
        inner.equipment.insert(equipment.id, equipment.clone());
        drop(inner);
        self.publish(ChangeEvent::Equipment(RowEvent::Update(equipment.clone())));
        Ok(equipment)
    }

    async fn update_request_status(
        &self,
        id: RequestId,
        status: Status,
        duration_hours: Option<f64>,
    ) -> Result<Request> {
        let mut inner = self.lock();
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
        request.status = status;
        if duration_hours.is_some() {
            request.duration_hours = duration_hours;
        }
        request.updated_at = Utc::now();
        let updated = request.clone();
        drop(inner);
        self.publish(ChangeEvent::Request(RowEvent::Update(updated.clone())));
        Ok(updated)
    }

    async fn mark_equipment_scrapped(&self, id: EquipmentId) -> Result<()> {
        let mut inner = self.lock();
        let equipment = inner
            .equipment
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("equipment {id}")))?;
        equipment.is_scrapped = true;
        equipment.updated_at = Utc::now();
        let updated = equipment.clone();
        drop(inner);
        self.publish(ChangeEvent::Equipment(RowEvent::Update(updated)));
        Ok(())
    }

    async fn rename_team(&self, id: TeamId, name: &str) -> Result<Team> {
        let mut inner = self.lock();
        let team = inner
            .teams
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("team {id}")))?;
        team.name = name.to_string();
        let updated = team.clone();
        drop(inner);
        self.publish(ChangeEvent::Team(RowEvent::Update(updated.clone())));
        Ok(updated)
    }

    async fn delete_request(&self, id: RequestId) -> Result<()> {
        if self.lock().requests.remove(&id).is_none() {
            return Err(Error::NotFound(format!("request {id}")));
        }
        self.publish(ChangeEvent::Request(RowEvent::Delete(id.0)));
        Ok(())
    }

    async fn delete_equipment(&self, id: EquipmentId) -> Result<()> {
        if self.lock().equipment.remove(&id).is_none() {
            return Err(Error::NotFound(format!("equipment {id}")));
        }
        self.publish(ChangeEvent::Equipment(RowEvent::Delete(id.0)));
        Ok(())
    }

    async fn subscribe(&self, collection: Collection) -> Result<broadcast::Receiver<ChangeEvent>> {
        Ok(self.sender(collection).subscribe())
    }
}
