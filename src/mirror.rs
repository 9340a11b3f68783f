//! Change-feed mirror.
//!
//! A per-collection local cache kept consistent with the authoritative
//! store: one bulk read to seed, then a live event stream applied in
//! delivery order. The cache is a set keyed by id: membership always
//! reflects the most recently observed event for that id. Only the
//! mirror's own feed task mutates the cache; readers get cloned
//! snapshots.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{ChangeEvent, Collection, RowEvent};
use crate::model::{Equipment, Request, Team};
use crate::store::Store;
use crate::telemetry::metrics;

/// A row type the mirror can watch.
#[async_trait]
pub trait Watched: Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn key(&self) -> Uuid;

    /// Extract this collection's row event from a change event. `None`
    /// for events belonging to another collection.
    fn from_change(event: ChangeEvent) -> Option<RowEvent<Self>>;

    /// Collection presentation order, applied to snapshots.
    fn sort(rows: &mut [Self]);

    /// The seeding bulk read.
    async fn bulk_load(store: &dyn Store) -> Result<Vec<Self>>;
}

#[async_trait]
impl Watched for Team {
    const COLLECTION: Collection = Collection::Teams;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn from_change(event: ChangeEvent) -> Option<RowEvent<Self>> {
        match event {
            ChangeEvent::Team(row_event) => Some(row_event),
            _ => None,
        }
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by(|a, b| a.name.cmp(&b.name));
    }

    async fn bulk_load(store: &dyn Store) -> Result<Vec<Self>> {
        store.list_teams().await
    }
}

#[async_trait]
impl Watched for Equipment {
    const COLLECTION: Collection = Collection::Equipment;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn from_change(event: ChangeEvent) -> Option<RowEvent<Self>> {
        match event {
            ChangeEvent::Equipment(row_event) => Some(row_event),
            _ => None,
        }
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    async fn bulk_load(store: &dyn Store) -> Result<Vec<Self>> {
        store.list_equipment().await
    }
}

#[async_trait]
impl Watched for Request {
    const COLLECTION: Collection = Collection::Requests;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn from_change(event: ChangeEvent) -> Option<RowEvent<Self>> {
        match event {
            ChangeEvent::Request(row_event) => Some(row_event),
            _ => None,
        }
    }

    fn sort(rows: &mut [Self]) {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    async fn bulk_load(store: &dyn Store) -> Result<Vec<Self>> {
        store.list_requests().await
    }
}

/// Handle to a running mirror. Dropping it (or calling [`Mirror::stop`])
/// aborts the feed task and releases the subscription.
pub struct Mirror<T: Watched> {
    rows: Arc<RwLock<HashMap<Uuid, T>>>,
    task: JoinHandle<()>,
}

impl<T: Watched> Mirror<T> {
    /// Seed the cache with a bulk read and follow the live feed.
    ///
    /// The subscription is taken before the bulk read, so events arriving
    /// during the load sit buffered in the channel and are replayed once
    /// the seed is in place. No event is lost, and the upsert semantics
    /// make the replay converge on the latest write per id. A failed bulk
    /// load returns the error with the subscription already released;
    /// retrying is the caller's call, via `start` again.
    pub async fn start(store: Arc<dyn Store>) -> Result<Self> {
        let mut feed = store.subscribe(T::COLLECTION).await?;
        let seeded = T::bulk_load(store.as_ref()).await?;

        info!(
            collection = %T::COLLECTION,
            rows = seeded.len(),
            "mirror started"
        );

        let rows: HashMap<Uuid, T> = seeded.into_iter().map(|row| (row.key(), row)).collect();
        let rows = Arc::new(RwLock::new(rows));

        let cache = Arc::clone(&rows);
        let task = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        let Some(row_event) = T::from_change(event) else {
                            continue;
                        };
                        metrics::mirror_events().add(
                            1,
                            &[
                                KeyValue::new("collection", T::COLLECTION.table()),
                                KeyValue::new("event", row_event.kind()),
                            ],
                        );
                        let mut rows = cache.write().unwrap_or_else(|e| e.into_inner());
                        apply(&mut rows, row_event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events self-heal on the next update per
                        // row, but flag it: the cache may be stale.
                        warn!(
                            collection = %T::COLLECTION,
                            skipped,
                            "mirror lagged behind change feed"
                        );
                    }
                    Err(RecvError::Closed) => {
                        debug!(collection = %T::COLLECTION, "change feed closed");
                        break;
                    }
                }
            }
        });

        Ok(Self { rows, task })
    }

    /// Look up one row by id.
    pub fn get(&self, id: Uuid) -> Option<T> {
        self.read().get(&id).cloned()
    }

    /// Clone the current rows, in collection order.
    pub fn snapshot(&self) -> Vec<T> {
        let mut rows: Vec<T> = self.read().values().cloned().collect();
        T::sort(&mut rows);
        rows
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Stop following the feed and release the subscription.
    pub fn stop(self) {
        // Drop does the work.
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, T>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Watched> Drop for Mirror<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Apply one row event to the cache.
///
/// Insert and Update are both upserts: a duplicate Insert overwrites
/// (idempotent), an Update for an unseen id materializes the row
/// (self-healing against a missed creation event). Delete for an absent
/// id is a no-op.
fn apply<T: Watched>(rows: &mut HashMap<Uuid, T>, event: RowEvent<T>) {
    match event {
        RowEvent::Insert(row) | RowEvent::Update(row) => {
            rows.insert(row.key(), row);
        }
        RowEvent::Delete(id) => {
            rows.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Team;

    fn cache_with(rows: &[Team]) -> HashMap<Uuid, Team> {
        rows.iter().map(|t| (t.key(), t.clone())).collect()
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let team = Team::new("mechanical");
        let mut rows = HashMap::new();

        apply(&mut rows, RowEvent::Insert(team.clone()));
        apply(&mut rows, RowEvent::Insert(team.clone()));

        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn update_for_unseen_id_materializes_the_row() {
        let team = Team::new("electrical");
        let mut rows = HashMap::new();

        apply(&mut rows, RowEvent::Update(team.clone()));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[&team.key()].name, "electrical");
    }

    #[test]
    fn delete_for_absent_id_is_a_noop() {
        let mut rows: HashMap<Uuid, Team> = HashMap::new();
        apply(&mut rows, RowEvent::Delete(Uuid::new_v4()));
        assert!(rows.is_empty());
    }

    #[test]
    fn final_set_reflects_last_event_per_id() {
        let a = Team::new("alpha");
        let mut a_renamed = a.clone();
        a_renamed.name = "alpha prime".to_string();
        let b = Team::new("beta");

        let mut rows = cache_with(&[]);
        let events = vec![
            RowEvent::Insert(a.clone()),
            RowEvent::Delete(b.key()), // not yet present, no-op
            RowEvent::Insert(b.clone()),
            RowEvent::Update(a_renamed.clone()),
            RowEvent::Delete(b.key()),
        ];
        for event in events {
            apply(&mut rows, event);
        }

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[&a.key()].name, "alpha prime");
    }
}
