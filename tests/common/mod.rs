//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use maintq::auth::Credential;
use maintq::model::{Equipment, Profile, Request, RequestId, RequestType, Role, Status, Team, UserId};
use maintq::store::Store;
use maintq::store::mem::MemStore;

pub fn manager() -> Credential {
    Credential::new(Profile {
        id: UserId::new(),
        email: "manager@example.com".to_string(),
        role: Role::Manager,
        team_id: None,
        full_name: "Morgan Manager".to_string(),
    })
}

pub fn technician() -> Credential {
    Credential::new(Profile {
        id: UserId::new(),
        email: "tech@example.com".to_string(),
        role: Role::Technician,
        team_id: None,
        full_name: "Terry Technician".to_string(),
    })
}

/// A store seeded with one team and one piece of equipment assigned to it.
pub async fn seeded_store() -> (Arc<MemStore>, Team, Equipment) {
    let store = Arc::new(MemStore::new());
    let team = store.insert_team(Team::new("mechanical")).await.unwrap();
    let equipment = store
        .insert_equipment(Equipment::new("hydraulic press").assigned_to(team.id))
        .await
        .unwrap();
    (store, team, equipment)
}

/// Insert a request directly, bypassing intake, with a chosen status.
pub async fn seed_request(
    store: &MemStore,
    equipment: &Equipment,
    kind: RequestType,
    status: Status,
) -> Request {
    let now = chrono::Utc::now();
    let request = Request {
        id: RequestId::new(),
        equipment_id: equipment.id,
        team_id: equipment.assigned_team_id,
        kind,
        status,
        duration_hours: None,
        scheduled_date: None,
        title: "seeded".to_string(),
        description: String::new(),
        created_by: None,
        created_at: now,
        updated_at: now,
    };
    store.insert_request(request).await.unwrap()
}

/// Poll until `predicate` holds or two seconds pass.
pub async fn wait_until(predicate: impl Fn() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
