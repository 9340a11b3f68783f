//! Postgres store tests. These need a reachable database; run with
//! `cargo test -- --ignored` and DATABASE_URL set.

use std::time::Duration;

use maintq::event::{ChangeEvent, Collection, RowEvent};
use maintq::model::{Equipment, RequestType, Status, Team};
use maintq::store::Store;
use maintq::store::pg::PgStore;

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for pg tests");
    let store = PgStore::connect(&url).await.expect("connect");
    store.migrate().await.expect("migrate");
    store
}

#[tokio::test]
#[ignore] // Requires running Postgres
async fn connect_migrate_and_health_check() {
    let store = connect().await;
    store.health_check().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Postgres
async fn team_and_equipment_round_trip() {
    let store = connect().await;

    let team = store
        .insert_team(Team::new(format!("team-{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    let equipment = store
        .insert_equipment(
            Equipment::new("integration press")
                .assigned_to(team.id)
                .description("pg round trip"),
        )
        .await
        .unwrap();

    let fetched = store.get_equipment(equipment.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "integration press");
    assert_eq!(fetched.assigned_team_id, Some(team.id));
    assert!(!fetched.is_scrapped);

    store.delete_equipment(equipment.id).await.unwrap();
    assert!(store.get_equipment(equipment.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires running Postgres
async fn request_status_update_round_trips_enums() {
    let store = connect().await;

    let team = store
        .insert_team(Team::new(format!("team-{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    let equipment = store
        .insert_equipment(Equipment::new("enum mill").assigned_to(team.id))
        .await
        .unwrap();

    let now = chrono::Utc::now();
    let request = store
        .insert_request(maintq::model::Request {
            id: maintq::model::RequestId::new(),
            equipment_id: equipment.id,
            team_id: Some(team.id),
            kind: RequestType::Corrective,
            status: Status::New,
            duration_hours: None,
            scheduled_date: None,
            title: "wire check".to_string(),
            description: String::new(),
            created_by: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    assert_eq!(request.status, Status::New);

    let updated = store
        .update_request_status(request.id, Status::InProgress, None)
        .await
        .unwrap();
    assert_eq!(updated.status, Status::InProgress);
    assert_eq!(updated.duration_hours, None);

    let repaired = store
        .update_request_status(request.id, Status::Repaired, Some(2.5))
        .await
        .unwrap();
    assert_eq!(repaired.status, Status::Repaired);
    assert_eq!(repaired.duration_hours, Some(2.5));

    store.delete_request(request.id).await.unwrap();
    store.delete_equipment(equipment.id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Postgres
async fn dropped_subscriptions_release_their_connections() {
    let store = connect().await;

    // More cycles than the pool holds. A feed task that only notices the
    // dropped receiver on the next NOTIFY would pin one pool connection
    // per cycle and starve the acquires below.
    for _ in 0..15 {
        let feed = store.subscribe(Collection::Equipment).await.unwrap();
        drop(feed);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    store.health_check().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Postgres
async fn subscribe_receives_notify_events() {
    let store = connect().await;

    let mut feed = store.subscribe(Collection::Teams).await.unwrap();
    let team = store
        .insert_team(Team::new(format!("notify-{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("notify within 5s")
        .unwrap();
    match event {
        ChangeEvent::Team(RowEvent::Insert(row)) => assert_eq!(row.id, team.id),
        other => panic!("expected team insert, got {other:?}"),
    }
}
