//! Mirror behavior against a live in-memory store: seeding, event
//! application, feed degradation, and subscription release.

mod common;

use std::sync::Arc;

use maintq::event::{ChangeEvent, Collection, RowEvent};
use maintq::mirror::Mirror;
use maintq::model::{Request, Status, Team};
use maintq::store::Store;
use maintq::store::mem::MemStore;
use uuid::Uuid;

use common::{seed_request, seeded_store, wait_until};
use maintq::model::RequestType;

#[tokio::test]
async fn mirror_seeds_from_bulk_load() {
    let store = Arc::new(MemStore::new());
    store.insert_team(Team::new("beta")).await.unwrap();
    store.insert_team(Team::new("alpha")).await.unwrap();

    let mirror = Mirror::<Team>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();

    assert_eq!(mirror.len(), 2);
    let names: Vec<String> = mirror.snapshot().into_iter().map(|t| t.name).collect();
    assert_eq!(names, ["alpha", "beta"]);
}

#[tokio::test]
async fn mirror_follows_store_mutations() {
    let (store, _team, equipment) = seeded_store().await;
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();
    assert!(mirror.is_empty());

    let request = seed_request(&store, &equipment, RequestType::Corrective, Status::New).await;
    wait_until(|| mirror.len() == 1).await;

    store
        .update_request_status(request.id, Status::InProgress, None)
        .await
        .unwrap();
    wait_until(|| {
        mirror
            .get(request.id.0)
            .is_some_and(|r| r.status == Status::InProgress)
    })
    .await;

    store.delete_request(request.id).await.unwrap();
    wait_until(|| mirror.is_empty()).await;
}

#[tokio::test]
async fn team_rename_flows_through_the_mirror() {
    let store = Arc::new(MemStore::new());
    let team = store.insert_team(Team::new("mechanicl")).await.unwrap();

    let mirror = Mirror::<Team>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();
    assert_eq!(mirror.get(team.id.0).unwrap().name, "mechanicl");

    store.rename_team(team.id, "mechanical").await.unwrap();
    wait_until(|| {
        mirror
            .get(team.id.0)
            .is_some_and(|t| t.name == "mechanical")
    })
    .await;
}

#[tokio::test]
async fn duplicate_insert_events_converge() {
    let (store, _team, equipment) = seeded_store().await;
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();

    let request = seed_request(&store, &equipment, RequestType::Corrective, Status::New).await;
    // Redeliver the same insert, as a feed reconnect would.
    store.publish(ChangeEvent::Request(RowEvent::Insert(request.clone())));
    store.publish(ChangeEvent::Request(RowEvent::Insert(request)));

    wait_until(|| mirror.len() == 1).await;
    tokio::task::yield_now().await;
    assert_eq!(mirror.len(), 1);
}

#[tokio::test]
async fn update_for_unseen_row_materializes_it() {
    let (store, _team, equipment) = seeded_store().await;
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();

    // An update whose insert the mirror never saw.
    let now = chrono::Utc::now();
    let unseen = Request {
        id: maintq::model::RequestId::new(),
        equipment_id: equipment.id,
        team_id: equipment.assigned_team_id,
        kind: RequestType::Preventive,
        status: Status::InProgress,
        duration_hours: None,
        scheduled_date: None,
        title: "missed insert".to_string(),
        description: String::new(),
        created_by: None,
        created_at: now,
        updated_at: now,
    };
    store.publish(ChangeEvent::Request(RowEvent::Update(unseen.clone())));

    wait_until(|| mirror.get(unseen.id.0).is_some()).await;
    assert_eq!(mirror.get(unseen.id.0).unwrap().status, Status::InProgress);
}

#[tokio::test]
async fn delete_for_absent_row_is_ignored() {
    let (store, _team, _equipment) = seeded_store().await;
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();

    store.publish(ChangeEvent::Request(RowEvent::Delete(Uuid::new_v4())));
    tokio::task::yield_now().await;
    assert!(mirror.is_empty());
}

#[tokio::test]
async fn events_from_other_collections_are_not_applied() {
    let (store, _team, _equipment) = seeded_store().await;
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();

    store.insert_team(Team::new("electrical")).await.unwrap();
    tokio::task::yield_now().await;
    assert!(mirror.is_empty());
}

#[tokio::test]
async fn stop_releases_the_subscription() {
    let (store, _team, _equipment) = seeded_store().await;
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();
    assert_eq!(store.subscriber_count(Collection::Requests), 1);

    mirror.stop();
    wait_until(|| store.subscriber_count(Collection::Requests) == 0).await;
}

#[tokio::test]
async fn failed_bulk_load_surfaces_and_releases_subscription() {
    let (store, _team, _equipment) = seeded_store().await;
    store.fail_next_load(Collection::Requests);

    let result = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>).await;
    assert!(result.is_err());
    assert_eq!(store.subscriber_count(Collection::Requests), 0);

    // A later start succeeds and subscribes afresh.
    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();
    assert_eq!(store.subscriber_count(Collection::Requests), 1);
    drop(mirror);
}

#[tokio::test]
async fn replayed_event_for_a_seeded_row_converges() {
    // A write that lands while the bulk read runs shows up twice: once in
    // the seed and once replayed from the buffered feed. The replay must
    // converge, not duplicate.
    let (store, _team, equipment) = seeded_store().await;
    let request = seed_request(&store, &equipment, RequestType::Corrective, Status::New).await;

    let mirror = Mirror::<Request>::start(Arc::clone(&store) as Arc<dyn Store>)
        .await
        .unwrap();
    assert_eq!(mirror.len(), 1);

    store.publish(ChangeEvent::Request(RowEvent::Insert(request.clone())));
    wait_until(|| mirror.len() == 1).await;
    tokio::task::yield_now().await;
    assert_eq!(mirror.len(), 1);
    assert_eq!(mirror.get(request.id.0).unwrap().status, Status::New);
}
