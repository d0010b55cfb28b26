//! Billing webhook event dedup (C9 side-channel) against a real Postgres
//! instance: the unique index on `event_id` is what actually guarantees a
//! replayed delivery never applies twice, so this is exercised against the
//! real table rather than mocked.

mod common;

use serde_json::json;
use translate_pipeline::db::webhook_events;

#[tokio::test]
async fn first_delivery_is_new_and_replay_is_not() {
    let Some(pool) = common::test_pool().await else { return };

    let event_id = format!("evt_{}", uuid::Uuid::new_v4());
    let payload = json!({ "id": event_id, "meta": { "event_name": "subscription_created" } });

    let first = webhook_events::record_if_new(&pool, &event_id, "subscription_created", &payload)
        .await
        .unwrap();
    assert!(first, "first delivery of a new event id must be recorded as new");

    let replay = webhook_events::record_if_new(&pool, &event_id, "subscription_created", &payload)
        .await
        .unwrap();
    assert!(!replay, "a replayed event id must not be recorded as new a second time");
}

#[tokio::test]
async fn distinct_event_ids_are_each_recorded_once() {
    let Some(pool) = common::test_pool().await else { return };

    let a = format!("evt_{}", uuid::Uuid::new_v4());
    let b = format!("evt_{}", uuid::Uuid::new_v4());
    let payload = json!({ "ok": true });

    assert!(webhook_events::record_if_new(&pool, &a, "order_created", &payload).await.unwrap());
    assert!(webhook_events::record_if_new(&pool, &b, "order_created", &payload).await.unwrap());
}
