//! Entry/exit pipeline over in-memory deliveries and the in-memory store

use chrono::{TimeZone, Utc};
use parkline_shared::context::CallContext;
use parkline_shared::events::{encode, EntryEvent, ExitEvent};
use parkline_shared::messaging::{spawn_dispatch, HandlerFailurePolicy};
use parkline_shared::presence::{MemoryStore, PresenceTracker, TimeLayout};
use parkline_shared::telemetry::Logger;
use parkline_worker::handlers::{
    vehicle_hash_key, EntryHandler, ExitHandler, ENTRY_TIME_FIELD, EXIT_TIME_FIELD,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

const SET: &str = "vehicles_parked";

type Delivery = Result<Vec<u8>, String>;

fn tracker() -> Arc<PresenceTracker<MemoryStore>> {
    Arc::new(PresenceTracker::new(MemoryStore::new(), Logger::disabled()))
}

#[tokio::test]
async fn test_vehicle_enters_and_exits() {
    let tracker = tracker();
    let ctx = CallContext::background();
    let entered = Utc.with_ymd_and_hms(2025, 1, 4, 12, 0, 0).unwrap();
    let exited = Utc.with_ymd_and_hms(2025, 1, 4, 14, 30, 0).unwrap();

    let (entry_tx, entry_rx) = mpsc::unbounded_channel::<Delivery>();
    let (exit_tx, exit_rx) = mpsc::unbounded_channel::<Delivery>();

    let mut entry = spawn_dispatch(
        "entry",
        UnboundedReceiverStream::new(entry_rx),
        Arc::new(EntryHandler::new(tracker.clone(), SET, Logger::disabled())),
        HandlerFailurePolicy::LogAndContinue,
        Logger::disabled(),
    );
    let mut exit = spawn_dispatch(
        "exit",
        UnboundedReceiverStream::new(exit_rx),
        Arc::new(ExitHandler::new(tracker.clone(), SET, Logger::disabled())),
        HandlerFailurePolicy::LogAndContinue,
        Logger::disabled(),
    );

    entry_tx
        .send(Ok(encode(&EntryEvent::new("KA01AB1234", entered)).unwrap()))
        .unwrap();
    drop(entry_tx);
    assert_eq!(entry.wait().await.unwrap().delivered, 1);

    assert!(tracker.is_not_empty(&ctx, SET).await.unwrap());
    assert_eq!(tracker.random_member(&ctx, SET).await.unwrap(), "KA01AB1234");
    let recorded = tracker
        .get_hash_field_as_time(
            &ctx,
            &vehicle_hash_key("KA01AB1234"),
            ENTRY_TIME_FIELD,
            &TimeLayout::Rfc3339,
        )
        .await
        .unwrap();
    assert_eq!(recorded, entered);

    exit_tx
        .send(Ok(encode(&ExitEvent::new("KA01AB1234", exited)).unwrap()))
        .unwrap();
    drop(exit_tx);
    assert_eq!(exit.wait().await.unwrap().delivered, 1);

    assert!(!tracker.is_not_empty(&ctx, SET).await.unwrap());
    let recorded = tracker
        .get_hash_field_as_time(
            &ctx,
            &vehicle_hash_key("KA01AB1234"),
            EXIT_TIME_FIELD,
            &TimeLayout::Rfc3339,
        )
        .await
        .unwrap();
    assert_eq!(recorded, exited);
}

#[tokio::test]
async fn test_malformed_message_does_not_stop_worker() {
    let tracker = tracker();
    let entered = Utc.with_ymd_and_hms(2025, 1, 4, 12, 0, 0).unwrap();

    let deliveries: Vec<Delivery> = vec![
        Ok(b"not json".to_vec()),
        Ok(serde_json::to_vec(&serde_json::json!({"vehicle_plate": "KA01AB1234"})).unwrap()),
        Ok(encode(&EntryEvent::new("MH12XY9876", entered)).unwrap()),
    ];

    let mut entry = spawn_dispatch(
        "entry",
        futures::stream::iter(deliveries),
        Arc::new(EntryHandler::new(tracker.clone(), SET, Logger::disabled())),
        HandlerFailurePolicy::LogAndContinue,
        Logger::disabled(),
    );

    let summary = entry.wait().await.unwrap();
    assert_eq!(summary.delivered, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(tracker.store().members(SET).len(), 1);
    assert!(tracker.store().members(SET).contains("MH12XY9876"));
}

#[tokio::test]
async fn test_abort_policy_surfaces_store_outage() {
    let tracker = tracker();
    tracker.store().close();

    let deliveries: Vec<Delivery> = vec![
        Ok(encode(&EntryEvent::new("KA01AB1234", Utc::now())).unwrap()),
        Ok(encode(&EntryEvent::new("MH12XY9876", Utc::now())).unwrap()),
    ];

    let mut entry = spawn_dispatch(
        "entry",
        futures::stream::iter(deliveries),
        Arc::new(EntryHandler::new(tracker.clone(), SET, Logger::disabled())),
        HandlerFailurePolicy::Abort,
        Logger::disabled(),
    );

    let err = entry.wait().await.unwrap_err();
    assert!(err.to_string().contains("entry"));
}
