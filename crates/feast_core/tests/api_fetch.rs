mod support;

use feast_core::{ApiConfig, ApiError, FeastApi, RestaurantSyncService, StageOutcome, SyncError};
use rusqlite::Connection;
use std::time::Duration;
use support::{assert_no_cascade, next_cascade, start_manager};
use warp::http::StatusCode;
use warp::Filter;

const TWO_CAFES: &str = r#"{"_items":[{"_id":"r1","name":"Cafe A"},{"_id":"r2","name":"Cafe B"}]}"#;

/// Serves `body` at `GET /eats/v1/restaurants` and returns the base URL.
fn serve(body: &'static str, status: StatusCode) -> String {
    let route = warp::path!("eats" / "v1" / "restaurants").map(move || {
        warp::reply::with_status(
            warp::reply::with_header(body, "content-type", "application/json"),
            status,
        )
    });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    format!("http://{addr}/eats/v1")
}

fn config(base_url: String) -> ApiConfig {
    ApiConfig {
        base_url,
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn fetch_returns_items_in_payload_order() {
    let (_dir, manager) = start_manager().await;
    let api = FeastApi::new(&config(serve(TWO_CAFES, StatusCode::OK)), manager.clone()).unwrap();

    let restaurants = api.fetch_restaurants().await.unwrap();

    let pairs: Vec<(&str, &str)> = restaurants
        .iter()
        .map(|r| (r.identifier.as_str(), r.name.as_str()))
        .collect();
    assert_eq!(pairs, [("r1", "Cafe A"), ("r2", "Cafe B")]);
}

#[tokio::test]
async fn plain_fetch_does_not_persist() {
    let (_dir, manager) = start_manager().await;
    let mut events = manager.subscribe();
    let api = FeastApi::new(&config(serve(TWO_CAFES, StatusCode::OK)), manager.clone()).unwrap();

    assert_eq!(api.fetch_restaurants().await.unwrap().len(), 2);

    assert_no_cascade(&mut events).await;
    assert!(manager.restaurants().await.unwrap().is_empty());
    assert!(manager.persisted_restaurants().await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_into_layer_leaves_rows_unsaved() {
    let (_dir, manager) = start_manager().await;
    let api = FeastApi::new(&config(serve(TWO_CAFES, StatusCode::OK)), manager.clone()).unwrap();
    let layer = manager.background_layer();

    let parsed = api.fetch_restaurants_into(&layer).await.unwrap();

    assert_eq!(parsed.len(), 2);
    assert_eq!(layer.unsaved_count().await.unwrap(), 2);
    assert_eq!(layer.restaurants().await.unwrap(), parsed);
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let (_dir, manager) = start_manager().await;
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let api = FeastApi::new(&config(format!("http://127.0.0.1:{port}")), manager).unwrap();

    let err = api.fetch_restaurants().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn error_status_is_reported() {
    let (_dir, manager) = start_manager().await;
    let api = FeastApi::new(
        &config(serve(r#"{"_error":"down"}"#, StatusCode::SERVICE_UNAVAILABLE)),
        manager,
    )
    .unwrap();

    match api.fetch_restaurants().await.unwrap_err() {
        ApiError::Status { status, url } => {
            assert_eq!(status, 503);
            assert!(url.ends_with("/eats/v1/restaurants"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unexpected_body_shape_is_a_decode_error() {
    let (_dir, manager) = start_manager().await;
    let api = FeastApi::new(
        &config(serve(r#"[{"_id":"r1","name":"Cafe A"}]"#, StatusCode::OK)),
        manager,
    )
    .unwrap();

    let err = api.fetch_restaurants().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "unexpected error: {err}");
}

#[tokio::test]
#[should_panic(expected = "malformed restaurant payload")]
async fn item_without_name_is_fatal() {
    let (_dir, manager) = start_manager().await;
    let api = FeastApi::new(
        &config(serve(r#"{"_items":[{"_id":"r1"}]}"#, StatusCode::OK)),
        manager,
    )
    .unwrap();

    let _ = api.fetch_restaurants().await;
}

#[tokio::test]
async fn sync_persists_fetched_restaurants() {
    let (_dir, manager) = start_manager().await;
    let api = FeastApi::new(&config(serve(TWO_CAFES, StatusCode::OK)), manager.clone()).unwrap();
    let service = RestaurantSyncService::new(api, manager.clone());

    let summary = service.sync().await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.cascade.persistent, StageOutcome::Saved { rows: 2 });
    assert_eq!(manager.background_tasks().active(), 0);

    let persisted = manager.persisted_restaurants().await.unwrap();
    let identifiers: Vec<&str> = persisted.iter().map(|row| row.identifier()).collect();
    assert_eq!(identifiers, ["r1", "r2"]);
    assert_eq!(manager.restaurants().await.unwrap(), persisted);
}

#[tokio::test]
async fn sync_gives_up_when_the_disk_stage_stalls() {
    let (_dir, manager) = start_manager().await;
    let mut events = manager.subscribe();
    let api = FeastApi::new(&config(serve(TWO_CAFES, StatusCode::OK)), manager.clone()).unwrap();
    let service = RestaurantSyncService::new(api, manager.clone())
        .with_cascade_timeout(Duration::from_millis(200));

    let lock = Connection::open(manager.store_path()).unwrap();
    lock.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    match service.sync().await.unwrap_err() {
        SyncError::CascadeTimeout(waited) => assert_eq!(waited, Duration::from_millis(200)),
        other => panic!("unexpected error: {other}"),
    }

    lock.execute_batch("COMMIT;").unwrap();
    drop(lock);

    let report = next_cascade(&mut events).await;
    assert_eq!(report.persistent, StageOutcome::Saved { rows: 2 });
    assert_eq!(manager.background_tasks().active(), 0);
}
