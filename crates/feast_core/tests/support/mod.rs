#![allow(dead_code)]

use feast_core::{CascadeReport, DatabaseManager, JsonObject, StoreEvent, StoreOptions};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const EVENT_WAIT: Duration = Duration::from_secs(5);
pub const QUIET_WAIT: Duration = Duration::from_millis(300);

pub async fn start_manager() -> (TempDir, DatabaseManager) {
    let base = tempfile::tempdir().unwrap();
    let (manager, _) = DatabaseManager::try_start(StoreOptions::new(base.path()))
        .await
        .unwrap();
    (base, manager)
}

pub fn object(value: serde_json::Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

async fn cascade_event(events: &mut broadcast::Receiver<StoreEvent>) -> CascadeReport {
    loop {
        match events.recv().await {
            Ok(StoreEvent::CascadeFinished(report)) => return report,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Waits for the next finished cascade.
pub async fn next_cascade(events: &mut broadcast::Receiver<StoreEvent>) -> CascadeReport {
    tokio::time::timeout(EVENT_WAIT, cascade_event(events))
        .await
        .expect("cascade should finish")
}

/// Asserts that no cascade finishes within a short window.
pub async fn assert_no_cascade(events: &mut broadcast::Receiver<StoreEvent>) {
    let result = tokio::time::timeout(QUIET_WAIT, cascade_event(events)).await;
    assert!(result.is_err(), "unexpected cascade: {:?}", result.ok());
}
