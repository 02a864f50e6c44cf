//! Restaurant sync use-case.
//!
//! # Responsibility
//! - Fetch restaurants into a background layer and commit it.
//! - Wait for the resulting save cascade and report its outcome.
//!
//! # Invariants
//! - Every successful sync inserts new rows; identifiers are not deduplicated.
//! - Waiting for the cascade report is bounded by the cascade timeout.

use crate::api::{ApiError, FeastApi};
use crate::store::events::{CascadeReport, StoreEvent};
use crate::store::layer::LayerError;
use crate::store::manager::DatabaseManager;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_CASCADE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum SyncError {
    Api(ApiError),
    Save(LayerError),
    /// The event channel closed before the cascade reported back.
    CascadeLost,
    /// No report arrived in time; the cascade may still finish later.
    CascadeTimeout(Duration),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api(err) => write!(f, "{err}"),
            Self::Save(err) => write!(f, "{err}"),
            Self::CascadeLost => write!(f, "save cascade finished without a report"),
            Self::CascadeTimeout(waited) => write!(
                f,
                "save cascade did not report within {}ms",
                waited.as_millis()
            ),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Api(err) => Some(err),
            Self::Save(err) => Some(err),
            Self::CascadeLost | Self::CascadeTimeout(_) => None,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<LayerError> for SyncError {
    fn from(value: LayerError) -> Self {
        Self::Save(value)
    }
}

/// Result of one sync.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub fetched: usize,
    pub cascade: CascadeReport,
}

/// Fetch-and-persist service.
pub struct RestaurantSyncService {
    api: FeastApi,
    manager: DatabaseManager,
    cascade_timeout: Duration,
}

impl RestaurantSyncService {
    pub fn new(api: FeastApi, manager: DatabaseManager) -> Self {
        Self {
            api,
            manager,
            cascade_timeout: DEFAULT_CASCADE_TIMEOUT,
        }
    }

    /// Overrides how long `sync` waits for the cascade report.
    pub fn with_cascade_timeout(mut self, cascade_timeout: Duration) -> Self {
        self.cascade_timeout = cascade_timeout;
        self
    }

    /// Fetches restaurants, commits them, and waits for the disk stage.
    pub async fn sync(&self) -> Result<SyncSummary, SyncError> {
        let mut events = self.manager.subscribe();
        let layer = self.manager.background_layer();

        let fetched = self.api.fetch_restaurants_into(&layer).await?.len();
        let summary = layer.save().await?;

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::CascadeFinished(report)) if report.trigger == summary.layer => {
                        return Ok(report);
                    }
                    Ok(_) => {}
                    // Skipped events are the oldest ones; ours may still be queued.
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("event=sync module=service status=lagged skipped={skipped}");
                    }
                    Err(RecvError::Closed) => return Err(SyncError::CascadeLost),
                }
            }
        };
        let cascade = match tokio::time::timeout(self.cascade_timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "event=sync module=service status=timeout layer={} waited_ms={}",
                    summary.layer,
                    self.cascade_timeout.as_millis()
                );
                return Err(SyncError::CascadeTimeout(self.cascade_timeout));
            }
        };

        info!(
            "event=sync module=service status={} fetched={} cascade_id={}",
            if cascade.is_clean() { "ok" } else { "partial" },
            fetched,
            cascade.cascade_id
        );
        Ok(SyncSummary { fetched, cascade })
    }
}
