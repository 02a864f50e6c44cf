//! Core data layer for Feast.
//! Restaurants are fetched from the remote API, parsed into layers and
//! persisted through the validation -> working -> persistent save cascade.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod parser;
pub mod repo;
pub mod service;
pub mod store;

pub use api::{ApiError, FeastApi};
pub use config::{ApiConfig, ConfigError, FeastConfig, LoggingConfig, StoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::restaurant::{
    Location, ObjectId, Restaurant, RestaurantAttribute, RestaurantValidationError,
    StoredRestaurant,
};
pub use parser::{JsonObject, JsonParser, ParseError, RestaurantParser};
pub use repo::restaurant_repo::{
    RepoError, RepoResult, RestaurantRepository, SqliteRestaurantRepository,
};
pub use service::sync_service::{RestaurantSyncService, SyncError, SyncSummary};
pub use store::{
    BackgroundTask, BackgroundTasks, CascadeReport, CascadeStage, DatabaseManager, Layer,
    LayerError, LayerId, LayerRole, NoopValidator, SaveSummary, SaveValidator, StageOutcome,
    StoreEvent, StoreOptions, StoreStartError, WorkingLayer,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
