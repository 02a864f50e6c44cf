//! Database manager: builds the layer chain and owns its lifecycle.
//!
//! # Responsibility
//! - Resolve the store path and open it on the persistent lane.
//! - Wire validation -> working -> persistent and hand out ephemeral layers.
//!
//! # Invariants
//! - One manager owns exactly one store file.
//! - Ephemeral layers handed out here are direct children of the
//!   validation layer.
//! - A store that cannot be opened is fatal for `start`.

use crate::db::{database_directory, DbError};
use crate::model::restaurant::StoredRestaurant;
use crate::store::background::BackgroundTasks;
use crate::store::context::StoreContext;
use crate::store::events::{LayerId, LayerRole, StoreEvent};
use crate::store::layer::{CascadeWiring, Layer, LayerError, ParentLink};
use crate::store::persistent::{StoreHandle, StoreStartError};
use crate::store::validator::{NoopValidator, SaveValidator};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DEFAULT_STORE_NAME: &str = "Feast";

/// Inputs for opening a store.
#[derive(Clone)]
pub struct StoreOptions {
    /// Directory that receives the `Database` folder.
    pub base_directory: PathBuf,
    /// File stem of the store; `.sqlite` is appended.
    pub store_name: String,
    pub validator: Arc<dyn SaveValidator>,
}

impl StoreOptions {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            validator: Arc::new(NoopValidator),
        }
    }

    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SaveValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// `<base>/Database/<name>.sqlite`; creates the directory when needed.
    pub fn resolve_store_path(&self) -> PathBuf {
        database_directory(&self.base_directory).join(format!("{}.sqlite", self.store_name))
    }
}

/// Entry point to the restaurant store. Cheap to clone.
#[derive(Clone)]
pub struct DatabaseManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    context: Arc<StoreContext>,
    validation: Layer,
    working: Layer,
    store: StoreHandle,
    store_path: PathBuf,
}

/// Read-only view of the caller-visible layer.
#[derive(Debug, Clone)]
pub struct WorkingLayer {
    layer: Layer,
}

impl WorkingLayer {
    pub fn id(&self) -> LayerId {
        self.layer.id()
    }

    pub async fn restaurants(&self) -> Result<Vec<StoredRestaurant>, LayerError> {
        self.layer.restaurants().await
    }

    pub async fn unsaved_count(&self) -> Result<usize, LayerError> {
        self.layer.unsaved_count().await
    }
}

impl DatabaseManager {
    /// Opens the store and spawns all lanes on the current tokio runtime.
    ///
    /// Returns whether an older on-disk schema was migrated.
    pub async fn try_start(options: StoreOptions) -> Result<(Self, bool), StoreStartError> {
        let store_path = options.resolve_store_path();
        Self::start_at(store_path, options.validator).await
    }

    /// Like [`DatabaseManager::try_start`], but an unopenable store aborts the
    /// process after logging. There is no recovery path for it.
    pub async fn start(options: StoreOptions) -> (Self, bool) {
        let store_path = options.resolve_store_path();
        match Self::start_at(store_path.clone(), options.validator).await {
            Ok(started) => started,
            Err(err) => {
                report_fatal_open(&store_path, &err);
                log::logger().flush();
                std::process::abort();
            }
        }
    }

    async fn start_at(
        store_path: PathBuf,
        validator: Arc<dyn SaveValidator>,
    ) -> Result<(Self, bool), StoreStartError> {
        info!(
            "event=store_start module=store status=start path={}",
            store_path.display()
        );
        let context = StoreContext::new();
        let (store, bootstrap) = StoreHandle::start(store_path.clone(), Arc::clone(&context)).await?;

        let working = Layer::spawn(
            LayerRole::Working,
            ParentLink::Store(store.clone()),
            Arc::clone(&context),
            None,
            bootstrap.rows,
        );
        let validation = Layer::spawn(
            LayerRole::Validation,
            ParentLink::Layer(working.clone()),
            Arc::clone(&context),
            Some(CascadeWiring {
                working: working.clone(),
                store: store.clone(),
                validator,
            }),
            Vec::new(),
        );

        info!(
            "event=store_start module=store status=ok path={} migration_performed={}",
            store_path.display(),
            bootstrap.migration_performed
        );
        let manager = Self {
            inner: Arc::new(ManagerInner {
                context,
                validation,
                working,
                store,
                store_path,
            }),
        };
        Ok((manager, bootstrap.migration_performed))
    }

    pub fn store_path(&self) -> &Path {
        &self.inner.store_path
    }

    pub fn validation_layer_id(&self) -> LayerId {
        self.inner.validation.id()
    }

    pub fn working_layer(&self) -> WorkingLayer {
        WorkingLayer {
            layer: self.inner.working.clone(),
        }
    }

    /// A fresh ephemeral layer parented to the validation layer.
    ///
    /// Saving it starts a cascade; dropping it unsaved discards its rows.
    pub fn background_layer(&self) -> Layer {
        self.inner.validation.child()
    }

    /// Caller-visible restaurants, in display order.
    pub async fn restaurants(&self) -> Result<Vec<StoredRestaurant>, LayerError> {
        self.inner.working.restaurants().await
    }

    /// Restaurants read back from the store file.
    pub async fn persisted_restaurants(&self) -> Result<Vec<StoredRestaurant>, LayerError> {
        self.inner.store.snapshot().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.context.subscribe()
    }

    pub fn background_tasks(&self) -> BackgroundTasks {
        self.inner.context.background().clone()
    }
}

fn report_fatal_open(store_path: &Path, err: &StoreStartError) {
    match err {
        StoreStartError::Open(DbError::MissingSourceModel { .. }) => error!(
            "event=store_start module=store status=fatal error_code=db_missing_source_model \
             message=\"migration failed; try deleting {}\" error={}",
            store_path.display(),
            err
        ),
        _ => error!(
            "event=store_start module=store status=fatal path={} error={}",
            store_path.display(),
            err
        ),
    }
}
