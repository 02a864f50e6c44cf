//! The persistent layer: sole owner of the store file.
//!
//! # Responsibility
//! - Open and migrate the store on its own thread, then serve commands.
//! - Accept merges from the working layer and write them on `Persist`.
//!
//! # Invariants
//! - The `rusqlite::Connection` never leaves the lane thread.
//! - Rows merged here stay pending until a `Persist` writes them; a failed
//!   write leaves them pending.

use crate::db::{open_store, DbError};
use crate::model::restaurant::{ObjectId, StoredRestaurant};
use crate::repo::restaurant_repo::{
    RepoError, RestaurantRepository, SqliteRestaurantRepository,
};
use crate::store::cascade::CascadeTicket;
use crate::store::context::StoreContext;
use crate::store::events::{CascadeStage, LayerId, StageOutcome};
use crate::store::layer::LayerError;
use log::{debug, error};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const STORE_THREAD_NAME: &str = "feast-store";

pub(crate) enum StoreCommand {
    Merge {
        child: LayerId,
        rows: Vec<StoredRestaurant>,
        reply: oneshot::Sender<Result<(), LayerError>>,
    },
    Persist {
        ticket: CascadeTicket,
    },
    Snapshot {
        reply: oneshot::Sender<Result<Vec<StoredRestaurant>, LayerError>>,
    },
}

/// What the lane learned while opening the store.
pub(crate) struct StoreBootstrap {
    pub(crate) migration_performed: bool,
    pub(crate) rows: Vec<StoredRestaurant>,
}

/// Why the persistent lane could not come up.
#[derive(Debug)]
pub enum StoreStartError {
    Open(DbError),
    Load(RepoError),
    Thread(String),
}

impl std::fmt::Display for StoreStartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(err) => write!(f, "failed to open store: {err}"),
            Self::Load(err) => write!(f, "failed to load persisted restaurants: {err}"),
            Self::Thread(message) => write!(f, "failed to start store lane: {message}"),
        }
    }
}

impl std::error::Error for StoreStartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(err) => Some(err),
            Self::Load(err) => Some(err),
            Self::Thread(_) => None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct StoreHandle {
    id: LayerId,
    sender: mpsc::UnboundedSender<StoreCommand>,
}

impl StoreHandle {
    /// Starts the lane thread and returns once the store is open.
    pub(crate) async fn start(
        path: PathBuf,
        context: Arc<StoreContext>,
    ) -> Result<(Self, StoreBootstrap), StoreStartError> {
        let id = context.allocate_layer_id();
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready, ready_response) = oneshot::channel();

        std::thread::Builder::new()
            .name(STORE_THREAD_NAME.to_string())
            .spawn(move || run_lane(id, path, context, receiver, ready))
            .map_err(|err| StoreStartError::Thread(err.to_string()))?;

        let bootstrap = ready_response
            .await
            .map_err(|_| StoreStartError::Thread("store lane exited during open".to_string()))??;
        Ok((Self { id, sender }, bootstrap))
    }

    pub(crate) fn id(&self) -> LayerId {
        self.id
    }

    pub(crate) async fn merge(
        &self,
        child: LayerId,
        rows: Vec<StoredRestaurant>,
    ) -> Result<(), LayerError> {
        self.request(|reply| StoreCommand::Merge { child, rows, reply })
            .await?
    }

    pub(crate) async fn snapshot(&self) -> Result<Vec<StoredRestaurant>, LayerError> {
        self.request(|reply| StoreCommand::Snapshot { reply })
            .await?
    }

    /// Posts the disk write without waiting. When the lane is gone the
    /// stage is recorded as failed and the cascade completes here.
    pub(crate) fn persist_or_fail(&self, ticket: CascadeTicket) {
        if let Err(mpsc::error::SendError(command)) =
            self.sender.send(StoreCommand::Persist { ticket })
        {
            if let StoreCommand::Persist { mut ticket } = command {
                ticket.record(
                    CascadeStage::Persistent,
                    StageOutcome::Failed {
                        error: LayerError::Closed { layer: self.id }.to_string(),
                    },
                );
                ticket.finish();
            }
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T, LayerError> {
        let closed = LayerError::Closed { layer: self.id };
        let (reply, response) = oneshot::channel();
        self.sender.send(build(reply)).map_err(|_| closed.clone())?;
        response.await.map_err(|_| closed)
    }
}

struct StoreLane {
    id: LayerId,
    conn: Connection,
    pending: Vec<StoredRestaurant>,
}

fn run_lane(
    id: LayerId,
    path: PathBuf,
    context: Arc<StoreContext>,
    mut receiver: mpsc::UnboundedReceiver<StoreCommand>,
    ready: oneshot::Sender<Result<StoreBootstrap, StoreStartError>>,
) {
    let mut lane = match bootstrap(id, path, &context) {
        Ok((lane, bootstrap)) => {
            if ready.send(Ok(bootstrap)).is_err() {
                return;
            }
            lane
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while let Some(command) = receiver.blocking_recv() {
        lane.handle(command);
    }
    debug!(
        "event=layer_close module=store layer={} role=persistent discarded_unsaved={}",
        lane.id,
        lane.pending.len()
    );
}

fn bootstrap(
    id: LayerId,
    path: PathBuf,
    context: &StoreContext,
) -> Result<(StoreLane, StoreBootstrap), StoreStartError> {
    let opened = open_store(&path).map_err(StoreStartError::Open)?;
    let (rows, max_object_id) = {
        let repo = SqliteRestaurantRepository::new(&opened.conn);
        let rows = repo.list_restaurants().map_err(StoreStartError::Load)?;
        let max = repo.max_object_id().map_err(StoreStartError::Load)?;
        (rows, max)
    };
    if let Some(max) = max_object_id {
        context.reserve_object_ids_through(max);
    }
    debug!(
        "event=store_load module=store status=ok layer={} rows={} max_object_id={}",
        id,
        rows.len(),
        max_object_id.map_or(0, |ObjectId(value)| value)
    );

    let lane = StoreLane {
        id,
        conn: opened.conn,
        pending: Vec::new(),
    };
    Ok((
        lane,
        StoreBootstrap {
            migration_performed: opened.migration_performed,
            rows,
        },
    ))
}

impl StoreLane {
    fn handle(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::Merge { child, rows, reply } => {
                debug!(
                    "event=layer_merge module=store layer={} child={} rows={}",
                    self.id,
                    child,
                    rows.len()
                );
                self.pending.extend(rows);
                let _ = reply.send(Ok(()));
            }
            StoreCommand::Persist { ticket } => self.persist(ticket),
            StoreCommand::Snapshot { reply } => {
                let result = SqliteRestaurantRepository::new(&self.conn)
                    .list_restaurants()
                    .map_err(|err| LayerError::Store {
                        reason: err.to_string(),
                    });
                let _ = reply.send(result);
            }
        }
    }

    fn persist(&mut self, mut ticket: CascadeTicket) {
        let pending = std::mem::take(&mut self.pending);
        let outcome = match SqliteRestaurantRepository::new(&self.conn).insert_restaurants(&pending)
        {
            Ok(rows) => StageOutcome::Saved { rows },
            Err(err) => {
                error!(
                    "event=store_write module=store status=error layer={} rows={} error={}",
                    self.id,
                    pending.len(),
                    err
                );
                self.pending = pending;
                StageOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        ticket.record(CascadeStage::Persistent, outcome);
        ticket.finish();
    }
}
