//! In-memory layers and the lanes that serialize their work.
//!
//! # Responsibility
//! - Hold each layer's rows and its not-yet-saved changes.
//! - Push changes to the parent on save.
//! - Run the validation hook and the save cascade on the validation lane.
//!
//! # Invariants
//! - Commands on one layer run strictly in submission order.
//! - Only a commit from a direct child of the validation layer starts a
//!   cascade; commits into any other layer just merge.
//! - A failed save leaves the layer's changes unsaved.
//! - The validation layer refuses rows that fail `Restaurant::validate`, so
//!   nothing the store would reject gets past it.

use crate::model::restaurant::{sort_for_display, ObjectId, Restaurant, StoredRestaurant};
use crate::store::cascade::CascadeTicket;
use crate::store::context::StoreContext;
use crate::store::events::{CascadeStage, LayerId, LayerRole, StageOutcome, StoreEvent};
use crate::store::persistent::StoreHandle;
use crate::store::validator::SaveValidator;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Errors returned by layer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// The layer's lane is no longer running.
    Closed { layer: LayerId },
    /// The validation hook refused a commit from `layer`.
    Rejected { layer: LayerId, reason: String },
    /// The persistent layer failed to read or write the store file.
    Store { reason: String },
}

impl Display for LayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed { layer } => write!(f, "{layer} is closed"),
            Self::Rejected { layer, reason } => {
                write!(f, "commit from {layer} rejected: {reason}")
            }
            Self::Store { reason } => write!(f, "store error: {reason}"),
        }
    }
}

impl Error for LayerError {}

/// What one successful save pushed upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub layer: LayerId,
    pub parent: LayerId,
    pub inserted: usize,
}

pub(crate) enum LayerCommand {
    Insert {
        restaurant: Restaurant,
        reply: oneshot::Sender<ObjectId>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<StoredRestaurant>>,
    },
    UnsavedCount {
        reply: oneshot::Sender<usize>,
    },
    Save {
        reply: oneshot::Sender<Result<SaveSummary, LayerError>>,
    },
    Merge {
        child: LayerId,
        rows: Vec<StoredRestaurant>,
        reply: oneshot::Sender<Result<(), LayerError>>,
    },
    CascadeSave {
        ticket: CascadeTicket,
        store: StoreHandle,
        reply: oneshot::Sender<()>,
    },
}

/// Where a layer's saves go.
#[derive(Clone)]
pub(crate) enum ParentLink {
    Layer(Layer),
    Store(StoreHandle),
}

impl ParentLink {
    fn id(&self) -> LayerId {
        match self {
            Self::Layer(layer) => layer.id(),
            Self::Store(store) => store.id(),
        }
    }

    async fn merge(&self, child: LayerId, rows: Vec<StoredRestaurant>) -> Result<(), LayerError> {
        match self {
            Self::Layer(layer) => layer.merge(child, rows).await,
            Self::Store(store) => store.merge(child, rows).await,
        }
    }
}

/// Collaborators the validation lane needs to drive a cascade.
#[derive(Clone)]
pub(crate) struct CascadeWiring {
    pub(crate) working: Layer,
    pub(crate) store: StoreHandle,
    pub(crate) validator: Arc<dyn SaveValidator>,
}

/// Handle to one layer. Cloning shares the same layer.
///
/// The lane behind a layer stops when the last handle (including handles
/// held by child layers) is dropped; unsaved changes are discarded then.
#[derive(Clone)]
pub struct Layer {
    id: LayerId,
    role: LayerRole,
    parent: LayerId,
    sender: mpsc::UnboundedSender<LayerCommand>,
    context: Arc<StoreContext>,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("parent", &self.parent)
            .finish()
    }
}

impl Layer {
    /// Spawns a lane on the current tokio runtime.
    pub(crate) fn spawn(
        role: LayerRole,
        parent: ParentLink,
        context: Arc<StoreContext>,
        cascade: Option<CascadeWiring>,
        seed: Vec<StoredRestaurant>,
    ) -> Self {
        let id = context.allocate_layer_id();
        let (sender, receiver) = mpsc::unbounded_channel();
        let parent_id = parent.id();

        let lane = LayerLane {
            id,
            role,
            parent,
            rows: seed
                .into_iter()
                .map(|row| (row.object_id, row.restaurant))
                .collect(),
            unsaved: Vec::new(),
            context: Arc::clone(&context),
            cascade,
        };
        tokio::spawn(lane.run(receiver));

        debug!(
            "event=layer_open module=store layer={} role={} parent={}",
            id,
            role.as_str(),
            parent_id
        );
        Self {
            id,
            role,
            parent: parent_id,
            sender,
            context,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn role(&self) -> LayerRole {
        self.role
    }

    pub fn parent_id(&self) -> LayerId {
        self.parent
    }

    /// Inserts a new record into this layer's changeset.
    pub async fn insert(&self, restaurant: Restaurant) -> Result<ObjectId, LayerError> {
        self.request(|reply| LayerCommand::Insert { restaurant, reply })
            .await
    }

    /// Rows visible in this layer, in display order.
    pub async fn restaurants(&self) -> Result<Vec<StoredRestaurant>, LayerError> {
        self.request(|reply| LayerCommand::Snapshot { reply }).await
    }

    /// Number of rows inserted or merged here and not yet saved upward.
    pub async fn unsaved_count(&self) -> Result<usize, LayerError> {
        self.request(|reply| LayerCommand::UnsavedCount { reply })
            .await
    }

    /// Commits this layer's changes into its parent.
    ///
    /// When the parent is the validation layer, a successful commit starts
    /// a save cascade that continues after this call returns.
    pub async fn save(&self) -> Result<SaveSummary, LayerError> {
        self.request(|reply| LayerCommand::Save { reply })
            .await?
    }

    /// Creates an ephemeral layer parented to this one.
    ///
    /// Commits from the child land here and never start a cascade on
    /// their own.
    pub fn child(&self) -> Layer {
        Layer::spawn(
            LayerRole::Ephemeral,
            ParentLink::Layer(self.clone()),
            Arc::clone(&self.context),
            None,
            Vec::new(),
        )
    }

    pub(crate) async fn merge(
        &self,
        child: LayerId,
        rows: Vec<StoredRestaurant>,
    ) -> Result<(), LayerError> {
        self.request(|reply| LayerCommand::Merge { child, rows, reply })
            .await?
    }

    /// Hands the ticket to the working lane and waits for its commit. The
    /// lane forwards the ticket to `store` afterwards.
    ///
    /// Returns the ticket when the lane cannot accept it.
    pub(crate) async fn cascade_save(
        &self,
        ticket: CascadeTicket,
        store: StoreHandle,
    ) -> Result<(), CascadeTicket> {
        let (reply, response) = oneshot::channel();
        if let Err(mpsc::error::SendError(command)) = self.sender.send(LayerCommand::CascadeSave {
            ticket,
            store,
            reply,
        }) {
            return match command {
                LayerCommand::CascadeSave { ticket, .. } => Err(ticket),
                _ => Ok(()),
            };
        }
        // A dropped reply means the lane consumed the ticket; its drop
        // completes the cascade.
        let _ = response.await;
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LayerCommand,
    ) -> Result<T, LayerError> {
        let closed = LayerError::Closed { layer: self.id };
        let (reply, response) = oneshot::channel();
        self.sender.send(build(reply)).map_err(|_| closed.clone())?;
        response.await.map_err(|_| closed)
    }
}

struct LayerLane {
    id: LayerId,
    role: LayerRole,
    parent: ParentLink,
    rows: BTreeMap<ObjectId, Restaurant>,
    unsaved: Vec<ObjectId>,
    context: Arc<StoreContext>,
    cascade: Option<CascadeWiring>,
}

impl LayerLane {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<LayerCommand>) {
        while let Some(command) = receiver.recv().await {
            self.handle(command).await;
        }
        debug!(
            "event=layer_close module=store layer={} role={} discarded_unsaved={}",
            self.id,
            self.role.as_str(),
            self.unsaved.len()
        );
    }

    async fn handle(&mut self, command: LayerCommand) {
        match command {
            LayerCommand::Insert { restaurant, reply } => {
                let object_id = self.context.allocate_object_id();
                self.rows.insert(object_id, restaurant);
                self.unsaved.push(object_id);
                let _ = reply.send(object_id);
            }
            LayerCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            LayerCommand::UnsavedCount { reply } => {
                let _ = reply.send(self.unsaved.len());
            }
            LayerCommand::Save { reply } => {
                let result = self.save_into_parent().await;
                let _ = reply.send(result);
            }
            LayerCommand::Merge { child, rows, reply } => {
                self.merge_child(child, rows, reply).await;
            }
            LayerCommand::CascadeSave {
                ticket,
                store,
                reply,
            } => {
                self.cascade_save(ticket, store, reply).await;
            }
        }
    }

    fn snapshot(&self) -> Vec<StoredRestaurant> {
        let mut rows: Vec<StoredRestaurant> = self
            .rows
            .iter()
            .map(|(object_id, restaurant)| StoredRestaurant::new(*object_id, restaurant.clone()))
            .collect();
        sort_for_display(&mut rows);
        rows
    }

    fn take_unsaved(&mut self) -> Vec<StoredRestaurant> {
        std::mem::take(&mut self.unsaved)
            .into_iter()
            .filter_map(|object_id| {
                self.rows
                    .get(&object_id)
                    .map(|restaurant| StoredRestaurant::new(object_id, restaurant.clone()))
            })
            .collect()
    }

    async fn save_into_parent(&mut self) -> Result<SaveSummary, LayerError> {
        self.context.publish(StoreEvent::WillSave {
            layer: self.id,
            role: self.role,
        });

        let pending = self.take_unsaved();
        let pending_ids: Vec<ObjectId> = pending.iter().map(|row| row.object_id).collect();
        let parent = self.parent.id();

        match self.parent.merge(self.id, pending).await {
            Ok(()) => {
                let inserted = pending_ids.len();
                self.context.publish(StoreEvent::DidSave {
                    layer: self.id,
                    parent,
                    inserted,
                });
                debug!(
                    "event=layer_save module=store status=ok layer={} parent={} inserted={}",
                    self.id, parent, inserted
                );
                Ok(SaveSummary {
                    layer: self.id,
                    parent,
                    inserted,
                })
            }
            Err(err) => {
                self.unsaved = pending_ids;
                warn!(
                    "event=layer_save module=store status=error layer={} parent={} error={}",
                    self.id, parent, err
                );
                Err(err)
            }
        }
    }

    async fn merge_child(
        &mut self,
        child: LayerId,
        rows: Vec<StoredRestaurant>,
        reply: oneshot::Sender<Result<(), LayerError>>,
    ) {
        let wiring = match (self.role, &self.cascade) {
            (LayerRole::Validation, Some(wiring)) => Some(wiring.clone()),
            _ => None,
        };

        if let Some(wiring) = &wiring {
            let checked = rows
                .iter()
                .try_for_each(|row| row.restaurant.validate())
                .map_err(|err| err.to_string())
                .and_then(|()| wiring.validator.validate_save(child, &rows));
            if let Err(reason) = checked {
                warn!(
                    "event=validate_save module=store status=rejected layer={} rows={} reason={}",
                    child,
                    rows.len(),
                    reason
                );
                let _ = reply.send(Err(LayerError::Rejected {
                    layer: child,
                    reason,
                }));
                return;
            }
        }

        for row in rows {
            self.rows.insert(row.object_id, row.restaurant);
            self.unsaved.push(row.object_id);
        }
        let _ = reply.send(Ok(()));

        if let Some(wiring) = wiring {
            self.run_cascade(child, wiring).await;
        }
    }

    /// Validation -> working -> persistent. Each stage runs whatever the
    /// previous one did.
    async fn run_cascade(&mut self, trigger: LayerId, wiring: CascadeWiring) {
        let mut ticket = CascadeTicket::begin(Arc::clone(&self.context), trigger);

        let outcome = stage_outcome(self.save_into_parent().await);
        ticket.record(CascadeStage::Validation, outcome);

        if let Err(mut ticket) = wiring
            .working
            .cascade_save(ticket, wiring.store.clone())
            .await
        {
            ticket.record(
                CascadeStage::Working,
                StageOutcome::Failed {
                    error: LayerError::Closed {
                        layer: wiring.working.id(),
                    }
                    .to_string(),
                },
            );
            wiring.store.persist_or_fail(ticket);
        }
    }

    /// Working-lane half of a cascade: commit, then post the disk write
    /// without waiting for it. The disk write runs even if the commit failed;
    /// it then flushes whatever earlier cascades left pending.
    async fn cascade_save(
        &mut self,
        mut ticket: CascadeTicket,
        store: StoreHandle,
        reply: oneshot::Sender<()>,
    ) {
        let outcome = stage_outcome(self.save_into_parent().await);
        ticket.record(CascadeStage::Working, outcome);
        store.persist_or_fail(ticket);
        let _ = reply.send(());
    }
}

fn stage_outcome(result: Result<SaveSummary, LayerError>) -> StageOutcome {
    match result {
        Ok(summary) => StageOutcome::Saved {
            rows: summary.inserted,
        },
        Err(err) => StageOutcome::Failed {
            error: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{CascadeWiring, Layer, LayerError, ParentLink};
    use crate::model::restaurant::Restaurant;
    use crate::store::context::StoreContext;
    use crate::store::events::{CascadeReport, LayerId, LayerRole, StageOutcome, StoreEvent};
    use crate::store::persistent::StoreHandle;
    use crate::store::validator::NoopValidator;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};

    /// A layer handle whose lane is already gone.
    fn closed_layer(context: &Arc<StoreContext>) -> Layer {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        Layer {
            id: context.allocate_layer_id(),
            role: LayerRole::Working,
            parent: LayerId(0),
            sender,
            context: Arc::clone(context),
        }
    }

    fn validation_layer(
        context: &Arc<StoreContext>,
        working: Layer,
        store: StoreHandle,
    ) -> Layer {
        Layer::spawn(
            LayerRole::Validation,
            ParentLink::Layer(working.clone()),
            Arc::clone(context),
            Some(CascadeWiring {
                working,
                store,
                validator: Arc::new(NoopValidator),
            }),
            Vec::new(),
        )
    }

    async fn next_report(events: &mut broadcast::Receiver<StoreEvent>) -> CascadeReport {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(StoreEvent::CascadeFinished(report)) = events.recv().await {
                    return report;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn validation_stage_failure_still_runs_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let context = StoreContext::new();
        let (store, _) = StoreHandle::start(dir.path().join("feast.sqlite"), Arc::clone(&context))
            .await
            .unwrap();
        let working = closed_layer(&context);
        let validation = validation_layer(&context, working.clone(), store.clone());
        let mut events = context.subscribe();

        let child = validation.child();
        child.insert(Restaurant::new("r1", "Cafe A")).await.unwrap();
        child.save().await.unwrap();

        let report = next_report(&mut events).await;
        let closed = LayerError::Closed { layer: working.id() }.to_string();
        assert_eq!(report.validation, StageOutcome::Failed { error: closed.clone() });
        assert_eq!(report.working, StageOutcome::Failed { error: closed });
        assert_eq!(report.persistent, StageOutcome::Saved { rows: 0 });
        assert_eq!(context.background().active(), 0);
        assert_eq!(validation.unsaved_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn working_stage_failure_still_reaches_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let context = StoreContext::new();
        let (store, _) = StoreHandle::start(dir.path().join("feast.sqlite"), Arc::clone(&context))
            .await
            .unwrap();
        let unreachable = closed_layer(&context);
        let working = Layer::spawn(
            LayerRole::Working,
            ParentLink::Layer(unreachable.clone()),
            Arc::clone(&context),
            None,
            Vec::new(),
        );
        let validation = validation_layer(&context, working.clone(), store.clone());
        let mut events = context.subscribe();

        let child = validation.child();
        child.insert(Restaurant::new("r1", "Cafe A")).await.unwrap();
        child.save().await.unwrap();

        let report = next_report(&mut events).await;
        assert_eq!(report.validation, StageOutcome::Saved { rows: 1 });
        assert_eq!(
            report.working,
            StageOutcome::Failed {
                error: LayerError::Closed {
                    layer: unreachable.id()
                }
                .to_string()
            }
        );
        assert_eq!(report.persistent, StageOutcome::Saved { rows: 0 });
        assert_eq!(context.background().active(), 0);
        assert_eq!(working.unsaved_count().await.unwrap(), 1);
        assert!(store.snapshot().await.unwrap().is_empty());
    }
}
