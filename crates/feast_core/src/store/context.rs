//! State shared by every lane of one manager.

use crate::model::restaurant::ObjectId;
use crate::store::background::BackgroundTasks;
use crate::store::events::{LayerId, StoreEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) struct StoreContext {
    next_object_id: AtomicU64,
    next_layer_id: AtomicU64,
    next_cascade_id: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
    background: BackgroundTasks,
}

impl StoreContext {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            next_object_id: AtomicU64::new(1),
            next_layer_id: AtomicU64::new(1),
            next_cascade_id: AtomicU64::new(1),
            events,
            background: BackgroundTasks::new(),
        })
    }

    pub(crate) fn allocate_object_id(&self) -> ObjectId {
        ObjectId(self.next_object_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Ensures future object ids are greater than `used`.
    pub(crate) fn reserve_object_ids_through(&self, used: ObjectId) {
        self.next_object_id
            .fetch_max(used.0.saturating_add(1), Ordering::Relaxed);
    }

    pub(crate) fn allocate_layer_id(&self) -> LayerId {
        LayerId(self.next_layer_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn allocate_cascade_id(&self) -> u64 {
        self.next_cascade_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Publishes an event; having no subscribers is not an error.
    pub(crate) fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub(crate) fn background(&self) -> &BackgroundTasks {
        &self.background
    }
}
