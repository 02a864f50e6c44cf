//! Layer hierarchy and save cascade.
//!
//! # Responsibility
//! - Run the validation, working and persistent layers as serial lanes.
//! - Hand out ephemeral layers for background work.
//! - Propagate commits upward in three fixed stages.
//!
//! # Invariants
//! - Only the persistent lane touches the store file.
//! - A cascade starts only when a direct child of the validation layer
//!   commits, and holds a background token until its disk stage ends.
//! - Stage failures are logged and never stop the following stages.

pub mod background;
mod cascade;
mod context;
pub mod events;
pub mod layer;
pub mod manager;
pub mod persistent;
pub mod validator;

pub use background::{BackgroundTask, BackgroundTasks};
pub use events::{CascadeReport, CascadeStage, LayerId, LayerRole, StageOutcome, StoreEvent};
pub use layer::{Layer, LayerError, SaveSummary};
pub use manager::{DatabaseManager, StoreOptions, WorkingLayer, DEFAULT_STORE_NAME};
pub use persistent::StoreStartError;
pub use validator::{NoopValidator, SaveValidator};
