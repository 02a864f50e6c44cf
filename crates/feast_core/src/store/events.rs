//! Layer identities, save notifications and cascade reports.

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Identity of one layer within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LayerId(pub u64);

impl Display for LayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// Position of a layer in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    Validation,
    Working,
    Persistent,
    Ephemeral,
}

impl LayerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Working => "working",
            Self::Persistent => "persistent",
            Self::Ephemeral => "ephemeral",
        }
    }
}

/// One of the three fixed cascade stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStage {
    Validation,
    Working,
    Persistent,
}

impl CascadeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Working => "working",
            Self::Persistent => "persistent",
        }
    }
}

/// Result of one cascade stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Pending,
    Saved { rows: usize },
    Failed { error: String },
}

impl StageOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Stage-by-stage record of one save cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub cascade_id: u64,
    /// The direct child of the validation layer whose commit started this cascade.
    pub trigger: LayerId,
    pub validation: StageOutcome,
    pub working: StageOutcome,
    pub persistent: StageOutcome,
}

impl CascadeReport {
    pub fn new(cascade_id: u64, trigger: LayerId) -> Self {
        Self {
            cascade_id,
            trigger,
            validation: StageOutcome::Pending,
            working: StageOutcome::Pending,
            persistent: StageOutcome::Pending,
        }
    }

    pub fn stage(&self, stage: CascadeStage) -> &StageOutcome {
        match stage {
            CascadeStage::Validation => &self.validation,
            CascadeStage::Working => &self.working,
            CascadeStage::Persistent => &self.persistent,
        }
    }

    pub fn set_stage(&mut self, stage: CascadeStage, outcome: StageOutcome) {
        match stage {
            CascadeStage::Validation => self.validation = outcome,
            CascadeStage::Working => self.working = outcome,
            CascadeStage::Persistent => self.persistent = outcome,
        }
    }

    /// True when every stage committed.
    pub fn is_clean(&self) -> bool {
        self.validation.is_saved() && self.working.is_saved() && self.persistent.is_saved()
    }
}

/// Notifications published by layers on the manager's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    WillSave {
        layer: LayerId,
        role: LayerRole,
    },
    DidSave {
        layer: LayerId,
        parent: LayerId,
        inserted: usize,
    },
    CascadeFinished(CascadeReport),
}
