//! Ticket carried through the three cascade stages.
//!
//! # Invariants
//! - The background token is held from `begin` until the ticket completes.
//! - A ticket always completes exactly once: explicitly via `finish`, or on
//!   drop, in which case stages that never ran are reported as failed.
//! - Every failed stage produces an `error` log line.

use crate::store::background::BackgroundTask;
use crate::store::context::StoreContext;
use crate::store::events::{CascadeReport, CascadeStage, LayerId, StageOutcome, StoreEvent};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;

pub(crate) const SAVE_TASK_NAME: &str = "Save Database Task";

pub(crate) struct CascadeTicket {
    report: CascadeReport,
    task: Option<BackgroundTask>,
    context: Arc<StoreContext>,
    started_at: Instant,
    finished: bool,
}

impl CascadeTicket {
    pub(crate) fn begin(context: Arc<StoreContext>, trigger: LayerId) -> Self {
        let task = context.background().begin(SAVE_TASK_NAME);
        let report = CascadeReport::new(context.allocate_cascade_id(), trigger);
        info!(
            "event=save_cascade module=store status=start cascade_id={} trigger={}",
            report.cascade_id, trigger
        );
        Self {
            report,
            task: Some(task),
            context,
            started_at: Instant::now(),
            finished: false,
        }
    }

    pub(crate) fn record(&mut self, stage: CascadeStage, outcome: StageOutcome) {
        match &outcome {
            StageOutcome::Failed { error } => error!(
                "event=save_cascade_stage module=store status=error cascade_id={} stage={} error={}",
                self.report.cascade_id,
                stage.as_str(),
                error
            ),
            StageOutcome::Saved { rows } => debug!(
                "event=save_cascade_stage module=store status=ok cascade_id={} stage={} rows={}",
                self.report.cascade_id,
                stage.as_str(),
                rows
            ),
            StageOutcome::Pending => {}
        }
        self.report.set_stage(stage, outcome);
    }

    pub(crate) fn finish(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        for stage in [
            CascadeStage::Validation,
            CascadeStage::Working,
            CascadeStage::Persistent,
        ] {
            if *self.report.stage(stage) == StageOutcome::Pending {
                self.record(
                    stage,
                    StageOutcome::Failed {
                        error: "cascade abandoned before this stage ran".to_string(),
                    },
                );
            }
        }

        // Token goes first so observers of the event see it released.
        self.task.take();

        let status = if self.report.is_clean() { "ok" } else { "error" };
        info!(
            "event=save_cascade module=store status={} cascade_id={} trigger={} duration_ms={}",
            status,
            self.report.cascade_id,
            self.report.trigger,
            self.started_at.elapsed().as_millis()
        );
        self.context
            .publish(StoreEvent::CascadeFinished(self.report.clone()));
    }
}

impl Drop for CascadeTicket {
    fn drop(&mut self) {
        self.complete();
    }
}
