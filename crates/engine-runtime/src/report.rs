use chrono::NaiveDateTime;
use model::counters::TaskCounters;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub table: String,
    pub counters: TaskCounters,
    #[serde(skip)]
    pub duration: Duration,
    pub error: Option<String>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything the run did, assembled by the orchestrator and summarized at
/// the end. One entry per task, failures included.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.tasks.iter().any(|t| !t.succeeded())
    }

    pub fn totals(&self) -> TaskCounters {
        self.tasks
            .iter()
            .fold(TaskCounters::default(), |acc, t| acc.merge(t.counters))
    }

    pub fn log_summary(&self) {
        for task in &self.tasks {
            match &task.error {
                None => info!(
                    task = %task.name,
                    table = %task.table,
                    rows_read = task.counters.rows_read,
                    added = task.counters.rows_added,
                    updated = task.counters.rows_updated,
                    skipped = task.counters.duplicates_skipped,
                    deferred = task.counters.batches_deferred,
                    elapsed_secs = task.duration.as_secs_f64(),
                    "task finished"
                ),
                Some(reason) => error!(
                    task = %task.name,
                    table = %task.table,
                    elapsed_secs = task.duration.as_secs_f64(),
                    %reason,
                    "task failed"
                ),
            }
        }
        let totals = self.totals();
        info!(
            tasks = self.tasks.len(),
            failed = self.tasks.iter().filter(|t| !t.succeeded()).count(),
            rows_read = totals.rows_read,
            added = totals.rows_added,
            updated = totals.rows_updated,
            deferred = totals.batches_deferred,
            "run complete"
        );
    }
}
