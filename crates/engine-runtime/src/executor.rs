use crate::{
    error::SyncError,
    report::{RunReport, TaskReport},
};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use connectors::sql::session::TargetStore;
use engine_core::window::truncate_to_day;
use engine_processing::handler::SourceHandler;
use model::{counters::TaskCounters, outcome::UpsertOutcome, task::SyncTask};
use std::time::Instant;
use tracing::{error, info, warn};

/// Builds one handler per task. The orchestrator never knows what kind of
/// source it is driving.
#[async_trait]
pub trait HandlerFactory: Send {
    async fn build(
        &mut self,
        task: &SyncTask,
        checkpoint: Option<NaiveDateTime>,
    ) -> Result<Box<dyn SourceHandler>, SyncError>;
}

/// Tasks in input order, grouped so that tasks sharing a source identity run
/// (and checkpoint) together. Tasks without an identity form groups of one.
fn group_by_identity(tasks: &[SyncTask]) -> Vec<(Option<String>, Vec<&SyncTask>)> {
    let mut groups: Vec<(Option<String>, Vec<&SyncTask>)> = Vec::new();
    for task in tasks {
        match &task.source_identity {
            Some(id) => {
                match groups
                    .iter_mut()
                    .find(|(key, _)| key.as_deref() == Some(id.as_str()))
                {
                    Some((_, members)) => members.push(task),
                    None => groups.push((Some(id.clone()), vec![task])),
                }
            }
            None => groups.push((None, vec![task])),
        }
    }
    groups
}

/// Drains one prepared task: stream, shape, commit, reconcile. Returns the
/// totals the task accumulated.
pub async fn drive_task(
    handler: &mut dyn SourceHandler,
    store: &mut dyn TargetStore,
) -> Result<TaskCounters, SyncError> {
    handler.prepare(store).await?;

    let mut counters = TaskCounters::default();
    while let Some((batch, stats)) = handler.next_batch().await? {
        counters.rows_read += stats.rows_read;
        counters.duplicates_skipped += stats.duplicates_skipped;

        let shaped = handler.format(batch);
        match handler.commit_batch(store, &shaped).await? {
            UpsertOutcome::Committed => counters.rows_added += shaped.len() as u64,
            UpsertOutcome::PartiallyCommitted { added, updated } => {
                counters.rows_added += added as u64;
                counters.rows_updated += updated as u64;
            }
            UpsertOutcome::Deferred { reason, .. } => {
                counters.batches_deferred += 1;
                warn!(table = %handler.table(), %reason, "batch deferred, continuing");
            }
        }
    }

    handler.post_operations(store).await?;
    Ok(counters)
}

/// Sequences every configured task against one target session. Strictly
/// sequential: one task at a time, one batch at a time.
pub struct Orchestrator;

impl Orchestrator {
    pub async fn run(
        factory: &mut dyn HandlerFactory,
        store: &mut dyn TargetStore,
        tasks: &[SyncTask],
    ) -> RunReport {
        let started_at = Utc::now().naive_utc();
        let mut reports = Vec::new();

        for (identity, group) in group_by_identity(tasks) {
            let checkpoint = match &identity {
                Some(id) => match store.load_checkpoint(id).await {
                    Ok(checkpoint) => checkpoint,
                    Err(err) => {
                        error!(identity = %id, error = %err, "could not read checkpoint, skipping group");
                        for task in &group {
                            reports.push(failed(task, &err.to_string(), Instant::now()));
                        }
                        continue;
                    }
                },
                None => None,
            };

            let pass_start = Utc::now().naive_utc();
            let mut all_ok = true;
            for task in &group {
                info!(task = %task.name, table = %task.table, "starting task");
                let clock = Instant::now();
                let outcome = Self::run_task(factory, store, task, checkpoint).await;
                match outcome {
                    Ok(counters) => reports.push(TaskReport {
                        name: task.name.clone(),
                        table: task.table.clone(),
                        counters,
                        duration: clock.elapsed(),
                        error: None,
                    }),
                    Err(err) => {
                        all_ok = false;
                        error!(task = %task.name, error = %err, "task aborted");
                        if let Err(rb) = store.rollback().await {
                            warn!(error = %rb, "rollback after task failure failed");
                        }
                        reports.push(failed(task, &err.to_string(), clock));
                    }
                }
            }

            if let Some(id) = &identity {
                if all_ok {
                    if let Err(err) = Self::advance_checkpoint(store, id, pass_start).await {
                        error!(identity = %id, error = %err, "failed to advance checkpoint");
                    }
                } else {
                    info!(identity = %id, "checkpoint not advanced, a table in the group failed");
                }
            }
        }

        RunReport {
            started_at,
            finished_at: Utc::now().naive_utc(),
            tasks: reports,
        }
    }

    async fn run_task(
        factory: &mut dyn HandlerFactory,
        store: &mut dyn TargetStore,
        task: &SyncTask,
        checkpoint: Option<NaiveDateTime>,
    ) -> Result<TaskCounters, SyncError> {
        let mut handler = factory.build(task, checkpoint).await?;
        drive_task(handler.as_mut(), store).await
    }

    /// The checkpoint records when this pass started, truncated to the day,
    /// so the next run re-covers the tail day rather than skipping it.
    async fn advance_checkpoint(
        store: &mut dyn TargetStore,
        identity: &str,
        pass_start: NaiveDateTime,
    ) -> Result<(), SyncError> {
        let mark = truncate_to_day(pass_start);
        store.save_checkpoint(identity, mark).await?;
        store.commit().await?;
        info!(identity, checkpoint = %mark, "checkpoint advanced");
        Ok(())
    }
}

fn failed(task: &SyncTask, reason: &str, clock: Instant) -> TaskReport {
    TaskReport {
        name: task.name.clone(),
        table: task.table.clone(),
        counters: TaskCounters::default(),
        duration: clock.elapsed(),
        error: Some(reason.to_string()),
    }
}
