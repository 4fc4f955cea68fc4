use crate::error::WindowError;
use chrono::{Days, NaiveDateTime};
use connectors::sql::source::SourceReader;
use tracing::info;

/// A bounded time range `[start, end]` of days a table sync must cover. The
/// end bound is fixed once when the window is computed, so a sync never
/// chases a source that keeps growing underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

pub fn truncate_to_day(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(0, 0, 0).expect("midnight is valid")
}

/// Computes the outstanding window from a checkpoint and the source table's
/// timestamp bounds. `None` means nothing to do, which is not an error:
/// either the source is empty, or the checkpoint is already past the
/// source's latest day (re-run, or clock skew).
pub fn compute_window(
    checkpoint: Option<NaiveDateTime>,
    bounds: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Option<SyncWindow> {
    let (min, max) = bounds?;
    let start = checkpoint.unwrap_or_else(|| truncate_to_day(min));
    let end = truncate_to_day(max);

    if end < start {
        return None;
    }
    Some(SyncWindow { start, end })
}

/// Day-sized sub-ranges `[day, day+1)` covering every day in the window
/// exactly once, in chronological order.
pub fn day_partitions(window: &SyncWindow) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut partitions = Vec::new();
    let mut day = truncate_to_day(window.start);
    let end_day = truncate_to_day(window.end);

    while day <= end_day {
        let next = day + Days::new(1);
        partitions.push((day, next));
        day = next;
    }
    partitions
}

/// Resolves the outstanding window for a windowed table source.
pub struct WindowManager;

impl WindowManager {
    pub async fn outstanding_window(
        source: &dyn SourceReader,
        table: &str,
        window_field: &str,
        checkpoint: Option<NaiveDateTime>,
    ) -> Result<Option<SyncWindow>, WindowError> {
        let bounds = source.timestamp_bounds(table, window_field).await?;
        let window = compute_window(checkpoint, bounds);

        match (&window, checkpoint) {
            (Some(w), None) => info!(
                table,
                start = %w.start,
                end = %w.end,
                "no checkpoint found, backfilling since the beginning of collection"
            ),
            (Some(w), Some(_)) => info!(table, start = %w.start, end = %w.end, "resuming window"),
            (None, _) => info!(table, "table is up to date"),
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, d)
            .unwrap()
            .and_hms_opt(h, 15, 0)
            .unwrap()
    }

    #[test]
    fn empty_source_has_no_window() {
        assert_eq!(compute_window(None, None), None);
    }

    #[test]
    fn backfill_spans_source_bounds() {
        let window = compute_window(None, Some((ts(3, 9), ts(7, 18)))).unwrap();
        assert_eq!(window.start, truncate_to_day(ts(3, 9)));
        assert_eq!(window.end, truncate_to_day(ts(7, 18)));
    }

    #[test]
    fn checkpoint_past_source_max_yields_none() {
        // T1 < T0: already synced (or clock skew). Not an error.
        let checkpoint = truncate_to_day(ts(9, 0));
        assert_eq!(compute_window(Some(checkpoint), Some((ts(1, 0), ts(7, 0)))), None);
    }

    #[test]
    fn checkpoint_resumes_from_last_pass() {
        let checkpoint = truncate_to_day(ts(5, 0));
        let window = compute_window(Some(checkpoint), Some((ts(1, 0), ts(7, 23)))).unwrap();
        assert_eq!(window.start, checkpoint);
        assert_eq!(window.end, truncate_to_day(ts(7, 0)));
    }

    #[test]
    fn day_partitions_cover_every_day_once() {
        let window = SyncWindow {
            start: ts(3, 11),
            end: ts(6, 2),
        };
        let partitions = day_partitions(&window);

        assert_eq!(partitions.len(), 4);
        for pair in partitions.windows(2) {
            // contiguity: each sub-range ends where the next begins
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(partitions[0].0, truncate_to_day(window.start));
        assert_eq!(partitions.last().unwrap().1, truncate_to_day(window.end) + Days::new(1));
    }

    #[test]
    fn single_day_window_has_one_partition() {
        let window = SyncWindow {
            start: truncate_to_day(ts(3, 0)),
            end: truncate_to_day(ts(3, 0)),
        };
        assert_eq!(day_partitions(&window).len(), 1);
    }
}
