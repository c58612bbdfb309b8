//! Splits a requested time range into bounded upstream query windows.

use serde::{Deserialize, Serialize};

/// Largest range the upstream accepts in one request.
pub const DEFAULT_MAX_WINDOW_SECS: i64 = 86_400;

const SECONDS_PER_DAY: i64 = 86_400;

/// Query-parameter convention a window is dispatched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// "upload" time-range parameters.
    Primary,
    /// "summary" time-range parameters used by the backfill endpoint.
    Fallback,
}

impl QueryMode {
    /// Source label reported to callers for rows fetched in this mode.
    pub fn source_label(&self) -> &'static str {
        match self {
            Self::Primary => "upload",
            Self::Fallback => "backfill",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWindow {
    pub start_epoch_seconds: i64,
    pub end_epoch_seconds: i64,
    pub mode: QueryMode,
}

impl SyncWindow {
    pub fn span_seconds(&self) -> i64 {
        self.end_epoch_seconds - self.start_epoch_seconds
    }
}

/// Requested `[start, end]` range in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRange {
    pub start_epoch_seconds: i64,
    pub end_epoch_seconds: i64,
}

impl SyncRange {
    pub fn new(start_epoch_seconds: i64, end_epoch_seconds: i64) -> Self {
        Self {
            start_epoch_seconds,
            end_epoch_seconds,
        }
    }

    /// Range ending at `now` and reaching back `days` whole days.
    pub fn last_days(now_epoch_seconds: i64, days: u32) -> Self {
        let start = now_epoch_seconds - i64::from(days) * SECONDS_PER_DAY;
        Self::new(start.max(0), now_epoch_seconds.max(0))
    }

    pub fn windows(&self, max_window_seconds: i64, mode: QueryMode) -> Vec<SyncWindow> {
        plan_windows(
            self.start_epoch_seconds,
            self.end_epoch_seconds,
            max_window_seconds,
            mode,
        )
    }
}

/// Plans contiguous windows covering `[start, end]`.
///
/// Every window spans at most `max_window_seconds`; window `i` ends where
/// window `i + 1` starts and the last window ends at `end`. `start == end`
/// yields a single instant window. Inverted ranges are treated as the
/// instant `start`, and a non-positive maximum as one second.
pub fn plan_windows(
    start: i64,
    end: i64,
    max_window_seconds: i64,
    mode: QueryMode,
) -> Vec<SyncWindow> {
    let max_window_seconds = max_window_seconds.max(1);
    let end = end.max(start);

    if start == end {
        return vec![SyncWindow {
            start_epoch_seconds: start,
            end_epoch_seconds: end,
            mode,
        }];
    }

    let mut windows = Vec::with_capacity(((end - start) / max_window_seconds + 1) as usize);
    let mut cursor = start;
    while cursor < end {
        let window_end = cursor.saturating_add(max_window_seconds).min(end);
        windows.push(SyncWindow {
            start_epoch_seconds: cursor,
            end_epoch_seconds: window_end,
            mode,
        });
        cursor = window_end;
    }
    windows
}
