//! Sequential per-window fetching for one dataset and query mode.

use log::debug;
use serde_json::Value;

use super::upstream::{UpstreamCallError, UpstreamCredential, WellnessUpstream};
use super::window_planner::{QueryMode, SyncRange, SyncWindow};
use crate::health::DatasetKey;

/// The window that aborted a mode pass and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFailure {
    pub window: SyncWindow,
    /// Zero-based position of the failed window in the plan.
    pub window_index: usize,
    pub error: UpstreamCallError,
}

/// Rows from every window of a completed mode pass, in window order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeFetch {
    pub rows: Vec<Value>,
    pub windows_fetched: usize,
}

/// Fetches `range` window by window in `mode`.
///
/// Windows run strictly in order. The first failing window aborts the pass;
/// later windows are not attempted.
pub async fn fetch_range(
    upstream: &dyn WellnessUpstream,
    credential: &UpstreamCredential,
    dataset: DatasetKey,
    range: SyncRange,
    max_window_seconds: i64,
    mode: QueryMode,
) -> Result<ModeFetch, WindowFailure> {
    let windows = range.windows(max_window_seconds, mode);
    let mut rows = Vec::new();

    for (window_index, window) in windows.iter().enumerate() {
        match upstream.fetch_window(credential, dataset, window).await {
            Ok(batch) => {
                debug!(
                    "[WellnessSync] {} {:?} window {}/{} [{}, {}] returned {} rows",
                    dataset,
                    mode,
                    window_index + 1,
                    windows.len(),
                    window.start_epoch_seconds,
                    window.end_epoch_seconds,
                    batch.len()
                );
                rows.extend(batch);
            }
            Err(error) => {
                return Err(WindowFailure {
                    window: *window,
                    window_index,
                    error,
                });
            }
        }
    }

    Ok(ModeFetch {
        rows,
        windows_fetched: windows.len(),
    })
}
