//! Per-market coalescing single-flight scheduler: never runs two trading passes for the
//! same market concurrently, and skips a pass entirely while that market has an order
//! awaiting exchange confirmation. Grounded on
//! `original_source/trading_bot/task_scheduler.py`'s `TaskScheduler`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::state::EngineState;

/// The OpenTelemetry counters/histograms the source wraps this in are telemetry
/// export, out of scope here; this keeps only the control flow.
pub struct TaskScheduler {
    inflight: Arc<Mutex<HashSet<String>>>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        TaskScheduler { inflight: Arc::new(Mutex::new(HashSet::new())) }
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` for `market` unless a pass is already running for it (fast-path,
    /// no lock contention on the common "busy" case) or it has an order in flight at the
    /// exchange (checked once the fast path clears, matching the source's
    /// `async with self._lock` section). `task` errors are logged, not propagated —
    /// a failed pass for one market must never take down the scheduler.
    pub fn schedule<F, Fut>(&self, market: &str, state: &Arc<EngineState>, task: F)
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        if self.inflight.lock().unwrap().contains(market) {
            return;
        }

        {
            let mut guard = self.inflight.lock().unwrap();
            if guard.contains(market) {
                return;
            }
            if state.has_in_flight(market) {
                return;
            }
            guard.insert(market.to_string());
        }

        let inflight = Arc::clone(&self.inflight);
        let market_owned = market.to_string();
        tokio::spawn(async move {
            let result = task(market_owned.clone()).await;
            if let Err(e) = result {
                eprintln!("[SCHEDULER] task for market {market_owned} failed: {e}");
            }
            inflight.lock().unwrap().remove(&market_owned);
        });
    }

    #[cfg(test)]
    fn is_inflight(&self, market: &str) -> bool {
        self.inflight.lock().unwrap().contains(market)
    }
}
