//! Stop-loss risk journal: one JSON record per market, persisted to disk, gating buys
//! for a cooldown period after a stop-loss trips. Grounded on
//! `original_source/trading_bot/trading.py`'s stop-loss block (the `positions/{market}.json`
//! read/write and `sleep_till` comparison).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecord {
    pub time: DateTime<Utc>,
    pub question: String,
    pub msg: String,
    pub sleep_till: DateTime<Utc>,
}

/// Reads and writes one risk-journal file per market under `dir`. Not a cache: every
/// read goes to disk, matching the source's own per-pass file read (a stop-loss trip is
/// rare enough that this costs nothing against the per-market pass cadence).
pub struct RiskJournal {
    dir: PathBuf,
}

impl RiskJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RiskJournal { dir: dir.into() }
    }

    fn path_for(&self, market: &str) -> PathBuf {
        self.dir.join(format!("{market}.json"))
    }

    /// Record a stop-loss trip, gating buys on this market until `sleep_till`.
    pub fn record_trip(&self, market: &str, question: &str, msg: &str, sleep_till: DateTime<Utc>) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("failed to create risk journal dir {}: {e}", self.dir.display()))?;
        let record = RiskRecord { time: Utc::now(), question: question.to_string(), msg: msg.to_string(), sleep_till };
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| format!("failed to serialize risk record for {market}: {e}"))?;
        std::fs::write(self.path_for(market), contents)
            .map_err(|e| format!("failed to write risk record for {market}: {e}"))
    }

    /// Whether buys on `market` are currently gated by a still-active stop-loss cooldown.
    /// A missing or unparseable file is treated as "not gated" — matching the source,
    /// which only ever reads a file it previously wrote.
    pub fn is_buy_gated(&self, market: &str, now: DateTime<Utc>) -> bool {
        match self.read(market) {
            Some(record) => now < record.sleep_till,
            None => false,
        }
    }

    fn read(&self, market: &str) -> Option<RiskRecord> {
        let path = self.path_for(market);
        if !Path::new(&path).exists() {
            return None;
        }
        let contents = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn temp_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("poly-maker-risk-test-{name}-{}", std::process::id()));
        dir
    }

    /// Scenario: a stop-loss trip was just recorded with a 90-minute cooldown.
    /// Expected: buys are reported as gated immediately after.
    #[test]
    fn test_record_trip_gates_buys_until_sleep_till() {
        let dir = temp_dir("trip");
        let journal = RiskJournal::new(&dir);
        let now = Utc::now();
        journal
            .record_trip("market-1", "Will it happen?", "stop loss tripped", now + ChronoDuration::minutes(90))
            .unwrap();
        assert!(journal.is_buy_gated("market-1", now));
        std::fs::remove_dir_all(&dir).ok();
    }

    /// Scenario: the cooldown window has already elapsed.
    /// Expected: buys are no longer gated.
    #[test]
    fn test_is_buy_gated_false_after_cooldown_elapses() {
        let dir = temp_dir("elapsed");
        let journal = RiskJournal::new(&dir);
        let tripped_at = Utc::now() - ChronoDuration::minutes(91);
        journal
            .record_trip("market-2", "Will it happen?", "stop loss tripped", tripped_at + ChronoDuration::minutes(90))
            .unwrap();
        assert!(!journal.is_buy_gated("market-2", Utc::now()));
        std::fs::remove_dir_all(&dir).ok();
    }

    /// Scenario: a market with no journal entry at all.
    /// Expected: buys are not gated.
    #[test]
    fn test_is_buy_gated_false_when_no_record_exists() {
        let dir = temp_dir("none");
        let journal = RiskJournal::new(&dir);
        assert!(!journal.is_buy_gated("market-3", Utc::now()));
    }
}
