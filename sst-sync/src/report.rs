//! Per-operation result reports

use serde::{Serialize, Serializer};
use sst_core::{SstError, SstResult, TransferOutcome};
use std::fmt;
use std::time::Duration;

/// Ordered outcomes of one operation, created fresh per call.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    outcomes: Vec<TransferOutcome>,
    duration: Duration,
}

impl SyncReport {
    pub fn new(outcomes: Vec<TransferOutcome>, duration: Duration) -> Self {
        Self { outcomes, duration }
    }

    pub fn outcomes(&self) -> &[TransferOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<TransferOutcome> {
        self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True when no outcome failed
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    /// Bytes of the records that succeeded
    pub fn bytes_transferred(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.file.size_bytes)
            .sum()
    }

    /// Relative names of failed records, for a retry filter.
    pub fn failed_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.file.relative_name.clone())
            .collect()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `<identifier> <status>` per outcome
    pub fn lines(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| format!("{} {}", o.file.backend_identifier, o.status))
            .collect()
    }

    pub fn to_json(&self) -> SstResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SstError::Other(e.to_string()))
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    succeeded: usize,
    failed: usize,
    bytes_transferred: u64,
    duration_ms: f64,
    outcomes: &'a [TransferOutcome],
}

impl Serialize for SyncReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ReportDocument {
            succeeded: self.succeeded(),
            failed: self.failed(),
            bytes_transferred: self.bytes_transferred(),
            duration_ms: self.duration.as_secs_f64() * 1000.0,
            outcomes: &self.outcomes,
        }
        .serialize(serializer)
    }
}
