//! Outcome aggregation and run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::Strategy;
use crate::types::{OutcomeKind, WorkItem};

/// Counter of outcome kinds
///
/// Folding is commutative, so the final counts do not depend on completion
/// order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    counts: BTreeMap<OutcomeKind, usize>,
}

impl Tally {
    /// Empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome
    pub fn record(&mut self, kind: OutcomeKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    /// Count for one kind
    pub fn get(&self, kind: OutcomeKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Sum over every kind
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl FromIterator<OutcomeKind> for Tally {
    fn from_iter<I: IntoIterator<Item = OutcomeKind>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for kind in iter {
            tally.record(kind);
        }
        tally
    }
}

/// Aggregate result of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Outcome counts
    pub tally: Tally,
    /// Distinct items in the run
    pub total: usize,
    /// Items that never produced an outcome (non-empty only when aborted)
    pub not_completed: Vec<WorkItem>,
    /// Whether the run was cancelled or failed before finishing
    pub aborted: bool,
    /// Strategy used
    pub strategy: Strategy,
    /// Effective concurrency
    pub concurrency: usize,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration
    #[serde(with = "secs_f64")]
    pub elapsed: Duration,
}

impl RunReport {
    /// Successful items
    pub fn success(&self) -> usize {
        self.tally.get(OutcomeKind::Success)
    }

    /// Not-found items
    pub fn not_found(&self) -> usize {
        self.tally.get(OutcomeKind::NotFound)
    }

    /// Failed items
    pub fn errors(&self) -> usize {
        self.tally.get(OutcomeKind::Error)
    }

    /// Items that produced an outcome
    pub fn completed(&self) -> usize {
        self.tally.total()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", "-".repeat(20))?;
        let ok = self.success();
        writeln!(f, "{ok} flag{} downloaded.", plural(ok))?;
        if self.not_found() > 0 {
            writeln!(f, "{} not found.", self.not_found())?;
        }
        if self.errors() > 0 {
            writeln!(f, "{} error{}.", self.errors(), plural(self.errors()))?;
        }
        if self.aborted {
            let n = self.not_completed.len();
            writeln!(f, "Run aborted: {n} item{} not completed.", plural(n))?;
        }
        write!(f, "Elapsed time: {:.2}s", self.elapsed.as_secs_f64())
    }
}

/// Lines printed before a run starts
pub fn initial_report(
    server_label: &str,
    base_url: &str,
    items: &[WorkItem],
    concurrency: usize,
) -> String {
    let mut lines = vec![format!("{server_label} site: {base_url}")];
    let n = items.len();
    match (items.first(), items.last()) {
        (Some(first), Some(last)) if n > 1 => {
            lines.push(format!("Searching for {n} flags: from {first} to {last}"))
        }
        (Some(only), _) => lines.push(format!("Searching for 1 flag: {only}")),
        _ => lines.push("Searching for 0 flags".to_string()),
    }
    lines.push(format!(
        "{concurrency} concurrent connection{} will be used.",
        plural(concurrency)
    ));
    lines.join("\n")
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

// Fractional-seconds Duration serialization helper
mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn report(kinds: &[OutcomeKind], not_completed: &[&str], aborted: bool) -> RunReport {
        RunReport {
            tally: kinds.iter().copied().collect(),
            total: kinds.len() + not_completed.len(),
            not_completed: not_completed.iter().map(|s| WorkItem::new(*s)).collect(),
            aborted,
            strategy: Strategy::Cooperative,
            concurrency: 3,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn tally_is_order_independent() {
        use OutcomeKind::*;
        let a: Tally = [Success, Error, NotFound, Success].into_iter().collect();
        let b: Tally = [NotFound, Success, Success, Error].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.get(Success), 2);
        assert_eq!(a.total(), 4);
    }

    #[test]
    fn empty_tally_reads_zero() {
        let tally = Tally::new();
        for kind in OutcomeKind::ALL {
            assert_eq!(tally.get(kind), 0);
        }
    }

    #[test]
    fn final_report_lists_only_present_kinds() {
        let text = report(&[OutcomeKind::Success], &[], false).to_string();
        assert_eq!(
            text,
            "--------------------\n1 flag downloaded.\nElapsed time: 1.50s"
        );
    }

    #[test]
    fn final_report_pluralizes_and_marks_aborts() {
        use OutcomeKind::*;
        let text = report(&[Success, Success, NotFound, Error, Error], &["ZZ"], true).to_string();
        assert!(text.contains("2 flags downloaded."));
        assert!(text.contains("1 not found."));
        assert!(text.contains("2 errors."));
        assert!(text.contains("Run aborted: 1 item not completed."));
    }

    #[test]
    fn initial_report_shows_range_and_concurrency() {
        let items: Vec<_> = ["BA", "BB", "BZ"].into_iter().map(WorkItem::new).collect();
        let text = initial_report("DELAY", "http://localhost:8002/flags", &items, 1);
        assert_eq!(
            text,
            "DELAY site: http://localhost:8002/flags\n\
             Searching for 3 flags: from BA to BZ\n\
             1 concurrent connection will be used."
        );
    }

    #[test]
    fn initial_report_for_single_item() {
        let items = vec![WorkItem::new("BR")];
        let text = initial_report("LOCAL", "http://x", &items, 1);
        assert!(text.contains("Searching for 1 flag: BR"));
    }

    #[test]
    fn report_serializes_elapsed_as_fractional_seconds() {
        let json = serde_json::to_value(report(&[OutcomeKind::Success], &[], false)).unwrap();
        assert_eq!(json["elapsed"], 1.5);
        assert_eq!(json["tally"]["counts"]["success"], 1);
    }
}
