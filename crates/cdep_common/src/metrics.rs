//! Injectable timing metrics for the change-detection pipeline.
//!
//! Components receive a [`MetricsSink`] explicitly instead of writing to
//! process-wide counters, so concurrent builds and test runs never share
//! mutable state.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;

/// A timed phase of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Whole `process_source_files` analysis.
    Analysis,
    /// Hashing and parsing of a single file.
    Snapshot,
    /// Incremental compiler bookkeeping around the delegate compiler.
    CompileProcessing,
    /// Time spent inside the delegate compiler.
    CompileExecution,
}

impl Operation {
    const ALL: [Operation; 4] = [
        Operation::Analysis,
        Operation::Snapshot,
        Operation::CompileProcessing,
        Operation::CompileExecution,
    ];

    fn index(self) -> usize {
        match self {
            Operation::Analysis => 0,
            Operation::Snapshot => 1,
            Operation::CompileProcessing => 2,
            Operation::CompileExecution => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Analysis => "analysis",
            Operation::Snapshot => "snapshot",
            Operation::CompileProcessing => "compile processing",
            Operation::CompileExecution => "compile execution",
        };
        f.pad(name)
    }
}

/// Receives elapsed times for pipeline operations.
pub trait MetricsSink: Send + Sync {
    /// Records one occurrence of `op` that took `elapsed`.
    fn record(&self, op: Operation, elapsed: Duration);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _op: Operation, _elapsed: Duration) {}
}

/// Count and total duration for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationReport {
    /// Number of recorded occurrences.
    pub count: u64,
    /// Sum of all recorded durations.
    pub total: Duration,
}

impl OperationReport {
    /// Average duration, or `None` if nothing was recorded.
    pub fn average(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        u32::try_from(self.count).ok().map(|n| self.total / n)
    }
}

/// Thread-safe accumulator of per-operation counts and durations.
#[derive(Debug, Default)]
pub struct OperationStats {
    slots: Mutex<[OperationReport; 4]>,
}

impl OperationStats {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current figures for `op` without clearing them.
    pub fn get(&self, op: Operation) -> OperationReport {
        self.slots.lock()[op.index()]
    }

    /// Returns the figures for every operation and resets the accumulator.
    pub fn report_and_clear(&self) -> Vec<(Operation, OperationReport)> {
        let mut slots = self.slots.lock();
        let report = Operation::ALL
            .iter()
            .map(|op| (*op, slots[op.index()]))
            .collect();
        *slots = Default::default();
        report
    }
}

impl MetricsSink for OperationStats {
    fn record(&self, op: Operation, elapsed: Duration) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[op.index()];
        slot.count += 1;
        slot.total += elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_count_and_total() {
        let stats = OperationStats::new();
        stats.record(Operation::Analysis, Duration::from_millis(10));
        stats.record(Operation::Analysis, Duration::from_millis(30));
        let report = stats.get(Operation::Analysis);
        assert_eq!(report.count, 2);
        assert_eq!(report.total, Duration::from_millis(40));
        assert_eq!(report.average(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn report_and_clear_resets() {
        let stats = OperationStats::new();
        stats.record(Operation::Snapshot, Duration::from_millis(5));
        let report = stats.report_and_clear();
        assert_eq!(report.len(), 4);
        let snapshot = report.iter().find(|(op, _)| *op == Operation::Snapshot).unwrap();
        assert_eq!(snapshot.1.count, 1);
        assert_eq!(stats.get(Operation::Snapshot).count, 0);
    }

    #[test]
    fn empty_average_is_none() {
        assert!(OperationReport::default().average().is_none());
    }

    #[test]
    fn operations_are_independent() {
        let stats = OperationStats::new();
        stats.record(Operation::CompileExecution, Duration::from_millis(1));
        assert_eq!(stats.get(Operation::CompileProcessing).count, 0);
    }

    #[test]
    fn display_names() {
        assert_eq!(Operation::CompileProcessing.to_string(), "compile processing");
    }
}
