//! Run metrics, the trajectory time series and the per-run result.
//!
//! A snapshot is taken after every inference call and again right after
//! every compression, so plotting buffer length against step shows the
//! sawtooth the focus strategy produces. The exported
//! [`TrajectoryRecord`] list is the one serialized shape callers can rely
//! on across versions.

use serde::{Deserialize, Serialize, Serializer};
use std::time::Instant;

// ── Trajectory ─────────────────────────────────────────────────────

/// What triggered a snapshot.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Inference,
    Compression,
}

/// One point of the trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub step: usize,
    pub buffer_len: usize,
    pub cumulative_tokens: u64,
    pub cumulative_compressions: usize,
    pub elapsed_secs: f64,
    pub kind: SnapshotKind,
}

/// Exported trajectory record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrajectoryRecord {
    pub step: usize,
    pub buffer_length: usize,
    pub cumulative_tokens: u64,
    pub cumulative_compressions: usize,
    pub elapsed_seconds: f64,
}

impl From<&Snapshot> for TrajectoryRecord {
    fn from(s: &Snapshot) -> Self {
        Self {
            step: s.step,
            buffer_length: s.buffer_len,
            cumulative_tokens: s.cumulative_tokens,
            cumulative_compressions: s.cumulative_compressions,
            elapsed_seconds: s.elapsed_secs,
        }
    }
}

/// Append-only sequence of snapshots.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    snapshots: Vec<Snapshot>,
}

impl Trajectory {
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots of the given kind.
    pub fn count(&self, kind: SnapshotKind) -> usize {
        self.snapshots.iter().filter(|s| s.kind == kind).count()
    }

    /// The records in order.
    pub fn export(&self) -> Vec<TrajectoryRecord> {
        self.snapshots.iter().map(TrajectoryRecord::from).collect()
    }

    fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }
}

impl Serialize for Trajectory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.export().serialize(serializer)
    }
}

// ── RunMetrics ─────────────────────────────────────────────────────

/// Counters for one run.
#[derive(Serialize, Clone, Debug, Default)]
pub struct RunMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub inference_calls: usize,
    pub action_calls: usize,
    pub compressions: usize,
    pub turns_discarded: usize,
    pub wall_clock_secs: f64,
    /// Ledger size at run end.
    pub knowledge_entries: usize,
    /// Focus stack depth at run end.
    pub active_focuses: usize,
    pub final_buffer_len: usize,
    pub estimated_cost_usd: f64,
    pub trajectory: Trajectory,
}

impl RunMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Samples the trajectory, measuring elapsed time from its creation.
#[derive(Debug)]
pub struct TrajectoryRecorder {
    started: Instant,
}

impl TrajectoryRecorder {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Append a snapshot built from the current counters.
    pub fn sample(
        &self,
        metrics: &mut RunMetrics,
        step: usize,
        buffer_len: usize,
        kind: SnapshotKind,
    ) {
        let snapshot = Snapshot {
            step,
            buffer_len,
            cumulative_tokens: metrics.total_tokens(),
            cumulative_compressions: metrics.compressions,
            elapsed_secs: self.elapsed_secs(),
            kind,
        };
        metrics.trajectory.push(snapshot);
    }
}

// ── RunResult ──────────────────────────────────────────────────────

/// How a run ended.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    StepLimitExceeded,
    ProviderFailed,
    TimedOut,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::StepLimitExceeded => "step_limit_exceeded",
            RunOutcome::ProviderFailed => "provider_failed",
            RunOutcome::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a run reports back. Every run produces one, whatever happened.
#[derive(Serialize, Clone, Debug)]
pub struct RunResult {
    pub success: bool,
    pub final_text: String,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trace_id: String,
    pub metrics: RunMetrics,
}
