//! # Run Metrics
//!
//! Every pipeline run produces a [`RunMetrics`] record: elapsed time, the
//! stage it reached, the SQL, row count, and LLM token usage. A service can
//! keep a [`MetricsLog`] of recent runs and summarise it on demand.

use std::collections::VecDeque;
use std::ops::AddAssign;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::pipeline::Stage;

/// Runs kept by a [`MetricsLog`]; older runs are dropped first.
pub const MAX_RECORDED_RUNS: usize = 1000;

/// Runs listed in a summary's `recent` field.
pub const RECENT_RUNS: usize = 5;

/// Token counts reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

fn as_secs<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64())
}

/// One finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub question: String,
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// `Formatted` on success, otherwise the stage that failed.
    pub stage: Stage,
    pub success: bool,
    pub sql: Option<String>,
    pub row_count: usize,
    pub tokens: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate over the runs in a [`MetricsLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_queries: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage, 0.0 to 100.0.
    pub success_rate: f64,
    #[serde(rename = "avg_duration_secs", serialize_with = "as_secs")]
    pub avg_duration: Duration,
    pub avg_tokens: u64,
    pub total_tokens: u64,
    /// The last few runs, oldest first.
    pub recent: Vec<RunMetrics>,
}

/// Bounded history of runs, shared by reference like the service that owns it.
#[derive(Debug, Default)]
pub struct MetricsLog {
    runs: Mutex<VecDeque<RunMetrics>>,
}

impl MetricsLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, VecDeque<RunMetrics>> {
        // Records are pushed whole, so a poisoned lock is still consistent
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, run: RunMetrics) {
        let mut runs = self.runs();
        if runs.len() == MAX_RECORDED_RUNS {
            runs.pop_front();
        }
        runs.push_back(run);
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs().is_empty()
    }

    pub fn clear(&self) {
        self.runs().clear();
    }

    /// `None` until the first run is recorded.
    pub fn summary(&self) -> Option<MetricsSummary> {
        let runs = self.runs();
        if runs.is_empty() {
            return None;
        }

        let total = runs.len();
        let successful = runs.iter().filter(|r| r.success).count();
        let total_elapsed: Duration = runs.iter().map(|r| r.elapsed).sum();
        let total_tokens: u64 = runs.iter().map(|r| r.tokens.total_tokens).sum();

        Some(MetricsSummary {
            total_queries: total,
            successful,
            failed: total - successful,
            success_rate: successful as f64 * 100.0 / total as f64,
            avg_duration: total_elapsed / total as u32,
            avg_tokens: total_tokens / total as u64,
            total_tokens,
            recent: runs.iter().skip(total.saturating_sub(RECENT_RUNS)).cloned().collect(),
        })
    }
}
