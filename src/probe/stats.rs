//! Latency distribution statistics for probe runs.
//!
//! Percentiles are nearest-rank on the ascending-sorted sample, indexed by
//! `floor(len × percentile)`, with no interpolation. The median uses the
//! same rule at p = 0.5.

use serde::Serialize;

/// Aggregated outcome of a set of measurements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub successes: usize,
    pub failures: usize,
    /// Absent when no measurement succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyDistribution {
    pub avg_ms: f64,
    pub median_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Summarize successful-request latencies plus a failure count.
pub fn summarize(mut success_latencies: Vec<u64>, failures: usize) -> LatencySummary {
    success_latencies.sort_unstable();
    let successes = success_latencies.len();
    let latency = if success_latencies.is_empty() {
        None
    } else {
        let sum: u64 = success_latencies.iter().sum();
        Some(LatencyDistribution {
            avg_ms: sum as f64 / successes as f64,
            median_ms: nearest_rank(&success_latencies, 0.5),
            min_ms: success_latencies[0],
            max_ms: success_latencies[successes - 1],
            p90_ms: nearest_rank(&success_latencies, 0.90),
            p95_ms: nearest_rank(&success_latencies, 0.95),
            p99_ms: nearest_rank(&success_latencies, 0.99),
        })
    };
    LatencySummary {
        count: successes + failures,
        successes,
        failures,
        latency,
    }
}

fn nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
    let idx = ((sorted.len() as f64) * percentile).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
