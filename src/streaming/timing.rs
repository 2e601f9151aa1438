//! Latency instrumentation for one relay operation.
//!
//! A `TimingState` is created when the operation starts and is owned
//! exclusively by its pump task. Time-to-first-token is recorded exactly
//! once, on the first non-empty fragment in event order; empty fragments and
//! control lines never touch it. All elapsed times are whole milliseconds
//! from a monotonic clock, with no smoothing within an operation.

use std::time::{Duration, Instant};

/// Per-operation timing state.
#[derive(Debug)]
pub struct TimingState {
    start: Instant,
    first_token: Option<Duration>,
    metrics_emitted: bool,
}

impl TimingState {
    /// Sample the operation start time.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            first_token: None,
            metrics_emitted: false,
        }
    }

    /// Record time-to-first-token. Returns the elapsed milliseconds on the
    /// first call only; later calls return `None`.
    pub fn record_first_token(&mut self) -> Option<u128> {
        if self.first_token.is_some() {
            return None;
        }
        let elapsed = self.start.elapsed();
        self.first_token = Some(elapsed);
        Some(elapsed.as_millis())
    }

    /// TTFT in milliseconds, if a non-empty fragment has been observed.
    pub fn first_token_ms(&self) -> Option<u128> {
        self.first_token.map(|d| d.as_millis())
    }

    /// Total elapsed milliseconds since operation start.
    pub fn total_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Transition `metrics_emitted` false→true. True on the transition call
    /// only, so the leading annotation cannot be emitted twice.
    pub fn mark_metrics_emitted(&mut self) -> bool {
        if self.metrics_emitted {
            return false;
        }
        self.metrics_emitted = true;
        true
    }
}

/// Leading annotation in metrics mode, followed by a blank line.
pub fn ttft_annotation(ms: u128) -> String {
    format!("[TTFT: {ms}ms]\n\n")
}

/// Trailing annotation in metrics mode, preceded by a blank line.
pub fn total_annotation(ms: u128) -> String {
    format!("\n\n[Total Response Time: {ms}ms]")
}

/// Inline annotation for a mid-stream transport failure in metrics mode.
pub fn error_annotation(message: &str) -> String {
    format!("\n[Error: {message}]\n")
}

/// The entire downstream output in first-token-only mode.
pub fn ttft_report(ms: u128) -> String {
    format!("TTFT: {ms}ms")
}
