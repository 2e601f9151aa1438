//! Token extraction from decoded event lines.
//!
//! One event line either carries an incremental text fragment, carries
//! nothing (heartbeats, role-only deltas, the `[DONE]` sentinel), or fails to
//! parse. Parse failures are expected mid-stream and are never fatal: the
//! outcome type makes the skip explicit instead of hiding it in exception
//! suppression.

use serde::Deserialize;

use super::decoder::EVENT_MARKER;

/// Stream-terminator sentinel. Carries no fragment and does NOT end the
/// pipeline: upstreams may send further control lines (or even fragments)
/// after it, and end-of-pipeline is driven solely by decoder exhaustion.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Typed per-event result of extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event parsed; the carried fragment may be empty.
    Fragment(String),
    /// The payload failed to parse as the expected structure. Recoverable.
    Skipped,
    /// The payload was the terminator sentinel.
    Done,
}

/// Payload shape of one upstream stream event.
#[derive(Debug, Deserialize)]
struct StreamEventPayload {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[allow(dead_code)]
    role: Option<String>,
    content: Option<String>,
}

/// Extract the incremental text fragment from one event line.
///
/// Strips the event marker and surrounding whitespace, then parses the
/// payload. A successfully parsed payload yields the nested incremental text
/// field if present, else an empty fragment.
pub fn extract(line: &str) -> EventOutcome {
    let payload = line.strip_prefix(EVENT_MARKER).unwrap_or(line).trim();

    if payload == DONE_SENTINEL {
        return EventOutcome::Done;
    }

    match serde_json::from_str::<StreamEventPayload>(payload) {
        Ok(event) => {
            let fragment = event
                .choices
                .and_then(|choices| choices.into_iter().next())
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .unwrap_or_default();
            EventOutcome::Fragment(fragment)
        }
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream event");
            EventOutcome::Skipped
        }
    }
}
