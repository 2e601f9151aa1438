//! relaymeter: a streaming, latency-instrumented relay for token-streaming
//! LLM APIs.
//!
//! The relay accepts a prompt over HTTP, forwards an equivalent request to an
//! upstream chat-completions API, and re-streams the response to the caller
//! as it arrives, measuring time-to-first-token on the way through. Two
//! optional modes change the output: `metrics` brackets the text with TTFT
//! and total-time annotations, `ttft` stops after the first token and
//! reports only the measurement.
//!
//! A separate probe orchestrator measures a target from a balanced sample of
//! geographically-bucketed locations and renders the latency distribution as
//! a JSON report.

pub mod config;
pub mod error;
pub mod probe;
pub mod relay;
pub mod server;
pub mod streaming;
pub mod upstream;

pub use config::{ProbeConfig, RelayConfig, UpstreamConfig};
pub use error::RelayError;
pub use relay::{RelayHandle, RelayMode};
pub use server::{AppState, router};
