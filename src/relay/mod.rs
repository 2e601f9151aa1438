//! Relay controller.
//!
//! Owns one upstream call and drives the decode → extract → instrument
//! pipeline, writing produced bytes into a single-producer/single-consumer
//! byte channel. The channel receiver is handed back to the HTTP layer
//! immediately, before the body is populated, so the caller starts receiving
//! bytes as soon as the first token arrives. The pump runs as a background
//! task and drops the sender on every exit path, which closes the downstream
//! body.

use std::convert::Infallible;
use std::fmt;

use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::streaming::{
    EventOutcome, FrameStream, event_frames, extract, TimingState, error_annotation,
    total_annotation, ttft_annotation, ttft_report,
};
use crate::upstream::{ChatCompletionRequest, UpstreamClient};

/// Operating mode of one relay operation, derived once from the inbound
/// query flags and immutable for the operation's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Forward fragments unchanged.
    Normal,
    /// Bracket the fragments with TTFT and total-time annotations.
    MetricsAnnotated,
    /// Emit a single TTFT report and stop after the first token.
    FirstTokenOnly,
}

impl RelayMode {
    /// `ttft` takes precedence over `metrics`: first-token termination is
    /// itself a metrics report.
    pub fn from_flags(metrics: bool, ttft: bool) -> Self {
        if ttft {
            Self::FirstTokenOnly
        } else if metrics {
            Self::MetricsAnnotated
        } else {
            Self::Normal
        }
    }
}

/// Downstream byte stream backing the HTTP response body.
pub type RelayStream = mpsc::Receiver<Result<Bytes, Infallible>>;

/// A running relay operation: the body stream plus the advisory cancel
/// handle for the upstream read.
pub struct RelayHandle {
    pub stream: RelayStream,
    pub cancel: CancellationToken,
}

/// Issue the upstream call and start pumping.
///
/// Upstream rejection (non-2xx) surfaces here, before any downstream bytes
/// exist. On success the returned handle's stream terminates when the pump
/// finishes, whichever exit path it takes.
pub async fn relay(
    client: &UpstreamClient,
    prompt: &str,
    mode: RelayMode,
) -> Result<RelayHandle, RelayError> {
    let request = ChatCompletionRequest::from_prompt(client.model(), prompt);
    let upstream = client.open_stream(&request).await?;
    Ok(spawn_pump(upstream, mode))
}

fn spawn_pump<S, B, E>(byte_stream: S, mode: RelayMode) -> RelayHandle
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let frames = event_frames(byte_stream);
    tokio::spawn(pump(frames, mode, tx, cancel.clone()));
    RelayHandle { stream: rx, cancel }
}

type BodySender = mpsc::Sender<Result<Bytes, Infallible>>;

async fn send_text(tx: &mut BodySender, text: String) -> bool {
    tx.send(Ok(Bytes::from(text))).await.is_ok()
}

/// Pump loop. Strictly sequential per event; fragments reach the channel in
/// upstream order. The cancellation branch is polled first so a cancel
/// requested by the first-token path wins over further ready frames.
async fn pump(mut frames: FrameStream, mode: RelayMode, mut tx: BodySender, cancel: CancellationToken) {
    let mut timing = TimingState::start();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            frame = frames.next() => frame,
        };
        let Some(frame) = next else { break };

        match frame {
            Ok(line) => match extract(&line) {
                EventOutcome::Fragment(fragment) if !fragment.is_empty() => {
                    if let Some(ttft) = timing.record_first_token() {
                        match mode {
                            RelayMode::FirstTokenOnly => {
                                // Terminal report is the entire output. The
                                // upstream read is cancelled cooperatively;
                                // the triggering fragment is not forwarded.
                                let _ = send_text(&mut tx, ttft_report(ttft)).await;
                                cancel.cancel();
                                continue;
                            }
                            RelayMode::MetricsAnnotated => {
                                if timing.mark_metrics_emitted()
                                    && !send_text(&mut tx, ttft_annotation(ttft)).await
                                {
                                    return;
                                }
                            }
                            RelayMode::Normal => {}
                        }
                    }
                    if !send_text(&mut tx, fragment).await {
                        // Downstream went away; nothing left to relay to.
                        return;
                    }
                }
                // Empty fragments, skipped events, and the sentinel carry no
                // timing significance and produce no output.
                EventOutcome::Fragment(_) | EventOutcome::Skipped | EventOutcome::Done => {}
            },
            Err(e) => {
                tracing::warn!(error = %e, "relay pump terminated mid-stream");
                if mode == RelayMode::MetricsAnnotated {
                    let _ = send_text(&mut tx, error_annotation(&e.to_string())).await;
                }
                return;
            }
        }
    }

    if mode == RelayMode::MetricsAnnotated {
        let _ = send_text(&mut tx, total_annotation(timing.total_ms())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn upstream_chunks(lines: &[&str]) -> Vec<Result<Bytes, Infallible>> {
        lines
            .iter()
            .map(|l| Ok(Bytes::from(format!("{l}\n"))))
            .collect()
    }

    async fn collect_output(handle: RelayHandle) -> String {
        let bytes: Vec<Bytes> = handle
            .stream
            .map(|item| item.expect("infallible"))
            .collect()
            .await;
        let joined: Vec<u8> = bytes.into_iter().flatten().collect();
        String::from_utf8(joined).expect("utf8 output")
    }

    fn fragment_event(text: &str) -> String {
        format!(r#"data: {{"choices":[{{"delta":{{"content":"{text}"}}}}]}}"#)
    }

    #[tokio::test]
    async fn normal_mode_concatenates_fragments_in_order() {
        let chunks = upstream_chunks(&[
            &fragment_event("Hi"),
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            &fragment_event(" there"),
            "data: [DONE]",
        ]);
        let handle = spawn_pump(stream::iter(chunks), RelayMode::Normal);
        assert_eq!(collect_output(handle).await, "Hi there");
    }

    #[tokio::test]
    async fn metrics_mode_brackets_the_fragments() {
        let chunks = upstream_chunks(&[
            &fragment_event("Hi"),
            &fragment_event(" there"),
            "data: [DONE]",
        ]);
        let handle = spawn_pump(stream::iter(chunks), RelayMode::MetricsAnnotated);
        let output = collect_output(handle).await;

        let ttft_prefix = output.strip_prefix("[TTFT: ").expect("leading annotation");
        let ttft_ms: u128 = ttft_prefix[..ttft_prefix.find("ms]").unwrap()]
            .parse()
            .unwrap();
        assert!(output.contains("Hi there"));
        let total_at = output.rfind("[Total Response Time: ").expect("trailing");
        let total_ms: u128 = output[total_at + "[Total Response Time: ".len()..]
            .trim_end_matches("ms]")
            .parse()
            .unwrap();
        assert!(total_ms >= ttft_ms);

        // Exact shape of the end-to-end scenario from the contract.
        let expected = format!("[TTFT: {ttft_ms}ms]\n\nHi there\n\n[Total Response Time: {total_ms}ms]");
        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn first_token_only_emits_exactly_one_report() {
        let mut lines = vec![fragment_event("Hi")];
        for i in 0..10 {
            lines.push(fragment_event(&format!(" more{i}")));
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let handle = spawn_pump(stream::iter(upstream_chunks(&refs)), RelayMode::FirstTokenOnly);
        let output = collect_output(handle).await;

        let _ms: u128 = output
            .strip_prefix("TTFT: ")
            .and_then(|rest| rest.strip_suffix("ms"))
            .expect("exactly one report line")
            .parse()
            .unwrap();
        assert!(!output.contains("Hi"));
        assert!(!output.contains("more"));
    }

    #[tokio::test]
    async fn malformed_event_between_fragments_drops_nothing() {
        let chunks = upstream_chunks(&[
            &fragment_event("Hi"),
            "data: {definitely not json",
            &fragment_event(" there"),
        ]);
        let handle = spawn_pump(stream::iter(chunks), RelayMode::Normal);
        assert_eq!(collect_output(handle).await, "Hi there");
    }

    #[tokio::test]
    async fn sentinel_does_not_end_the_stream() {
        let chunks = upstream_chunks(&[
            &fragment_event("before"),
            "data: [DONE]",
            &fragment_event(" after"),
        ]);
        let handle = spawn_pump(stream::iter(chunks), RelayMode::Normal);
        assert_eq!(collect_output(handle).await, "before after");
    }

    #[tokio::test]
    async fn transport_error_closes_with_annotation_in_metrics_mode() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from(format!("{}\n", fragment_event("partial")))),
            Err("connection reset".to_string()),
        ];
        let handle = spawn_pump(stream::iter(chunks), RelayMode::MetricsAnnotated);
        let output = collect_output(handle).await;

        assert!(output.contains("partial"));
        assert!(output.contains("[Error: "));
        assert!(output.contains("connection reset"));
        // No trailing total annotation after a failure.
        assert!(!output.contains("[Total Response Time:"));
    }

    #[tokio::test]
    async fn transport_error_is_silent_in_normal_mode() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from(format!("{}\n", fragment_event("partial")))),
            Err("connection reset".to_string()),
        ];
        let handle = spawn_pump(stream::iter(chunks), RelayMode::Normal);
        assert_eq!(collect_output(handle).await, "partial");
    }

    #[tokio::test]
    async fn heartbeats_only_yields_empty_body_in_normal_mode() {
        let chunks = upstream_chunks(&[
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            "data: [DONE]",
        ]);
        let handle = spawn_pump(stream::iter(chunks), RelayMode::Normal);
        assert_eq!(collect_output(handle).await, "");
    }

    #[test]
    fn ttft_flag_takes_precedence() {
        assert_eq!(RelayMode::from_flags(true, true), RelayMode::FirstTokenOnly);
        assert_eq!(RelayMode::from_flags(true, false), RelayMode::MetricsAnnotated);
        assert_eq!(RelayMode::from_flags(false, true), RelayMode::FirstTokenOnly);
        assert_eq!(RelayMode::from_flags(false, false), RelayMode::Normal);
    }
}
