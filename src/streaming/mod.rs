//! Streaming pipeline: event-frame decoding, token extraction, and latency
//! instrumentation.
//!
//! The stages run in strict sequential order per event; there is no
//! reordering or batching. The decoder owns the pending buffer, the
//! extractor is pure, and the timing state belongs to the relay controller
//! driving the pipeline.

mod decoder;
mod extract;
mod timing;

pub use decoder::{EVENT_MARKER, EventFrameDecoder, FrameStream, event_frames, is_event};
pub use extract::{DONE_SENTINEL, EventOutcome, extract};
pub use timing::{
    TimingState, error_annotation, total_annotation, ttft_annotation, ttft_report,
};
