//! Fixed parameters of the receive pipeline.
//!
//! Staging and publishing parameters tied to the hardware path; not
//! runtime-configurable.

use std::time::Duration;

/// Depth of the worker and render notify queues. Tokens are coalesced:
/// a push against a full queue is a no-op.
pub const NOTIFY_QUEUE_DEPTH: usize = 3;

/// Ring buffer capacity in frames (capacity = frame_size * RING_FRAMES
/// interleaved I/Q doubles).
pub const RING_FRAMES: usize = 16;

/// DSP exchange return code meaning "chain not primed yet"; recovered
/// silently by emitting silence for the frame.
pub const DSP_NOT_READY: i32 = -2;

/// Rate the DSP chain runs at and the rate audio leaves the exchange.
pub const DSP_RATE: u32 = 48_000;

/// Full-scale value for the 16-bit PCM conversion at the network sink.
pub const PCM_FULL_SCALE: f64 = 32767.0;

/// How long teardown waits for the worker and render threads before
/// abandoning them.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Backoff applied when a drain finds less than one full frame. Keeps the
/// underflow retry from spinning while the ingest side catches up.
pub const UNDERFLOW_BACKOFF: Duration = Duration::from_millis(1);
