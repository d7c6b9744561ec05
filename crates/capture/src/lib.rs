//! Real-time audio capture pipeline for the PCM ingest node.
//!
//! Dataflow, producer to sink:
//!
//! ```text
//! SAI peripheral → circular DMA → half-buffer
//!       → (pump copies into a Chunk, non-blocking enqueue)   [pump]
//!       → bounded handoff queue                              [queue]
//!       → writer task → RecordingStore → SD card             [writer]
//! ```
//!
//! Control flow: shell command → [`recorder`] state machine → sample source,
//! mount layer, writer.
//!
//! Everything here is `no_std`, allocation-free, and host-testable; hardware
//! specifics stay behind the `platform` traits.

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod chunk;
pub mod control;
pub mod error;
pub mod pump;
pub mod queue;
pub mod recorder;
pub mod writer;

pub use chunk::{BufferHalf, Chunk};
pub use error::CaptureError;
pub use pump::{pump_step, PumpEvent, PumpState};
pub use queue::{offer_half, CaptureQueue, QUEUE_DEPTH};
pub use recorder::{CaptureState, Recorder, RecorderStatus, StopReport};
pub use writer::{consume_chunk, writer_loop, ChunkOutcome};
