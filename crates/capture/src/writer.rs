//! Writer task: drains the handoff queue into the recording store.
//!
//! A single high-priority task runs [`writer_loop`]: block on the queue,
//! and for each chunk, write it if (and only if) the recorder is still
//! `Recording` — anything dequeued in another state is discarded (stop and
//! reset own the teardown; stale chunks must not resurrect a closed file).
//!
//! Error policy per chunk:
//! - `Written` — advance; sync cadence is handled inside the recorder.
//! - `Reentry` — soft no-op: the condition only arises from concurrent
//!   start/stop transitions and the entering caller completes normally, so
//!   it is counted, never escalated.
//! - `Failed` — fatal: the recorder enters `Error`, which stops the DMA and
//!   defers the file close to the next explicit stop.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use platform::sample_source::SampleSource;
use storage::store::RecordingStore;

use crate::chunk::Chunk;
use crate::queue::CaptureQueue;
use crate::recorder::{CaptureState, Recorder, WriteOutcome};

/// What became of one dequeued chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Payload written to the file.
    Written,
    /// Recorder was not recording; chunk discarded.
    Discarded,
    /// Reentry detected; chunk skipped as a no-op.
    Skipped,
    /// Fatal write failure; recorder driven into `Error`.
    Failed,
}

/// Process one chunk against the recorder. Factored out of the loop so
/// host tests can drive the writer deterministically.
pub async fn consume_chunk<S, F>(
    recorder: &mut Recorder<S, F>,
    chunk: &Chunk,
) -> ChunkOutcome
where
    S: SampleSource,
    F: RecordingStore,
{
    if recorder.state() != CaptureState::Recording {
        return ChunkOutcome::Discarded;
    }
    match recorder.write_audio_data(chunk.payload()).await {
        WriteOutcome::Written => {
            recorder.note_chunk(chunk.timestamp_ms());
            ChunkOutcome::Written
        }
        WriteOutcome::Reentry => ChunkOutcome::Skipped,
        WriteOutcome::Failed(err) => {
            recorder.enter_error(err);
            ChunkOutcome::Failed
        }
    }
}

/// The writer task body: dequeue forever, one chunk at a time.
///
/// The lock is taken per chunk, so control-path calls (start/stop/status)
/// interleave between writes — and every file-handle mutation they make
/// happens while this task is parked on `recv`.
pub async fn writer_loop<S, F>(
    recorder: &Mutex<CriticalSectionRawMutex, Recorder<S, F>>,
    queue: &CaptureQueue,
) -> !
where
    S: SampleSource,
    F: RecordingStore,
{
    loop {
        let chunk = queue.recv().await;
        let mut rec = recorder.lock().await;
        let _ = consume_chunk(&mut rec, &chunk).await;
    }
}
