//! Writer task contract tests: ordering, byte accounting, discard policy,
//! reentry handling, and fatal-error transitions.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::arithmetic_side_effects)]

use capture::chunk::{BufferHalf, Chunk};
use capture::queue::{offer_half, CaptureQueue};
use capture::recorder::{CaptureState, Recorder};
use capture::writer::{consume_chunk, ChunkOutcome};
use platform::mocks::MockSampleSource;
use platform::profile::CaptureMode;
use storage::mocks::MockStore;
use storage::store::StoreError;

const HALF: usize = 2048; // stereo profile half-buffer

fn half_payload(i: usize) -> Vec<u8> {
    (0..HALF).map(|b| ((b + i * 7) % 251) as u8).collect()
}

async fn recording_recorder() -> (MockStore, Recorder<MockSampleSource, MockStore>, CaptureQueue) {
    let store = MockStore::new();
    let mut rec = Recorder::new(MockSampleSource::new(), store.clone(), CaptureMode::Stereo);
    let queue = CaptureQueue::new();
    rec.start(&queue).await.unwrap();
    (store, rec, queue)
}

// Byte accounting: bytes_written == chunks_written × half_buffer_bytes, and the
// stored file size matches after a clean stop.
#[tokio::test]
async fn byte_accounting_matches_chunk_count() {
    let (mut store, mut rec, queue) = recording_recorder().await;

    let n = 9usize;
    let mut half = BufferHalf::First;
    for i in 0..n {
        let chunk = Chunk::new(half, &half_payload(i), i as u64 * 32);
        assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Written);
        half = half.toggled();
    }

    assert_eq!(rec.bytes_written(), (n * HALF) as u64);
    let report = rec.stop().await.unwrap();
    assert_eq!(report.bytes_written, (n * HALF) as u64);
    assert_eq!(
        store.size_of(rec.filename()).await.unwrap(),
        (n * HALF) as u64
    );
    drop(queue);
}

// Persisted bytes are in strict capture order, half/full alternating.
#[tokio::test]
async fn bytes_persist_in_capture_order() {
    let (store, mut rec, queue) = recording_recorder().await;

    let mut expected = Vec::new();
    let mut half = BufferHalf::First;
    for i in 0..6 {
        let payload = half_payload(i);
        offer_half(&queue, half, &payload, i as u64);
        expected.extend_from_slice(&payload);
        half = half.toggled();
    }
    // Drain in FIFO order, the way the writer task does.
    while let Some(chunk) = queue.try_recv() {
        assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Written);
    }

    rec.stop().await.unwrap();
    assert_eq!(
        store.file_bytes("audio_2ch_16bit_16000Hz_001.pcm").unwrap(),
        expected
    );
}

// No write is ever issued when the state is not `recording`.
#[tokio::test]
async fn chunks_outside_recording_are_discarded() {
    let store = MockStore::new();
    let mut rec = Recorder::new(MockSampleSource::new(), store.clone(), CaptureMode::Stereo);
    let chunk = Chunk::new(BufferHalf::First, &half_payload(0), 0);

    // Idle: discard.
    assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Discarded);

    // Error: discard too.
    let queue = CaptureQueue::new();
    rec.start(&queue).await.unwrap();
    rec.enter_error(capture::CaptureError::WriteFailed);
    assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Discarded);

    assert_eq!(store.write_count(), 0, "no write ever reached the store");
}

// Overflow accounting lives at the queue; here: the writer keeps running
// after drops and the recorder state is untouched.
#[tokio::test]
async fn overflow_does_not_change_state() {
    let (_store, mut rec, queue) = recording_recorder().await;

    for i in 0..(capture::QUEUE_DEPTH + 4) {
        offer_half(&queue, BufferHalf::First, &half_payload(i), 0);
    }
    assert_eq!(queue.dropped(), 4);
    assert_eq!(rec.state(), CaptureState::Recording);

    while let Some(chunk) = queue.try_recv() {
        assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Written);
    }
    assert_eq!(rec.bytes_written(), (capture::QUEUE_DEPTH * HALF) as u64);
}

// Reentry is a soft no-op, not a data-loss event.
#[tokio::test]
async fn reentry_skips_without_error() {
    let (store, mut rec, _queue) = recording_recorder().await;

    rec.force_write_guard(true);
    let chunk = Chunk::new(BufferHalf::First, &half_payload(0), 0);
    assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Skipped);
    assert_eq!(rec.state(), CaptureState::Recording, "no state change");
    assert_eq!(rec.reentry_count(), 1);
    assert_eq!(store.write_count(), 0);

    // Guard released: the next chunk writes normally.
    rec.force_write_guard(false);
    assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Written);
}

// A write failure drives the recorder into `Error` with the close deferred.
#[tokio::test]
async fn write_failure_enters_error_and_defers_close() {
    let (store, mut rec, _queue) = recording_recorder().await;

    store.fail_writes(&[StoreError::Io]);
    let chunk = Chunk::new(BufferHalf::First, &half_payload(0), 0);
    assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Failed);

    assert_eq!(rec.state(), CaptureState::Error);
    assert_eq!(rec.last_error(), Some(capture::CaptureError::WriteFailed));
    assert!(store.is_open(), "close deferred to the explicit stop");
}

// An invalidated handle fails the write and drops file_open.
#[tokio::test]
async fn invalid_handle_reports_file_invalid() {
    let (store, mut rec, _queue) = recording_recorder().await;

    store.fail_writes(&[StoreError::FileInvalid]);
    let chunk = Chunk::new(BufferHalf::First, &half_payload(0), 0);
    assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Failed);
    assert_eq!(rec.last_error(), Some(capture::CaptureError::FileInvalid));

    // With file_open dropped, a direct write refuses with not-open.
    let outcome = rec.write_audio_data(&half_payload(0)).await;
    assert_eq!(
        outcome,
        capture::recorder::WriteOutcome::Failed(capture::CaptureError::FileOpenFailed)
    );
}

// Sync stride: at most one commit per stride of bytes.
#[tokio::test]
async fn sync_stride_commits_periodically() {
    let (store, mut rec, _queue) = recording_recorder().await;
    rec.set_sync_stride(Some((4 * HALF) as u32));

    let mut half = BufferHalf::First;
    for i in 0..8 {
        let chunk = Chunk::new(half, &half_payload(i), 0);
        assert_eq!(consume_chunk(&mut rec, &chunk).await, ChunkOutcome::Written);
        half = half.toggled();
    }
    // 8 halves / (4 halves per stride) = 2 commits.
    assert_eq!(store.sync_count(), 2);

    rec.stop().await.unwrap();
    assert_eq!(store.sync_count(), 3, "stop adds the final commit");
}

#[tokio::test]
async fn default_cadence_elides_all_mid_session_syncs() {
    let (store, mut rec, _queue) = recording_recorder().await;
    let mut half = BufferHalf::First;
    for i in 0..16 {
        let chunk = Chunk::new(half, &half_payload(i), 0);
        consume_chunk(&mut rec, &chunk).await;
        half = half.toggled();
    }
    assert_eq!(store.sync_count(), 0, "committed only on stop");
}
