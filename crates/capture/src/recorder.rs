//! Recorder state machine.
//!
//! Owns the capture lifecycle: mode/profile selection, start/stop/reset
//! sequencing, SD readiness, filename generation, and teardown ordering.
//!
//! ```text
//!        start()                stop()
//! Idle ──────────▶ Recording ──────────▶ Stopping ──▶ Idle
//!   ▲                  │ fatal fault / write error
//!   │                  ▼
//!   └─ reset()/stop() ─ Error   (DMA stopped, file close deferred)
//! ```
//!
//! A fatal error stops the DMA but deliberately leaves the file open: the
//! writer may still be draining queued chunks, and closing under it would
//! hand the filesystem a dead handle. The next explicit `stop()` or
//! `reset()` performs the close.
//!
//! The recorder's mutable fields are only touched behind the pipeline mutex,
//! and file-handle mutations happen only while the writer is parked on the
//! queue — the single-producer discipline that replaces the original's
//! reentrancy byte flag (which is still kept as a belt-and-braces detector,
//! see [`Recorder::write_audio_data`]).

use core::fmt::Write as _;

use embassy_time::Timer;
use heapless::String;
use platform::profile::{profile_for, CaptureMode, CaptureProfile};
use platform::sample_source::{SampleSource, SourceFault};
use storage::store::{RecordingStore, StoreError};

use crate::error::CaptureError;
use crate::queue::CaptureQueue;

/// Recorder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureState {
    /// No capture active, no file open, DMA stopped.
    Idle,
    /// DMA running, file open, writer draining the queue.
    Recording,
    /// Teardown in progress.
    Stopping,
    /// A fatal error occurred; DMA stopped, file close deferred.
    Error,
}

/// Maximum filename length, matching the profile-derived pattern
/// `audio_<C>ch_<B>bit_<R>Hz_<NNN>.pcm` with room to spare.
pub const FILENAME_CAP: usize = 48;

/// Close retry policy on stop: attempts and spacing.
const CLOSE_ATTEMPTS: u32 = 3;
const CLOSE_RETRY_DELAY_MS: u64 = 50;

/// Outcome of one `write_audio_data` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload reached the store in full.
    Written,
    /// A concurrent write was detected; the call was a no-op. Soft.
    Reentry,
    /// The write failed for the contained reason.
    Failed(CaptureError),
}

/// Result of a clean stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Bytes committed to the file over the session.
    pub bytes_written: u64,
    /// Whether the file was found on the medium after the close.
    pub file_verified: bool,
}

/// Status snapshot for the shell.
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    /// Lifecycle state.
    pub state: CaptureState,
    /// Active mode.
    pub mode: CaptureMode,
    /// Bytes written in the current (or last) session.
    pub bytes_written: u64,
    /// Current (or last) recording filename; empty before the first start.
    pub filename: String<FILENAME_CAP>,
    /// Chunks resident in the handoff queue.
    pub queue_depth: usize,
    /// Chunks dropped on queue overflow since boot.
    pub dropped_chunks: u32,
    /// Whether a recording file is open.
    pub file_open: bool,
}

/// The recorder singleton.
///
/// Generic over the sample source `S` (control path to the SAI driver) and
/// the recording store `F` (FAT-backed on hardware, mock in tests).
pub struct Recorder<S: SampleSource, F: RecordingStore> {
    source: S,
    store: F,
    profile: &'static CaptureProfile,
    state: CaptureState,
    filename: String<FILENAME_CAP>,
    bytes_written: u64,
    file_open: bool,
    write_in_progress: bool,
    file_counter: u32,
    /// Sync cadence in bytes; `None` defers all commits to stop.
    sync_stride: Option<u32>,
    bytes_since_sync: u32,
    last_error: Option<CaptureError>,
    reentry_count: u32,
    // Chunk cadence, for the clock measurement command.
    cadence_first_ms: Option<u64>,
    cadence_last_ms: u64,
    cadence_chunks: u32,
}

impl<S: SampleSource, F: RecordingStore> Recorder<S, F> {
    /// Create an idle recorder with the given mode active.
    pub fn new(source: S, store: F, mode: CaptureMode) -> Self {
        Self {
            source,
            store,
            profile: profile_for(mode),
            state: CaptureState::Idle,
            filename: String::new(),
            bytes_written: 0,
            file_open: false,
            write_in_progress: false,
            file_counter: 0,
            sync_stride: None,
            bytes_since_sync: 0,
            last_error: None,
            reentry_count: 0,
            cadence_first_ms: None,
            cadence_last_ms: 0,
            cadence_chunks: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The active capture profile.
    pub fn profile(&self) -> &'static CaptureProfile {
        self.profile
    }

    /// Bytes written in the current or last session.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Current or last recording filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Last fatal error, if the recorder is (or was) in `Error`.
    pub fn last_error(&self) -> Option<CaptureError> {
        self.last_error
    }

    /// Reentrant-write detections this session. Soft diagnostics only.
    pub fn reentry_count(&self) -> u32 {
        self.reentry_count
    }

    /// Set the sync cadence: commit at most once per `stride` bytes.
    /// `None` (the default) defers all commits to stop, keeping FAT
    /// cluster-chain updates out of the real-time loop entirely.
    pub fn set_sync_stride(&mut self, stride: Option<u32>) {
        self.sync_stride = stride;
    }

    /// Status snapshot for the shell.
    pub fn status(&self, queue: &CaptureQueue) -> RecorderStatus {
        RecorderStatus {
            state: self.state,
            mode: self.profile.mode,
            bytes_written: self.bytes_written,
            filename: self.filename.clone(),
            queue_depth: queue.depth(),
            dropped_chunks: queue.dropped(),
            file_open: self.file_open,
        }
    }

    /// Generate the next recording filename:
    /// `audio_<C>ch_<B>bit_<R>Hz_<NNN>.pcm`, counter incremented on every
    /// start.
    fn generate_filename(&mut self) {
        self.file_counter = self.file_counter.saturating_add(1);
        self.filename.clear();
        // Capacity is sized for the widest profile parameters; a formatting
        // overflow would only truncate the name.
        let _ = write!(
            self.filename,
            "audio_{}ch_{}bit_{}Hz_{:03}.pcm",
            self.profile.channels,
            self.profile.bits_per_sample,
            self.profile.sample_rate_hz,
            self.file_counter
        );
    }

    /// Start a capture session.
    ///
    /// A start from any non-idle state first forces a [`reset`][Self::reset]
    /// and retries once. Sequencing on the happy path: ensure the filesystem
    /// is live (one retry stands in for the remount) → fresh filename →
    /// create-always open → clear counters and fault state → reconfigure the
    /// peripheral → state `Recording` → start DMA. Every sub-step failure
    /// rolls back into `Error`.
    pub async fn start(&mut self, queue: &CaptureQueue) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            self.reset(queue).await;
            if self.state != CaptureState::Idle {
                return Err(CaptureError::Busy);
            }
        }

        // Filesystem readiness, with one remount-equivalent retry.
        if self.store.ensure_ready().await.is_err() {
            if let Err(e) = self.store.ensure_ready().await {
                self.state = CaptureState::Error;
                self.last_error = Some(CaptureError::MountFailed);
                return Err(match e {
                    StoreError::NotReady => CaptureError::MountFailed,
                    other => other.into(),
                });
            }
        }

        self.generate_filename();
        if let Err(e) = self.store.create(self.filename.as_str()).await {
            self.state = CaptureState::Error;
            let err = match e {
                StoreError::NotReady => CaptureError::SdNotReady,
                _ => CaptureError::FileOpenFailed,
            };
            self.last_error = Some(err);
            return Err(err);
        }
        self.file_open = true;
        self.bytes_written = 0;
        self.bytes_since_sync = 0;
        self.write_in_progress = false;
        self.reentry_count = 0;
        self.cadence_first_ms = None;
        self.cadence_chunks = 0;
        self.last_error = None;

        // Clear latched peripheral faults from any previous session before
        // the DMA restarts, then bring the peripheral onto the active
        // profile.
        self.source.clear_faults();
        if self.source.configure(self.profile).await.is_err() {
            self.rollback_start().await;
            return Err(CaptureError::DmaStartFailed);
        }

        // State first, DMA second: the first half-complete event must
        // already observe `Recording`.
        self.state = CaptureState::Recording;
        if self.source.start().await.is_err() {
            self.rollback_start().await;
            return Err(CaptureError::DmaStartFailed);
        }
        Ok(())
    }

    /// Undo a partial start: close the file, mark `Error`.
    async fn rollback_start(&mut self) {
        if self.file_open {
            let _ = self.store.close().await;
            self.file_open = false;
        }
        self.state = CaptureState::Error;
        self.last_error = Some(CaptureError::DmaStartFailed);
    }

    /// Stop the capture session and commit the file.
    ///
    /// Callable from `Recording` and from `Error` (where it performs the
    /// deferred close). Stopping an idle recorder is a no-op success.
    pub async fn stop(&mut self) -> Result<StopReport, CaptureError> {
        if self.state == CaptureState::Idle {
            return Ok(StopReport {
                bytes_written: self.bytes_written,
                file_verified: false,
            });
        }
        if self.state == CaptureState::Stopping {
            // Stop already in flight on this single-owner machine.
            return Ok(StopReport {
                bytes_written: self.bytes_written,
                file_verified: false,
            });
        }

        self.state = CaptureState::Stopping;
        let mut overall: Result<(), CaptureError> = Ok(());

        // Graceful DMA stop; the driver escalates to abort internally after
        // its 100 ms deadline. A peripheral that never returns to ready is
        // logged and survived.
        if let Err(fault) = self.source.stop().await {
            if matches!(fault, SourceFault::Timeout) {
                overall = Err(CaptureError::DmaStopTimeout);
            } else {
                overall = Err(fault.into());
            }
        }

        // Sync, then close with retries.
        if self.file_open {
            let _ = self.store.sync().await;
            Timer::after_millis(10).await;

            let mut closed = false;
            for attempt in 1..=CLOSE_ATTEMPTS {
                match self.store.close().await {
                    Ok(()) => {
                        closed = true;
                        break;
                    }
                    Err(_) if attempt < CLOSE_ATTEMPTS => {
                        Timer::after_millis(CLOSE_RETRY_DELAY_MS).await;
                    }
                    Err(_) => {}
                }
            }
            if !closed {
                overall = Err(CaptureError::FileCloseFailed);
            }
            self.file_open = false;
        }

        self.state = CaptureState::Idle;

        // Only now, with the file closed, is an existence probe safe.
        let file_verified = self
            .store
            .exists(self.filename.as_str())
            .await
            .unwrap_or(false);

        overall.map(|()| StopReport {
            bytes_written: self.bytes_written,
            file_verified,
        })
    }

    /// Force the recorder back to a clean idle state.
    ///
    /// Aborts the DMA, force-closes the file if open, drains the queue, and
    /// zeroes the session counters. The filename counter survives so the
    /// next session still gets a fresh `NNN`.
    pub async fn reset(&mut self, queue: &CaptureQueue) {
        self.source.abort();
        if self.file_open {
            let _ = self.store.close().await;
            self.file_open = false;
        }
        queue.drain();
        self.bytes_written = 0;
        self.bytes_since_sync = 0;
        self.write_in_progress = false;
        self.state = CaptureState::Idle;
    }

    /// Enter the error state from a fatal peripheral fault or write error.
    ///
    /// Tears down the DMA but defers the file close to the next explicit
    /// `stop()`/`reset()` so a draining writer never races the close.
    pub fn enter_error(&mut self, err: CaptureError) {
        self.source.abort();
        self.state = CaptureState::Error;
        self.last_error = Some(err);
    }

    /// Switch capture mode.
    ///
    /// Refused while recording or stopping; idempotent when the mode is
    /// unchanged; otherwise swaps the profile and reconfigures the
    /// peripheral.
    pub async fn set_mode(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        if matches!(self.state, CaptureState::Recording | CaptureState::Stopping) {
            return Err(CaptureError::Busy);
        }
        if self.profile.mode == mode {
            return Ok(());
        }
        self.profile = profile_for(mode);
        self.source
            .configure(self.profile)
            .await
            .map_err(|_| CaptureError::DmaStartFailed)
    }

    /// Write one chunk payload to the recording file.
    ///
    /// Contract (see the writer task): refuses when no file is open; reports
    /// an invalid handle and drops `file_open`; detects reentry via the
    /// guard flag and reports it as a soft no-op; a short write is a fatal
    /// write error; on success the byte counter advances and the optional
    /// sync stride may commit.
    pub async fn write_audio_data(&mut self, data: &[u8]) -> WriteOutcome {
        if self.write_in_progress {
            self.reentry_count = self.reentry_count.saturating_add(1);
            return WriteOutcome::Reentry;
        }
        self.write_in_progress = true;

        if !self.file_open {
            self.write_in_progress = false;
            return WriteOutcome::Failed(CaptureError::FileOpenFailed);
        }

        let outcome = match self.store.write(data).await {
            Ok(()) => {
                self.bytes_written = self.bytes_written.saturating_add(data.len() as u64);
                #[allow(clippy::cast_possible_truncation)] // Safety: one half-buffer <= 8 KiB
                {
                    self.bytes_since_sync =
                        self.bytes_since_sync.saturating_add(data.len() as u32);
                }
                if let Some(stride) = self.sync_stride {
                    if self.bytes_since_sync >= stride {
                        let _ = self.store.sync().await;
                        self.bytes_since_sync = 0;
                    }
                }
                WriteOutcome::Written
            }
            Err(StoreError::FileInvalid) => {
                self.file_open = false;
                WriteOutcome::Failed(CaptureError::FileInvalid)
            }
            Err(StoreError::NotOpen) => {
                self.file_open = false;
                WriteOutcome::Failed(CaptureError::FileOpenFailed)
            }
            Err(StoreError::NotReady) => WriteOutcome::Failed(CaptureError::SdNotReady),
            Err(_) => WriteOutcome::Failed(CaptureError::WriteFailed),
        };

        self.write_in_progress = false;
        outcome
    }

    /// Record the cadence of a successfully written chunk.
    pub fn note_chunk(&mut self, timestamp_ms: u64) {
        if self.cadence_first_ms.is_none() {
            self.cadence_first_ms = Some(timestamp_ms);
        }
        self.cadence_last_ms = timestamp_ms;
        self.cadence_chunks = self.cadence_chunks.saturating_add(1);
    }

    /// Estimate the effective external sample clock from chunk cadence.
    ///
    /// Returns `None` until at least two half-periods have been observed.
    /// Each chunk carries `buffer_frames / 2` frames; frames per elapsed
    /// millisecond gives the observed rate.
    #[allow(clippy::arithmetic_side_effects)] // Safety: elapsed_ms != 0 guarded above the division
    pub fn measure_clock_hz(&self) -> Option<u32> {
        let first = self.cadence_first_ms?;
        if self.cadence_chunks < 2 {
            return None;
        }
        let elapsed_ms = self.cadence_last_ms.checked_sub(first)?;
        if elapsed_ms == 0 {
            return None;
        }
        // (chunks - 1) intervals have elapsed between first and last.
        let frames = u64::from(self.cadence_chunks.saturating_sub(1))
            .saturating_mul(u64::from(self.profile.buffer_frames / 2));
        let hz = frames.saturating_mul(1000) / elapsed_ms;
        #[allow(clippy::cast_possible_truncation)] // Safety: audio rates fit u32
        let hz = hz as u32;
        Some(hz)
    }

    /// Test/diagnostic hook: force the reentrancy guard, as a concurrent
    /// start/stop transition would.
    #[doc(hidden)]
    pub fn force_write_guard(&mut self, engaged: bool) {
        self.write_in_progress = engaged;
    }

    /// Shared access to the store, for post-session verification.
    pub fn store_mut(&mut self) -> &mut F {
        &mut self.store
    }

    /// Shared access to the sample source control path.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
