//! Capture pump: turns completed DMA halves into queued chunks.
//!
//! On hardware this runs in the task that owns the SAI driver; the DMA
//! half/full events resolve its `capture_half` awaits. Each completed half
//! is stamped, copied into a [`Chunk`](crate::chunk::Chunk), and offered to
//! the queue without blocking. Faults are filtered through the windowed
//! [`FrameSyncMonitor`]: recoverable late-frame-sync events clear the flag
//! and continue; everything else (or an escalation) drives the recorder
//! into `Error`.
//!
//! [`pump_step`] performs exactly one of those interactions so host tests
//! can drive the pump deterministically; the firmware loops it forever.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Instant;
use platform::sample_source::{FaultVerdict, FrameSyncMonitor, SampleSource, SourceFault};
use storage::store::RecordingStore;

use crate::chunk::BufferHalf;
use crate::queue::{offer_half, CaptureQueue};
use crate::recorder::{CaptureState, Recorder};

/// Result of one pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEvent {
    /// Recorder not recording; nothing captured.
    Idle,
    /// One half captured and enqueued.
    Captured,
    /// One half captured but the queue was full; drop counted.
    Dropped,
    /// A recoverable fault was cleared; capture continues.
    Recovered(SourceFault),
    /// A fatal (or escalated) fault; recorder driven into `Error`.
    Fatal(SourceFault),
}

/// Pump state that persists across steps: the strict half alternation and
/// the fault window.
#[derive(Debug)]
pub struct PumpState {
    next_half: BufferHalf,
    monitor: FrameSyncMonitor,
}

impl PumpState {
    /// Fresh pump state: the first completed half after start is half 0.
    pub const fn new() -> Self {
        Self {
            next_half: BufferHalf::First,
            monitor: FrameSyncMonitor::new(),
        }
    }

    /// Restart the alternation and the fault window (new session).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Late-frame-sync events in the current window (diagnostics).
    pub fn late_frame_syncs(&self) -> u8 {
        self.monitor.late_count()
    }
}

impl Default for PumpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one pump interaction: await a half (or fault) and dispatch it.
///
/// `source` is the data path of the SAI driver; `scratch` must hold at
/// least one half-buffer at the active profile and live outside the stack
/// of an interrupt context (the firmware passes a static).
pub async fn pump_step<P, S, F>(
    source: &mut P,
    state: &mut PumpState,
    scratch: &mut [u8],
    recorder: &Mutex<CriticalSectionRawMutex, Recorder<S, F>>,
    queue: &CaptureQueue,
) -> PumpEvent
where
    P: SampleSource,
    S: SampleSource,
    F: RecordingStore,
{
    let recording = { recorder.lock().await.state() == CaptureState::Recording };
    if !recording {
        return PumpEvent::Idle;
    }

    match source.capture_half(scratch).await {
        Ok(len) => {
            state.monitor.on_clean_half();
            let timestamp_ms = Instant::now().as_millis();
            #[allow(clippy::indexing_slicing)] // Safety: len <= scratch.len() per trait contract
            let accepted = offer_half(queue, state.next_half, &scratch[..len], timestamp_ms);
            state.next_half = state.next_half.toggled();
            if accepted {
                PumpEvent::Captured
            } else {
                PumpEvent::Dropped
            }
        }
        Err(fault) => match state.monitor.on_fault(fault) {
            FaultVerdict::Continue => {
                // Clear the latched flag and mask the error; the window
                // decides if recurrence escalates.
                source.clear_faults();
                PumpEvent::Recovered(fault)
            }
            FaultVerdict::Fatal => {
                let mut rec = recorder.lock().await;
                rec.enter_error(fault.into());
                PumpEvent::Fatal(fault)
            }
        },
    }
}
