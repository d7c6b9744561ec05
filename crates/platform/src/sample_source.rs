//! Sample-source abstraction for the synchronous-audio (SAI) slave receiver.
//!
//! The hardware implementation configures the SAI block as a slave receiver
//! with circular high-priority DMA into a non-cacheable, cache-line-aligned
//! buffer and surfaces three asynchronous events: half-complete,
//! full-complete, and error. This trait exposes the same surface in a
//! host-mockable form:
//!
//! - control path: [`configure`], [`start`], [`stop`], [`abort`],
//!   [`clear_faults`]
//! - data path: [`capture_half`] — resolves once per DMA half-period with one
//!   half-buffer of bytes, alternating strictly between the two halves
//!
//! [`configure`]: SampleSource::configure
//! [`start`]: SampleSource::start
//! [`stop`]: SampleSource::stop
//! [`abort`]: SampleSource::abort
//! [`clear_faults`]: SampleSource::clear_faults
//! [`capture_half`]: SampleSource::capture_half

use crate::profile::CaptureProfile;

/// How long a graceful DMA stop may take before it is escalated to an abort.
pub const STOP_TIMEOUT_MS: u64 = 100;

/// Faults the audio peripheral or its DMA can raise, decoded from the
/// peripheral error register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceFault {
    /// Receive FIFO overrun — samples were lost because the DMA fell behind.
    #[error("receive overrun")]
    Overrun,
    /// Transmit underrun (playback direction shares the error register).
    #[error("underrun")]
    Underrun,
    /// Frame sync arrived earlier than the configured frame length.
    #[error("anticipated frame sync")]
    AnticipatedFrameSync,
    /// Frame sync arrived later than the configured frame length.
    ///
    /// Recoverable: the flag is cleared and capture continues. Persistent
    /// recurrence is escalated by [`FrameSyncMonitor`].
    #[error("late frame sync")]
    LateFrameSync,
    /// Kernel clock / frame configuration mismatch.
    #[error("wrong clock configuration")]
    WrongClock,
    /// DMA controller reported a bus error.
    #[error("DMA bus error")]
    DmaBus,
    /// Peripheral did not reach the expected state in time.
    #[error("peripheral timeout")]
    Timeout,
    /// External codec not ready.
    #[error("codec not ready")]
    CodecNotReady,
}

impl SourceFault {
    /// Whether this fault tears capture down immediately.
    ///
    /// Late frame sync is the only recoverable fault; it is cleared, masked,
    /// and escalated only on persistent recurrence (see [`FrameSyncMonitor`]).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::LateFrameSync)
    }
}

/// Synchronous-audio slave receiver seam.
///
/// The DMA buffer is owned by the implementation; after [`start`] the driver
/// never touches it from the CPU side other than the bulk copy-out performed
/// inside [`capture_half`].
///
/// [`start`]: SampleSource::start
/// [`capture_half`]: SampleSource::capture_half
pub trait SampleSource {
    /// Reconfigure the peripheral for `profile` (protocol, datasize, slot
    /// mask, frame layout). Only legal while stopped.
    async fn configure(&mut self, profile: &CaptureProfile) -> Result<(), SourceFault>;

    /// Start circular DMA reception.
    async fn start(&mut self) -> Result<(), SourceFault>;

    /// Stop reception gracefully.
    ///
    /// Implementations request a normal DMA stop with a
    /// [`STOP_TIMEOUT_MS`] deadline, force an abort on timeout, and wait for
    /// the peripheral to return to ready. A `Timeout` error means the
    /// peripheral never became ready; callers log and proceed.
    async fn stop(&mut self) -> Result<(), SourceFault>;

    /// Force-abort reception immediately. Infallible teardown path.
    fn abort(&mut self);

    /// Clear latched peripheral fault flags and the decoded error code.
    fn clear_faults(&mut self);

    /// Wait for the next DMA half to complete and copy it into `buf`.
    ///
    /// Returns the number of bytes written (exactly one half-buffer at the
    /// active profile). Halves alternate strictly; the first completed half
    /// after [`start`] is always half 0.
    ///
    /// [`start`]: SampleSource::start
    async fn capture_half(&mut self, buf: &mut [u8]) -> Result<usize, SourceFault>;
}

// ─── Late-frame-sync escalation ──────────────────────────────────────────────

/// Number of late-frame-sync events inside one window that escalates to a
/// fatal fault.
pub const LFS_ESCALATION_COUNT: u8 = 3;

/// Number of consecutive clean half-buffers after which the late-frame-sync
/// count decays back to zero.
///
/// The far-side clock recovering for a full window is treated as a new
/// monitoring epoch; isolated glitches hours apart must not accumulate into
/// an escalation.
pub const RECOVERY_WINDOW_HALVES: u16 = 64;

/// Windowed late-frame-sync escalation monitor.
///
/// Tracks recoverable late-frame-sync faults and decides when recurrence
/// becomes fatal. Feed it every fault via
/// [`on_fault`][Self::on_fault] and every clean half via
/// [`on_clean_half`][Self::on_clean_half].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSyncMonitor {
    late_count: u8,
    clean_halves: u16,
}

/// Verdict returned by [`FrameSyncMonitor::on_fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerdict {
    /// Clear the flag and continue capturing.
    Continue,
    /// Tear capture down.
    Fatal,
}

impl FrameSyncMonitor {
    /// Create a monitor with no recorded faults.
    pub const fn new() -> Self {
        Self {
            late_count: 0,
            clean_halves: 0,
        }
    }

    /// Record `fault` and decide whether capture continues.
    ///
    /// Fatal faults return [`FaultVerdict::Fatal`] immediately. A late frame
    /// sync increments the windowed count; the count reaching
    /// [`LFS_ESCALATION_COUNT`] escalates to fatal.
    pub fn on_fault(&mut self, fault: SourceFault) -> FaultVerdict {
        if fault.is_fatal() {
            return FaultVerdict::Fatal;
        }
        self.clean_halves = 0;
        self.late_count = self.late_count.saturating_add(1);
        if self.late_count >= LFS_ESCALATION_COUNT {
            FaultVerdict::Fatal
        } else {
            FaultVerdict::Continue
        }
    }

    /// Record one half-buffer delivered without any fault.
    ///
    /// After [`RECOVERY_WINDOW_HALVES`] consecutive clean halves the
    /// late-frame-sync count resets to zero.
    pub fn on_clean_half(&mut self) {
        if self.late_count == 0 {
            return;
        }
        self.clean_halves = self.clean_halves.saturating_add(1);
        if self.clean_halves >= RECOVERY_WINDOW_HALVES {
            self.late_count = 0;
            self.clean_halves = 0;
        }
    }

    /// Number of late-frame-sync events in the current window.
    pub fn late_count(&self) -> u8 {
        self.late_count
    }

    /// Reset the monitor (new capture session).
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameSyncMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ── Fault classification ─────────────────────────────────────────────────

    #[test]
    fn late_frame_sync_is_the_only_recoverable_fault() {
        assert!(!SourceFault::LateFrameSync.is_fatal());
        for fault in [
            SourceFault::Overrun,
            SourceFault::Underrun,
            SourceFault::AnticipatedFrameSync,
            SourceFault::WrongClock,
            SourceFault::DmaBus,
            SourceFault::Timeout,
            SourceFault::CodecNotReady,
        ] {
            assert!(fault.is_fatal(), "{fault:?} must be fatal");
        }
    }

    // ── Windowed escalation ──────────────────────────────────────────────────

    #[test]
    fn below_threshold_continues() {
        let mut mon = FrameSyncMonitor::new();
        assert_eq!(
            mon.on_fault(SourceFault::LateFrameSync),
            FaultVerdict::Continue
        );
        assert_eq!(
            mon.on_fault(SourceFault::LateFrameSync),
            FaultVerdict::Continue
        );
        assert_eq!(mon.late_count(), 2);
    }

    #[test]
    fn third_event_in_window_escalates() {
        let mut mon = FrameSyncMonitor::new();
        mon.on_fault(SourceFault::LateFrameSync);
        mon.on_fault(SourceFault::LateFrameSync);
        assert_eq!(mon.on_fault(SourceFault::LateFrameSync), FaultVerdict::Fatal);
    }

    #[test]
    fn fatal_fault_escalates_immediately() {
        let mut mon = FrameSyncMonitor::new();
        assert_eq!(mon.on_fault(SourceFault::Overrun), FaultVerdict::Fatal);
        // The windowed count is untouched by fatal faults.
        assert_eq!(mon.late_count(), 0);
    }

    #[test]
    fn clean_window_decays_the_count() {
        let mut mon = FrameSyncMonitor::new();
        mon.on_fault(SourceFault::LateFrameSync);
        mon.on_fault(SourceFault::LateFrameSync);
        for _ in 0..RECOVERY_WINDOW_HALVES {
            mon.on_clean_half();
        }
        assert_eq!(mon.late_count(), 0);
        // A fresh window: two more events still continue.
        mon.on_fault(SourceFault::LateFrameSync);
        assert_eq!(
            mon.on_fault(SourceFault::LateFrameSync),
            FaultVerdict::Continue
        );
    }

    #[test]
    fn partial_clean_window_does_not_decay() {
        let mut mon = FrameSyncMonitor::new();
        mon.on_fault(SourceFault::LateFrameSync);
        mon.on_fault(SourceFault::LateFrameSync);
        for _ in 0..(RECOVERY_WINDOW_HALVES - 1) {
            mon.on_clean_half();
        }
        assert_eq!(mon.late_count(), 2);
        // The next fault is the third in the window.
        assert_eq!(mon.on_fault(SourceFault::LateFrameSync), FaultVerdict::Fatal);
    }

    #[test]
    fn fault_resets_clean_run() {
        let mut mon = FrameSyncMonitor::new();
        mon.on_fault(SourceFault::LateFrameSync);
        for _ in 0..(RECOVERY_WINDOW_HALVES - 1) {
            mon.on_clean_half();
        }
        // Fault interrupts the clean run; the decay clock restarts.
        mon.on_fault(SourceFault::LateFrameSync);
        mon.on_clean_half();
        assert_eq!(mon.late_count(), 2);
    }

    #[test]
    fn reset_clears_state() {
        let mut mon = FrameSyncMonitor::new();
        mon.on_fault(SourceFault::LateFrameSync);
        mon.reset();
        assert_eq!(mon, FrameSyncMonitor::new());
    }
}
