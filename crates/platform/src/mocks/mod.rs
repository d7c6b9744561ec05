//! Mock implementations for testing
//!
//! This module provides mock implementations of the platform traits for use
//! in unit and integration tests: a scripted [`MockSampleSource`] and an
//! in-memory [`MemDisk`] block device with fault injection.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::unwrap_used, clippy::expect_used)] // test-support code
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)] // bounds asserted

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::blockdev::{sector_count_for, DiskError, DiskIo, DiskStatus, SECTOR_LEN};
use crate::profile::CaptureProfile;
use crate::sample_source::{SampleSource, SourceFault};

// ─── MockSampleSource ────────────────────────────────────────────────────────

/// One scripted event delivered by [`MockSampleSource::capture_half`].
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    /// A completed half-buffer with the given payload bytes.
    Half(Vec<u8>),
    /// A decoded peripheral fault.
    Fault(SourceFault),
}

#[derive(Debug, Default)]
struct SourceState {
    profile: Option<CaptureProfile>,
    running: bool,
    script: VecDeque<ScriptedEvent>,
    configure_count: usize,
    start_count: usize,
    stop_count: usize,
    abort_count: usize,
    clear_count: usize,
    fail_next_start: bool,
}

/// Scripted sample source.
///
/// Tests queue half-buffers and faults with [`push_half`][Self::push_half] /
/// [`push_fault`][Self::push_fault]; the capture pump drains them in order.
/// Cloning shares the underlying state, so a test can keep a handle for
/// assertions while the recorder owns another.
#[derive(Clone, Default)]
pub struct MockSampleSource {
    state: Arc<Mutex<SourceState>>,
}

impl MockSampleSource {
    /// Create an idle source with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one half-buffer of `payload` bytes.
    pub fn push_half(&self, payload: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(ScriptedEvent::Half(payload));
    }

    /// Queue `count` half-buffers of `len` bytes, filled with a counting
    /// pattern that differs per half so bit-exactness checks are meaningful.
    pub fn push_pattern_halves(&self, count: usize, len: usize) {
        for half in 0..count {
            let payload: Vec<u8> = (0..len)
                .map(|i| ((i + half * 7) % 251) as u8)
                .collect();
            self.push_half(payload);
        }
    }

    /// Queue a decoded peripheral fault.
    pub fn push_fault(&self, fault: SourceFault) {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(ScriptedEvent::Fault(fault));
    }

    /// Arrange for the next [`SampleSource::start`] call to fail.
    pub fn fail_next_start(&self) {
        self.state.lock().unwrap().fail_next_start = true;
    }

    /// Number of scripted events not yet consumed.
    pub fn script_len(&self) -> usize {
        self.state.lock().unwrap().script.len()
    }

    /// Whether the DMA is currently started.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Number of `stop` calls observed.
    pub fn stop_count(&self) -> usize {
        self.state.lock().unwrap().stop_count
    }

    /// Number of `abort` calls observed.
    pub fn abort_count(&self) -> usize {
        self.state.lock().unwrap().abort_count
    }

    /// Number of `clear_faults` calls observed.
    pub fn clear_count(&self) -> usize {
        self.state.lock().unwrap().clear_count
    }

    /// The profile most recently passed to `configure`.
    pub fn configured_profile(&self) -> Option<CaptureProfile> {
        self.state.lock().unwrap().profile
    }
}

impl SampleSource for MockSampleSource {
    async fn configure(&mut self, profile: &CaptureProfile) -> Result<(), SourceFault> {
        let mut s = self.state.lock().unwrap();
        if s.running {
            return Err(SourceFault::Timeout);
        }
        s.profile = Some(*profile);
        s.configure_count += 1;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SourceFault> {
        let mut s = self.state.lock().unwrap();
        if s.fail_next_start {
            s.fail_next_start = false;
            return Err(SourceFault::DmaBus);
        }
        s.running = true;
        s.start_count += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SourceFault> {
        let mut s = self.state.lock().unwrap();
        s.running = false;
        s.stop_count += 1;
        Ok(())
    }

    fn abort(&mut self) {
        let mut s = self.state.lock().unwrap();
        s.running = false;
        s.abort_count += 1;
    }

    fn clear_faults(&mut self) {
        self.state.lock().unwrap().clear_count += 1;
    }

    async fn capture_half(&mut self, buf: &mut [u8]) -> Result<usize, SourceFault> {
        // Yield once so pump loops interleave with other tasks under tokio.
        embassy_futures::yield_now().await;
        let event = self.state.lock().unwrap().script.pop_front();
        match event {
            Some(ScriptedEvent::Half(payload)) => {
                assert!(payload.len() <= buf.len(), "scripted half exceeds buffer");
                buf[..payload.len()].copy_from_slice(&payload);
                Ok(payload.len())
            }
            Some(ScriptedEvent::Fault(fault)) => Err(fault),
            // Script exhausted: the test drove more reads than it scripted.
            None => Err(SourceFault::Timeout),
        }
    }
}

// ─── MemDisk ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct MemDiskState {
    sectors: Vec<u8>,
    initialized: bool,
    not_ready: bool,
    fail_reads: usize,
    fail_writes: usize,
    stall_writes_ms: u64,
    read_count: usize,
    write_count: usize,
}

/// In-memory sector device with fault injection.
///
/// Cloned handles share the same sector array, which is what makes remount
/// tests possible: unmounting drops one handle while the test keeps another
/// referring to the same medium.
#[derive(Clone)]
pub struct MemDisk {
    state: Arc<Mutex<MemDiskState>>,
}

impl MemDisk {
    /// Create a zero-filled disk of `sector_count` sectors.
    pub fn new(sector_count: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemDiskState {
                sectors: vec![0u8; sector_count as usize * SECTOR_LEN],
                initialized: true,
                not_ready: false,
                fail_reads: 0,
                fail_writes: 0,
                stall_writes_ms: 0,
                read_count: 0,
                write_count: 0,
            })),
        }
    }

    /// Simulate card removal (`true`) or reinsertion (`false`).
    pub fn set_not_ready(&self, not_ready: bool) {
        self.state.lock().unwrap().not_ready = not_ready;
    }

    /// Fail the next `n` write operations with an I/O error.
    pub fn fail_next_writes(&self, n: usize) {
        self.state.lock().unwrap().fail_writes = n;
    }

    /// Fail the next `n` read operations with an I/O error.
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().unwrap().fail_reads = n;
    }

    /// Stall every write by `ms` milliseconds (FAT cluster-allocation spike).
    pub fn stall_writes_ms(&self, ms: u64) {
        self.state.lock().unwrap().stall_writes_ms = ms;
    }

    /// Number of write operations served.
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().write_count
    }

    /// Raw copy of a sector, for on-medium assertions.
    pub fn sector(&self, lba: u32) -> Vec<u8> {
        let s = self.state.lock().unwrap();
        let start = lba as usize * SECTOR_LEN;
        s.sectors[start..start + SECTOR_LEN].to_vec()
    }
}

impl DiskIo for MemDisk {
    async fn initialize(&mut self) -> Result<(), DiskError> {
        let mut s = self.state.lock().unwrap();
        if s.not_ready {
            return Err(DiskError::NotReady);
        }
        s.initialized = true;
        Ok(())
    }

    fn status(&self) -> DiskStatus {
        let s = self.state.lock().unwrap();
        DiskStatus {
            not_initialized: !s.initialized,
            no_disk: s.not_ready,
            write_protected: false,
        }
    }

    async fn read(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DiskError> {
        sector_count_for(buf.len())?;
        let mut s = self.state.lock().unwrap();
        if s.not_ready {
            return Err(DiskError::NotReady);
        }
        if s.fail_reads > 0 {
            s.fail_reads -= 1;
            return Err(DiskError::Io);
        }
        let start = lba as usize * SECTOR_LEN;
        let end = start + buf.len();
        if end > s.sectors.len() {
            return Err(DiskError::ParamError);
        }
        buf.copy_from_slice(&s.sectors[start..end]);
        s.read_count += 1;
        Ok(())
    }

    async fn write(&mut self, lba: u32, buf: &[u8]) -> Result<(), DiskError> {
        sector_count_for(buf.len())?;
        let stall = {
            let s = self.state.lock().unwrap();
            s.stall_writes_ms
        };
        if stall > 0 {
            embassy_time::Timer::after_millis(stall).await;
        }
        let mut s = self.state.lock().unwrap();
        if s.not_ready {
            return Err(DiskError::NotReady);
        }
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(DiskError::Io);
        }
        let start = lba as usize * SECTOR_LEN;
        let end = start + buf.len();
        if end > s.sectors.len() {
            return Err(DiskError::ParamError);
        }
        s.sectors[start..end].copy_from_slice(buf);
        s.write_count += 1;
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn sector_count(&self) -> Result<u32, DiskError> {
        let s = self.state.lock().unwrap();
        Ok((s.sectors.len() / SECTOR_LEN) as u32)
    }

    fn erase_block_size(&self) -> Result<u32, DiskError> {
        // Pretend 4 MB erase blocks like a typical SDHC card: 8192 sectors.
        Ok(8192)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{profile_for, CaptureMode};

    #[tokio::test]
    async fn mock_source_replays_script_in_order() {
        let mut src = MockSampleSource::new();
        src.push_half(vec![1, 2, 3, 4]);
        src.push_fault(SourceFault::LateFrameSync);
        src.push_half(vec![5, 6, 7, 8]);

        let mut buf = [0u8; 8];
        assert_eq!(src.capture_half(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(
            src.capture_half(&mut buf).await,
            Err(SourceFault::LateFrameSync)
        );
        assert_eq!(src.capture_half(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf[..4], &[5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn mock_source_tracks_control_calls() {
        let mut src = MockSampleSource::new();
        let observer = src.clone();
        src.configure(profile_for(CaptureMode::Tdm)).await.unwrap();
        src.start().await.unwrap();
        assert!(observer.is_running());
        src.stop().await.unwrap();
        src.abort();
        assert_eq!(observer.stop_count(), 1);
        assert_eq!(observer.abort_count(), 1);
        assert!(!observer.is_running());
    }

    #[tokio::test]
    async fn mem_disk_round_trips_sectors() {
        let mut disk = MemDisk::new(64);
        let data = [0xA5u8; SECTOR_LEN];
        disk.write(3, &data).await.unwrap();
        let mut back = [0u8; SECTOR_LEN];
        disk.read(3, &mut back).await.unwrap();
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn mem_disk_injected_write_failures() {
        let mut disk = MemDisk::new(8);
        disk.fail_next_writes(1);
        let data = [0u8; SECTOR_LEN];
        assert_eq!(disk.write(0, &data).await, Err(DiskError::Io));
        assert!(disk.write(0, &data).await.is_ok());
    }

    #[tokio::test]
    async fn mem_disk_not_ready_reports_status() {
        let mut disk = MemDisk::new(8);
        disk.set_not_ready(true);
        assert!(!disk.status().is_ready());
        let mut buf = [0u8; SECTOR_LEN];
        assert_eq!(disk.read(0, &mut buf).await, Err(DiskError::NotReady));
    }

    #[tokio::test]
    async fn mem_disk_rejects_partial_sectors() {
        let mut disk = MemDisk::new(8);
        let mut buf = [0u8; 100];
        assert_eq!(disk.read(0, &mut buf).await, Err(DiskError::ParamError));
    }
}
