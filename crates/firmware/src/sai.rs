//! SAI slave receiver: the hardware sample source.
//!
//! SAI1 Block A runs as a synchronous slave receiver — the far side owns
//! BCLK and FS — with circular high-priority DMA into the capture ring in
//! non-cacheable AXI SRAM. Two wire formats are supported, selected by the
//! active profile:
//!
//! - standard-framed stereo: 32-bit frame, FS identifies the channel
//! - short-framed PCM/TDM: one-bit FS at frame start, 8 × 16-bit slots
//!
//! The ring is owned by the audio task. The recorder talks to it through
//! [`SaiLink`] (command/ack channels); the task's [`SaiRx`] wraps the
//! running driver for the pump's data path. Fault decode reads the SAI
//! status register directly (the HAL surfaces only the overrun) and clears
//! latched flags through CLRFR.
//!
//! A driver instance is rebuilt per capture session: dropping the Embassy
//! driver resets the peripheral, which is also the recovery path for a
//! stuck ring after an overrun.

use embassy_stm32::pac;
use embassy_stm32::peripherals::{DMA1_CH0, PE4, PE5, PE6, SAI1};
use embassy_stm32::sai::{
    self, ClockStrobe, Config, DataSize, FifoThreshold, FrameSyncDefinition, FrameSyncOffset,
    FrameSyncPolarity, MasterClockDivider, Mode, Protocol, Sai, SlotSize, StereoMono, TxRx,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use platform::profile::{CaptureProfile, SlotDataSize, WireProtocol, TOTAL_BUFFER_BYTES_MAX};
use platform::sample_source::{SampleSource, SourceFault, STOP_TIMEOUT_MS};

/// Capture ring length in 16-bit words (largest profile).
pub const RING_WORDS: usize = TOTAL_BUFFER_BYTES_MAX / 2;

/// Control requests from the recorder to the audio task.
#[derive(Debug, Clone, Copy)]
pub enum SaiCommand {
    /// Reconfigure for a profile (applies at the next start).
    Configure(&'static CaptureProfile),
    /// Build the driver and start circular reception.
    Start,
    /// Graceful stop with the 100 ms abort escalation.
    Stop,
}

/// Command/ack rendezvous between recorder and audio task.
pub struct SaiControl {
    /// Requests from the recorder.
    pub cmd: Channel<CriticalSectionRawMutex, SaiCommand, 2>,
    /// One ack per request, in order.
    pub ack: Channel<CriticalSectionRawMutex, Result<(), SourceFault>, 2>,
    /// Out-of-band abort; sync-signalled from error teardown.
    pub abort: Signal<CriticalSectionRawMutex, ()>,
}

impl SaiControl {
    /// Create the rendezvous.
    pub const fn new() -> Self {
        Self {
            cmd: Channel::new(),
            ack: Channel::new(),
            abort: Signal::new(),
        }
    }
}

/// The recorder-side handle: forwards control calls to the audio task.
///
/// The data path ([`SampleSource::capture_half`]) is never exercised on
/// this handle — the pump inside the audio task owns it — so it reports a
/// timeout if misused.
pub struct SaiLink {
    control: &'static SaiControl,
}

impl SaiLink {
    /// Create a handle bound to the audio task's rendezvous.
    pub fn new(control: &'static SaiControl) -> Self {
        Self { control }
    }

    async fn round_trip(&self, cmd: SaiCommand) -> Result<(), SourceFault> {
        self.control.cmd.send(cmd).await;
        self.control.ack.receive().await
    }
}

impl SampleSource for SaiLink {
    async fn configure(&mut self, profile: &CaptureProfile) -> Result<(), SourceFault> {
        // Profiles are 'static registry entries; forward the static ref.
        let profile = platform::profile::profile_for(profile.mode);
        self.round_trip(SaiCommand::Configure(profile)).await
    }

    async fn start(&mut self) -> Result<(), SourceFault> {
        self.round_trip(SaiCommand::Start).await
    }

    async fn stop(&mut self) -> Result<(), SourceFault> {
        self.round_trip(SaiCommand::Stop).await
    }

    fn abort(&mut self) {
        self.control.abort.signal(());
    }

    fn clear_faults(&mut self) {
        clear_fault_flags();
    }

    async fn capture_half(&mut self, _buf: &mut [u8]) -> Result<usize, SourceFault> {
        Err(SourceFault::Timeout)
    }
}

// ─── Fault decode ────────────────────────────────────────────────────────────

/// Decode latched SAI fault flags, most severe first.
///
/// Mirrors the peripheral error register: overrun/underrun share a flag and
/// direction disambiguates (this block only receives). Wrong-clock and the
/// frame-sync detectors latch until cleared.
pub fn decode_fault_flags() -> Option<SourceFault> {
    let sr = pac::SAI1.ch(0).sr().read();
    if sr.wckcfg() {
        return Some(SourceFault::WrongClock);
    }
    if sr.ovrudr() {
        // Receiver direction: an OVRUDR flag is an overrun.
        return Some(SourceFault::Overrun);
    }
    if sr.lfsdet() {
        return Some(SourceFault::LateFrameSync);
    }
    if sr.afsdet() {
        return Some(SourceFault::AnticipatedFrameSync);
    }
    if sr.cnrdy() {
        return Some(SourceFault::CodecNotReady);
    }
    None
}

/// Clear every latched SAI fault flag.
pub fn clear_fault_flags() {
    pac::SAI1.ch(0).clrfr().write(|w| {
        w.set_covrudr(true);
        w.set_cmutedet(true);
        w.set_cwckcfg(true);
        w.set_ccnrdy(true);
        w.set_cafsdet(true);
        w.set_clfsdet(true);
    });
}

// ─── Driver construction ─────────────────────────────────────────────────────

/// The peripherals the audio task owns for the life of the firmware.
pub struct SaiResources {
    /// The SAI peripheral.
    pub sai: SAI1,
    /// Frame sync in (slave).
    pub fs: PE4,
    /// Bit clock in (slave).
    pub sck: PE5,
    /// Serial data in.
    pub sd: PE6,
    /// Receive DMA channel.
    pub dma: DMA1_CH0,
    /// Capture ring in non-cacheable AXI SRAM.
    pub ring: &'static mut [u16; RING_WORDS],
}

/// SAI configuration for a capture profile.
fn sai_config(profile: &CaptureProfile) -> Config {
    let mut cfg = Config::default();
    cfg.mode = Mode::Slave;
    cfg.tx_rx = TxRx::Receiver;
    cfg.protocol = Protocol::Free;
    cfg.stereo_mono = StereoMono::Stereo;
    cfg.data_size = match profile.datasize {
        SlotDataSize::Bits16 => DataSize::Data16,
        SlotDataSize::Bits32 => DataSize::Data32,
    };
    cfg.slot_size = SlotSize::DataSize;
    cfg.slot_count = sai::word::U4(profile.channels);
    cfg.slot_enable = profile.slot_active_mask;
    cfg.clock_strobe = ClockStrobe::Rising;
    // Quarter-full threshold raises DMA requests early: continuous slave
    // reception tolerates far-side jitter better than waiting on FULL.
    cfg.fifo_threshold = FifoThreshold::Quarter;
    // Slave receiver: the divider is unused but must be valid.
    cfg.master_clock_divider = MasterClockDivider::MasterClockDisabled;

    let frame_bits = u8::try_from(
        u32::from(profile.channels) * u32::from(profile.bits_per_sample),
    )
    .unwrap_or(u8::MAX);
    cfg.frame_length = frame_bits;
    match profile.protocol {
        WireProtocol::StandardStereo => {
            // I2S: FS spans half the frame and identifies the channel,
            // asserted one bit before the slot, active low.
            cfg.frame_sync_definition = FrameSyncDefinition::ChannelIdentification;
            cfg.frame_sync_active_level_length = sai::word::U7(profile.bits_per_sample);
            cfg.frame_sync_offset = FrameSyncOffset::BeforeFirstBit;
            cfg.frame_sync_polarity = FrameSyncPolarity::ActiveLow;
        }
        WireProtocol::PcmShortFrame => {
            // PCM short frame: one-bit FS marks the start of the frame.
            cfg.frame_sync_definition = FrameSyncDefinition::StartOfFrame;
            cfg.frame_sync_active_level_length = sai::word::U7(1);
            cfg.frame_sync_offset = FrameSyncOffset::OnFirstBit;
            cfg.frame_sync_polarity = FrameSyncPolarity::ActiveHigh;
        }
    }
    cfg
}

/// A running capture session: the driver plus its half bookkeeping.
pub struct SaiRx<'a> {
    sai: Sai<'a, SAI1, u16>,
    half_samples: usize,
}

impl<'a> SaiRx<'a> {
    /// Build and start a receiver over the task's resources.
    ///
    /// The driver borrows `res` for the session; dropping the returned
    /// value resets the peripheral and releases the borrow.
    pub fn start(res: &'a mut SaiResources, profile: &CaptureProfile) -> SaiRx<'a> {
        let (sub_a, _sub_b) = sai::split_subblocks(&mut res.sai);
        let cfg = sai_config(profile);
        let half_samples = profile.half_buffer_samples() as usize;
        // The DMA ring uses the profile's span of the static ring buffer.
        let ring_len = profile.total_buffer_samples() as usize;
        #[allow(clippy::indexing_slicing)] // Safety: ring sized for the largest profile
        let ring = &mut res.ring[..ring_len];
        let mut sai = Sai::new_asynchronous(
            sub_a, &mut res.sck, &mut res.sd, &mut res.fs, &mut res.dma, ring, cfg,
        );
        sai.start();
        SaiRx { sai, half_samples }
    }
}

impl SampleSource for SaiRx<'_> {
    async fn configure(&mut self, _profile: &CaptureProfile) -> Result<(), SourceFault> {
        // Reconfiguration rebuilds the driver; see the audio task.
        Err(SourceFault::Timeout)
    }

    async fn start(&mut self) -> Result<(), SourceFault> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SourceFault> {
        // Graceful drain: let the in-flight half complete so its samples
        // reach the ring; the abort escalation is the timeout arm. The
        // peripheral itself resets when the session drops the driver.
        let deadline = Duration::from_millis(STOP_TIMEOUT_MS);
        let fifo_drained = async {
            while pac::SAI1.ch(0).sr().read().flvl().to_bits() != 0 {
                Timer::after_millis(1).await;
            }
        };
        with_timeout(deadline, fifo_drained)
            .await
            .map_err(|_| SourceFault::Timeout)
    }

    fn abort(&mut self) {}

    fn clear_faults(&mut self) {
        clear_fault_flags();
    }

    async fn capture_half(&mut self, buf: &mut [u8]) -> Result<usize, SourceFault> {
        let bytes = self.half_samples.saturating_mul(2);
        if buf.len() < bytes {
            return Err(SourceFault::Timeout);
        }
        // SAFETY: buf comes from the 32-byte-aligned chunk scratch static;
        // alignment (>= 2) and length (bytes <= buf.len(), even) hold, and
        // the u16 view is dropped before buf is used as bytes again.
        let words = unsafe {
            core::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<u16>(), self.half_samples)
        };
        match self.sai.read(words).await {
            Ok(()) => {
                // The ring itself can overrun between reads; surface the
                // latched flags the HAL does not report.
                if let Some(fault) = decode_fault_flags() {
                    return Err(fault);
                }
                Ok(bytes)
            }
            Err(_) => Err(decode_fault_flags().unwrap_or(SourceFault::Overrun)),
        }
    }
}
