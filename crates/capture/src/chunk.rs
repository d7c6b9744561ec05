//! The handoff-queue message type.
//!
//! A [`Chunk`] carries one completed DMA half-buffer by value: the sample
//! payload, its length, a monotonic millisecond timestamp, and which half it
//! came from. Ownership is linear — pump → queue → writer — transferred by
//! the enqueue copy and the dequeue move, so the writer can never observe a
//! half the DMA is still filling.

use platform::profile::HALF_BUFFER_BYTES_MAX;

/// Which half of the DMA double-buffer a chunk was copied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferHalf {
    /// First half: the half-complete DMA event.
    First,
    /// Second half: the full-complete DMA event (buffer wraps after it).
    Second,
}

impl BufferHalf {
    /// The half that strictly follows this one in capture order.
    pub fn toggled(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// One half-buffer of captured samples plus metadata.
///
/// Aligned to the D-cache line so the bulk copy out of the (non-cacheable)
/// DMA region never straddles a line shared with unrelated data.
#[derive(Clone)]
#[repr(align(32))]
pub struct Chunk {
    payload: [u8; HALF_BUFFER_BYTES_MAX],
    len: u32,
    timestamp_ms: u64,
    half: BufferHalf,
}

impl Chunk {
    /// Build a chunk by copying `data` (one half-buffer at the active
    /// profile) captured at `timestamp_ms` from `half`.
    ///
    /// `data` longer than the chunk capacity is truncated; profiles are
    /// sized so this cannot happen in a configured pipeline.
    pub fn new(half: BufferHalf, data: &[u8], timestamp_ms: u64) -> Self {
        let mut payload = [0u8; HALF_BUFFER_BYTES_MAX];
        let len = data.len().min(HALF_BUFFER_BYTES_MAX);
        #[allow(clippy::indexing_slicing)] // Safety: len <= both slice lengths by construction
        payload[..len].copy_from_slice(&data[..len]);
        #[allow(clippy::cast_possible_truncation)] // Safety: len <= HALF_BUFFER_BYTES_MAX
        let len = len as u32;
        Self {
            payload,
            len,
            timestamp_ms,
            half,
        }
    }

    /// The captured samples.
    #[allow(clippy::indexing_slicing)] // Safety: len <= HALF_BUFFER_BYTES_MAX invariant
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the chunk carries no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Monotonic capture timestamp in milliseconds.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Which DMA half the payload came from.
    pub fn half(&self) -> BufferHalf {
        self.half
    }
}
