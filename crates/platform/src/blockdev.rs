//! Removable block-device (diskio) seam.
//!
//! [`DiskIo`] is the sector-level contract between the FAT plumbing and the
//! SD host controller: `initialize`, `status`, `read`, `write`, plus the
//! ioctl surface expressed as typed methods (`sync`, `sector_count`,
//! `sector_size`, `erase_block_size`, `trim`). The hardware backend routes
//! transfers through DMA; [`classify_transfer`] encodes its alignment policy:
//!
//! - caller buffer aligned to the cache line (32 B) → direct DMA
//! - misaligned single sector → staged through the adapter's bounce buffer
//! - misaligned multi-sector → refused with `ParamError`

/// Sector length in bytes. SDHC/SDXC cards expose 512-byte logical blocks.
pub const SECTOR_LEN: usize = 512;

/// DMA alignment the host controller requires of caller buffers, in bytes.
/// Matches the Cortex-M7 D-cache line so cache maintenance never clips a
/// neighbouring object.
pub const DMA_ALIGN: usize = 32;

/// Result of a failed disk operation. Mirrors the classic diskio result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiskError {
    /// Hard I/O error (transfer failed, CRC, timeout after recovery).
    #[error("disk I/O error")]
    Io,
    /// The medium is write protected.
    #[error("disk write protected")]
    WriteProtected,
    /// The drive has not been initialised or the card is absent.
    #[error("disk not ready")]
    NotReady,
    /// Invalid parameter — misaligned multi-sector buffer, bad LBA range,
    /// or a buffer length that is not a sector multiple.
    #[error("disk parameter error")]
    ParamError,
}

/// Drive status flags, as reported by [`DiskIo::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiskStatus {
    /// Drive has not completed initialisation.
    pub not_initialized: bool,
    /// No medium in the drive.
    pub no_disk: bool,
    /// Medium is write protected.
    pub write_protected: bool,
}

impl DiskStatus {
    /// A fully operational drive.
    pub const READY: Self = Self {
        not_initialized: false,
        no_disk: false,
        write_protected: false,
    };

    /// An uninitialised drive.
    pub const NOT_READY: Self = Self {
        not_initialized: true,
        no_disk: false,
        write_protected: false,
    };

    /// Whether the drive accepts read/write traffic.
    pub fn is_ready(&self) -> bool {
        !self.not_initialized && !self.no_disk
    }
}

/// An inclusive sector range, used by [`DiskIo::trim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SectorRange {
    /// First sector of the range.
    pub start: u32,
    /// Last sector of the range (inclusive).
    pub end: u32,
}

/// Sector-level access to the removable block device.
///
/// `read`/`write` transfer `buf.len() / SECTOR_LEN` contiguous sectors
/// starting at `lba`; `buf.len()` must be a non-zero multiple of
/// [`SECTOR_LEN`]. At most one transfer is in flight per device.
pub trait DiskIo {
    /// Bring the drive to a ready state. Idempotent.
    async fn initialize(&mut self) -> Result<(), DiskError>;

    /// Current drive status.
    fn status(&self) -> DiskStatus;

    /// Read whole sectors starting at `lba` into `buf`.
    async fn read(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DiskError>;

    /// Write whole sectors starting at `lba` from `buf`.
    async fn write(&mut self, lba: u32, buf: &[u8]) -> Result<(), DiskError>;

    /// Ensure any pending write has reached the medium.
    ///
    /// The SD host controller completes writes before returning, so the
    /// default implementation reports success for ready drives.
    async fn sync(&mut self) -> Result<(), DiskError> {
        if self.status().is_ready() {
            Ok(())
        } else {
            Err(DiskError::NotReady)
        }
    }

    /// Total number of addressable sectors.
    fn sector_count(&self) -> Result<u32, DiskError>;

    /// Sector size in bytes (always [`SECTOR_LEN`] for SDHC/SDXC).
    fn sector_size(&self) -> Result<u16, DiskError> {
        Ok(SECTOR_LEN as u16)
    }

    /// Erase block size in sectors.
    fn erase_block_size(&self) -> Result<u32, DiskError>;

    /// Best-effort hardware erase of a sector range. Drives without erase
    /// support report success without touching the medium.
    async fn trim(&mut self, range: SectorRange) -> Result<(), DiskError> {
        let _ = range;
        if self.status().is_ready() {
            Ok(())
        } else {
            Err(DiskError::NotReady)
        }
    }
}

// ─── Transfer routing policy ─────────────────────────────────────────────────

/// How a transfer request reaches the host controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferRoute {
    /// Caller buffer meets the controller's alignment; DMA directly.
    Direct,
    /// Single misaligned sector; stage through the bounce buffer.
    Bounce,
    /// Misaligned multi-sector request; refuse with `ParamError`.
    Refused,
}

/// Decide how a transfer of `sector_count` sectors from a buffer at
/// `buf_addr` is routed.
///
/// The policy keeps the bounce path bounded to one sector: a multi-sector
/// request from a misaligned buffer would need per-sector staging with no
/// latency bound, so it is refused instead — FAT layers retry with their own
/// aligned sector buffers.
pub fn classify_transfer(buf_addr: usize, sector_count: usize) -> TransferRoute {
    if sector_count == 0 {
        return TransferRoute::Refused;
    }
    if buf_addr % DMA_ALIGN == 0 {
        TransferRoute::Direct
    } else if sector_count == 1 {
        TransferRoute::Bounce
    } else {
        TransferRoute::Refused
    }
}

/// Validate a transfer buffer length, returning the sector count.
pub fn sector_count_for(buf_len: usize) -> Result<usize, DiskError> {
    if buf_len == 0 || buf_len % SECTOR_LEN != 0 {
        return Err(DiskError::ParamError);
    }
    Ok(buf_len / SECTOR_LEN)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn aligned_buffers_go_direct() {
        assert_eq!(classify_transfer(0x2400_0000, 1), TransferRoute::Direct);
        assert_eq!(classify_transfer(0x2400_0020, 8), TransferRoute::Direct);
    }

    #[test]
    fn misaligned_single_sector_bounces() {
        assert_eq!(classify_transfer(0x2400_0001, 1), TransferRoute::Bounce);
        assert_eq!(classify_transfer(0x2400_001F, 1), TransferRoute::Bounce);
    }

    #[test]
    fn misaligned_multi_sector_is_refused() {
        assert_eq!(classify_transfer(0x2400_0004, 2), TransferRoute::Refused);
        assert_eq!(classify_transfer(0x2400_0001, 128), TransferRoute::Refused);
    }

    #[test]
    fn zero_sectors_is_refused() {
        assert_eq!(classify_transfer(0x2400_0000, 0), TransferRoute::Refused);
    }

    #[test]
    fn sector_count_requires_whole_sectors() {
        assert_eq!(sector_count_for(512).unwrap(), 1);
        assert_eq!(sector_count_for(4096).unwrap(), 8);
        assert_eq!(sector_count_for(0), Err(DiskError::ParamError));
        assert_eq!(sector_count_for(511), Err(DiskError::ParamError));
        assert_eq!(sector_count_for(513), Err(DiskError::ParamError));
    }

    #[test]
    fn ready_status_flags() {
        assert!(DiskStatus::READY.is_ready());
        assert!(!DiskStatus::NOT_READY.is_ready());
        let no_disk = DiskStatus {
            not_initialized: false,
            no_disk: true,
            write_protected: false,
        };
        assert!(!no_disk.is_ready());
    }
}
