//! Byte-stream adapter over the sector-level [`DiskIo`] seam.
//!
//! FAT layers consume `embedded-io-async` `Read + Write + Seek`.
//! [`FatVolumeIo`] provides that view of a block device:
//!
//! - whole-sector spans transfer directly between the caller's buffer and the
//!   device (the device backend applies its own DMA alignment policy),
//! - sub-sector spans stage through a single cached sector with write-back on
//!   eviction and explicit [`flush`](embedded_io_async::Write::flush).
//!
//! One instance owns one device; the FAT layer above serialises access, so at
//! most one transfer is ever in flight — the invariant the completion
//! semaphore of the hardware backend relies on.

use embedded_io::{ErrorKind, ErrorType, SeekFrom};
use embedded_io_async::{Read, Seek, Write};
use platform::blockdev::{DiskError, DiskIo, SECTOR_LEN};

/// Error type carried through the `embedded-io` traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamError(pub DiskError);

impl embedded_io::Error for StreamError {
    fn kind(&self) -> ErrorKind {
        match self.0 {
            DiskError::NotReady => ErrorKind::NotConnected,
            DiskError::ParamError => ErrorKind::InvalidInput,
            DiskError::WriteProtected => ErrorKind::PermissionDenied,
            DiskError::Io => ErrorKind::Other,
        }
    }
}

impl From<DiskError> for StreamError {
    fn from(e: DiskError) -> Self {
        Self(e)
    }
}

/// Sector-buffered byte stream over a [`DiskIo`] device.
pub struct FatVolumeIo<D: DiskIo> {
    disk: D,
    pos: u64,
    total_bytes: u64,
    cached_lba: Option<u32>,
    dirty: bool,
    sector: [u8; SECTOR_LEN],
}

// Safety: all position arithmetic is bounded by total_bytes, which is
// sector_count * SECTOR_LEN and fits u64 with orders of magnitude to spare.
#[allow(clippy::arithmetic_side_effects)]
#[allow(clippy::indexing_slicing)] // Safety: slice bounds derived from min() against buffer lengths
#[allow(clippy::cast_possible_truncation)] // Safety: lba = pos / SECTOR_LEN < sector_count: u32
impl<D: DiskIo> FatVolumeIo<D> {
    /// Initialise `disk` and wrap it. The device size is latched here; media
    /// swaps require constructing a fresh adapter (the remount path).
    pub async fn new(mut disk: D) -> Result<Self, DiskError> {
        disk.initialize().await?;
        let total_bytes = u64::from(disk.sector_count()?) * SECTOR_LEN as u64;
        Ok(Self {
            disk,
            pos: 0,
            total_bytes,
            cached_lba: None,
            dirty: false,
            sector: [0u8; SECTOR_LEN],
        })
    }

    /// Byte size of the underlying volume.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Access the wrapped device (status checks, trim).
    pub fn disk_mut(&mut self) -> &mut D {
        &mut self.disk
    }

    /// Write the cached sector back if it is dirty.
    async fn flush_cache(&mut self) -> Result<(), StreamError> {
        if self.dirty {
            if let Some(lba) = self.cached_lba {
                self.disk.write(lba, &self.sector).await?;
            }
            self.dirty = false;
        }
        Ok(())
    }

    /// Make `lba` the cached sector, evicting (write-back) any other.
    async fn load(&mut self, lba: u32) -> Result<(), StreamError> {
        if self.cached_lba == Some(lba) {
            return Ok(());
        }
        self.flush_cache().await?;
        self.disk.read(lba, &mut self.sector).await?;
        self.cached_lba = Some(lba);
        Ok(())
    }

    /// Drop the cache if it falls inside `lba .. lba + sectors`.
    fn discard_cache_in(&mut self, lba: u32, sectors: usize) {
        if let Some(cached) = self.cached_lba {
            if cached >= lba && u64::from(cached) < u64::from(lba) + sectors as u64 {
                self.cached_lba = None;
                self.dirty = false;
            }
        }
    }
}

impl<D: DiskIo> ErrorType for FatVolumeIo<D> {
    type Error = StreamError;
}

// Safety: see inherent impl — position arithmetic bounded by total_bytes.
#[allow(clippy::arithmetic_side_effects)]
#[allow(clippy::indexing_slicing)]
#[allow(clippy::cast_possible_truncation)]
impl<D: DiskIo> Read for FatVolumeIo<D> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() || self.pos >= self.total_bytes {
            return Ok(0);
        }
        let remaining = self.total_bytes - self.pos;
        let sector_off = (self.pos % SECTOR_LEN as u64) as usize;

        // Whole-sector fast path: direct transfer, no staging.
        if sector_off == 0 && buf.len() >= SECTOR_LEN {
            let sectors = (buf.len() / SECTOR_LEN).min((remaining / SECTOR_LEN as u64) as usize);
            if sectors > 0 {
                let lba = (self.pos / SECTOR_LEN as u64) as u32;
                let byte_len = sectors * SECTOR_LEN;
                self.flush_cache().await?;
                self.disk.read(lba, &mut buf[..byte_len]).await?;
                self.pos += byte_len as u64;
                return Ok(byte_len);
            }
        }

        // Sub-sector path: serve from the cached sector.
        let lba = (self.pos / SECTOR_LEN as u64) as u32;
        self.load(lba).await?;
        let n = buf
            .len()
            .min(SECTOR_LEN - sector_off)
            .min(remaining as usize);
        buf[..n].copy_from_slice(&self.sector[sector_off..sector_off + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

// Safety: see inherent impl — position arithmetic bounded by total_bytes.
#[allow(clippy::arithmetic_side_effects)]
#[allow(clippy::indexing_slicing)]
#[allow(clippy::cast_possible_truncation)]
impl<D: DiskIo> Write for FatVolumeIo<D> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.total_bytes {
            // The volume is a fixed-size device; there is nothing to grow.
            return Err(StreamError(DiskError::ParamError));
        }
        let remaining = self.total_bytes - self.pos;
        let sector_off = (self.pos % SECTOR_LEN as u64) as usize;

        // Whole-sector fast path.
        if sector_off == 0 && buf.len() >= SECTOR_LEN {
            let sectors = (buf.len() / SECTOR_LEN).min((remaining / SECTOR_LEN as u64) as usize);
            if sectors > 0 {
                let lba = (self.pos / SECTOR_LEN as u64) as u32;
                let byte_len = sectors * SECTOR_LEN;
                // A direct write supersedes any cached copy of those sectors.
                self.discard_cache_in(lba, sectors);
                self.disk.write(lba, &buf[..byte_len]).await?;
                self.pos += byte_len as u64;
                return Ok(byte_len);
            }
        }

        // Sub-sector path: read-modify-write through the cache.
        let lba = (self.pos / SECTOR_LEN as u64) as u32;
        self.load(lba).await?;
        let n = buf
            .len()
            .min(SECTOR_LEN - sector_off)
            .min(remaining as usize);
        self.sector[sector_off..sector_off + n].copy_from_slice(&buf[..n]);
        self.dirty = true;
        self.pos += n as u64;
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_cache().await?;
        self.disk.sync().await?;
        Ok(())
    }
}

// Safety: seek arithmetic checked; negative results rejected.
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_sign_loss)]
impl<D: DiskIo> Seek for FatVolumeIo<D> {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let target: i64 = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(delta) => (self.total_bytes as i64).saturating_add(delta),
            SeekFrom::Current(delta) => (self.pos as i64).saturating_add(delta),
        };
        if target < 0 {
            return Err(StreamError(DiskError::ParamError));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}
