//! MBR partition probing.
//!
//! rust-fatfs style FAT layers expect the volume to start at byte 0 of their
//! stream. SD cards out of the box usually carry an MBR with one FAT
//! partition; cards formatted by this firmware are superfloppies (the volume
//! starts at sector 0). [`first_volume_lba`] tells the two apart, and
//! [`OffsetDisk`] re-bases sector addressing onto the located volume.

use platform::blockdev::{DiskError, DiskIo, DiskStatus, SectorRange, SECTOR_LEN};

/// MBR partition types that contain a FAT volume.
const FAT_PARTITION_TYPES: [u8; 5] = [0x01, 0x04, 0x06, 0x0B, 0x0C];

/// Locate the first FAT volume on `disk`.
///
/// Returns the LBA the volume starts at:
/// - sector 0 has a FAT boot sector (superfloppy) → 0
/// - sector 0 is an MBR whose first entry is a FAT partition → its start LBA
/// - anything else (blank card, foreign filesystem) → 0, letting the mount
///   layer decide whether to format
pub async fn first_volume_lba<D: DiskIo>(disk: &mut D) -> Result<u32, DiskError> {
    let mut sector = [0u8; SECTOR_LEN];
    disk.read(0, &mut sector).await?;

    if sector[510] != 0x55 || sector[511] != 0xAA {
        // No boot signature at all: blank medium.
        return Ok(0);
    }

    // A FAT boot sector starts with a jump instruction and carries a
    // plausible bytes-per-sector; an MBR does not.
    let jump = sector[0];
    let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
    if (jump == 0xEB || jump == 0xE9)
        && matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096)
    {
        return Ok(0);
    }

    // Treat sector 0 as an MBR; inspect partition entry 0 at offset 446.
    let ptype = sector[450];
    if FAT_PARTITION_TYPES.contains(&ptype) {
        let start = u32::from_le_bytes([sector[454], sector[455], sector[456], sector[457]]);
        return Ok(start);
    }
    Ok(0)
}

/// A [`DiskIo`] view shifted by a fixed sector offset.
///
/// Wraps the raw card so the FAT layers see the partition as a whole device.
pub struct OffsetDisk<D: DiskIo> {
    inner: D,
    base_lba: u32,
}

impl<D: DiskIo> OffsetDisk<D> {
    /// Wrap `inner`, re-basing all sector addresses by `base_lba`.
    pub fn new(inner: D, base_lba: u32) -> Self {
        Self { inner, base_lba }
    }

    /// The sector offset applied to every access.
    pub fn base_lba(&self) -> u32 {
        self.base_lba
    }

    fn rebase(&self, lba: u32) -> Result<u32, DiskError> {
        self.base_lba.checked_add(lba).ok_or(DiskError::ParamError)
    }
}

impl<D: DiskIo> DiskIo for OffsetDisk<D> {
    async fn initialize(&mut self) -> Result<(), DiskError> {
        self.inner.initialize().await
    }

    fn status(&self) -> DiskStatus {
        self.inner.status()
    }

    async fn read(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DiskError> {
        let lba = self.rebase(lba)?;
        self.inner.read(lba, buf).await
    }

    async fn write(&mut self, lba: u32, buf: &[u8]) -> Result<(), DiskError> {
        let lba = self.rebase(lba)?;
        self.inner.write(lba, buf).await
    }

    async fn sync(&mut self) -> Result<(), DiskError> {
        self.inner.sync().await
    }

    fn sector_count(&self) -> Result<u32, DiskError> {
        Ok(self
            .inner
            .sector_count()?
            .saturating_sub(self.base_lba))
    }

    fn erase_block_size(&self) -> Result<u32, DiskError> {
        self.inner.erase_block_size()
    }

    async fn trim(&mut self, range: SectorRange) -> Result<(), DiskError> {
        let range = SectorRange {
            start: self.rebase(range.start)?,
            end: self.rebase(range.end)?,
        };
        self.inner.trim(range).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use platform::mocks::MemDisk;

    async fn write_sector0(disk: &mut MemDisk, patch: &[(usize, u8)]) {
        let mut sector = [0u8; SECTOR_LEN];
        for &(off, val) in patch {
            sector[off] = val;
        }
        disk.write(0, &sector).await.unwrap();
    }

    #[tokio::test]
    async fn blank_card_is_superfloppy() {
        let mut disk = MemDisk::new(64);
        assert_eq!(first_volume_lba(&mut disk).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn boot_sector_at_zero_is_superfloppy() {
        let mut disk = MemDisk::new(64);
        // Jump opcode + 512 bytes/sector + boot signature.
        write_sector0(
            &mut disk,
            &[(0, 0xEB), (11, 0x00), (12, 0x02), (510, 0x55), (511, 0xAA)],
        )
        .await;
        assert_eq!(first_volume_lba(&mut disk).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mbr_with_fat32_partition_yields_its_start() {
        let mut disk = MemDisk::new(64);
        // Partition entry 0: type 0x0C (FAT32 LBA) starting at sector 2048.
        write_sector0(
            &mut disk,
            &[
                (450, 0x0C),
                (454, 0x00),
                (455, 0x08), // 2048 little-endian
                (510, 0x55),
                (511, 0xAA),
            ],
        )
        .await;
        assert_eq!(first_volume_lba(&mut disk).await.unwrap(), 2048);
    }

    #[tokio::test]
    async fn mbr_with_foreign_partition_falls_back_to_zero() {
        let mut disk = MemDisk::new(64);
        write_sector0(&mut disk, &[(450, 0x83), (510, 0x55), (511, 0xAA)]).await;
        assert_eq!(first_volume_lba(&mut disk).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn offset_disk_rebases_all_access() {
        let raw = MemDisk::new(64);
        let mut base = raw.clone();
        let mut part = OffsetDisk::new(raw, 8);

        let data = [0x5Au8; SECTOR_LEN];
        part.write(1, &data).await.unwrap();

        // Visible at raw sector 9.
        let mut back = [0u8; SECTOR_LEN];
        base.read(9, &mut back).await.unwrap();
        assert_eq!(back, data);
        assert_eq!(part.sector_count().unwrap(), 64 - 8);
    }
}
