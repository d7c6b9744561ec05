//! Filesystem mount lifecycle.
//!
//! The volume is mounted exactly once at boot; every later consumer goes
//! through the mounted [`IngestFs`]. [`MountSupervisor`] tracks the
//! singleton's state:
//!
//! ```text
//! NotMounted ──mount ok──▶ Mounted ──access failure──▶ Error
//!      ▲                                                 │
//!      └───────────────── remount ◀───────────────────────┘
//! ```
//!
//! A blank or corrupted medium is formatted FAT32 with default parameters and
//! mounted again ([`mount_or_format`]). [`check`][MountSupervisor::check]
//! probes free space as a liveness test, the way the boot path verifies a
//! mount before declaring it good.

use embassy_time::Timer;
use embedded_fatfs::{format_volume, FatType, FileSystem, FormatVolumeOptions, FsOptions, LossyOemCpConverter};
use embedded_io_async::{Read, Seek, SeekFrom, Write};

use crate::fattime::FixedClock;

/// The mounted filesystem type used throughout the ingest node.
pub type IngestFs<IO> = FileSystem<IO, FixedClock, LossyOemCpConverter>;

/// Settle delay between unmount and mount during a forced remount.
pub const REMOUNT_SETTLE_MS: u64 = 200;

/// Volume label stamped when this firmware formats a blank card.
const VOLUME_LABEL: [u8; 11] = *b"PCM INGEST ";

/// Mount lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountState {
    /// No volume mounted.
    NotMounted,
    /// Volume mounted and last probe succeeded.
    Mounted,
    /// A mount attempt or a later access failed.
    Error,
}

/// Errors from the mount lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountError {
    /// The medium did not respond (absent card, dead controller).
    #[error("medium not ready")]
    NotReady,
    /// Formatting a blank medium failed.
    #[error("format failed")]
    FormatFailed,
    /// The FAT layer rejected the volume.
    #[error("mount failed")]
    MountFailed,
    /// The post-mount liveness probe failed.
    #[error("mount verification failed")]
    VerifyFailed,
}

/// Snapshot of the free-space probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VolumeStats {
    /// Cluster size in bytes.
    pub cluster_size: u32,
    /// Total clusters on the volume.
    pub total_clusters: u32,
    /// Free clusters on the volume.
    pub free_clusters: u32,
}

impl VolumeStats {
    /// Free space in bytes.
    pub fn free_bytes(&self) -> u64 {
        u64::from(self.cluster_size) * u64::from(self.free_clusters)
    }
}

/// Singleton state holder for the mount lifecycle.
#[derive(Debug, Default)]
pub struct MountSupervisor {
    state: MountState,
    last_stats: Option<VolumeStats>,
}

impl Default for MountState {
    fn default() -> Self {
        Self::NotMounted
    }
}

impl MountSupervisor {
    /// Create a supervisor in `NotMounted`.
    pub const fn new() -> Self {
        Self {
            state: MountState::NotMounted,
            last_stats: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Most recent successful free-space probe.
    pub fn last_stats(&self) -> Option<VolumeStats> {
        self.last_stats
    }

    /// Record a successful mount.
    pub fn mark_mounted(&mut self) {
        self.state = MountState::Mounted;
    }

    /// Record an unmount.
    pub fn mark_unmounted(&mut self) {
        self.state = MountState::NotMounted;
        self.last_stats = None;
    }

    /// Record a failed mount or access.
    pub fn mark_error(&mut self) {
        self.state = MountState::Error;
    }

    /// Probe the volume's free space as a liveness test.
    ///
    /// A failed probe transitions the supervisor to `Error`; the caller is
    /// expected to remount before the next access.
    pub async fn check<IO>(&mut self, fs: &IngestFs<IO>) -> Result<VolumeStats, MountError>
    where
        IO: Read + Write + Seek,
    {
        match fs.stats().await {
            Ok(stats) => {
                let snapshot = VolumeStats {
                    cluster_size: stats.cluster_size(),
                    total_clusters: stats.total_clusters(),
                    free_clusters: stats.free_clusters(),
                };
                self.last_stats = Some(snapshot);
                self.state = MountState::Mounted;
                Ok(snapshot)
            }
            Err(_) => {
                self.state = MountState::Error;
                Err(MountError::VerifyFailed)
            }
        }
    }
}

/// Does the stream start with something a FAT layer can mount?
///
/// Checks the boot signature and a plausible BPB. A `false` answer means the
/// medium is blank (or foreign) and will be formatted by
/// [`mount_or_format`].
#[allow(clippy::indexing_slicing)] // Safety: fixed offsets into a 512-byte array
async fn has_filesystem<IO>(io: &mut IO) -> Result<bool, MountError>
where
    IO: Read + Write + Seek,
{
    io.seek(SeekFrom::Start(0))
        .await
        .map_err(|_| MountError::NotReady)?;
    let mut sector = [0u8; 512];
    io.read_exact(&mut sector)
        .await
        .map_err(|_| MountError::NotReady)?;
    io.seek(SeekFrom::Start(0))
        .await
        .map_err(|_| MountError::NotReady)?;

    if sector[510] != 0x55 || sector[511] != 0xAA {
        return Ok(false);
    }
    let bytes_per_sector = u16::from_le_bytes([sector[11], sector[12]]);
    Ok(matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096))
}

/// Mount the volume, formatting a blank medium first.
///
/// The format uses FAT32 with default parameters, mirroring the
/// format-on-`no filesystem` boot behaviour. After mounting, the free-space
/// probe must succeed before the mount is declared good.
pub async fn mount_or_format<IO>(
    mut io: IO,
    supervisor: &mut MountSupervisor,
) -> Result<IngestFs<IO>, MountError>
where
    IO: Read + Write + Seek,
{
    if !has_filesystem(&mut io).await? {
        let options = FormatVolumeOptions::new()
            .fat_type(FatType::Fat32)
            .volume_label(VOLUME_LABEL);
        if format_volume(&mut io, options).await.is_err() {
            supervisor.mark_error();
            return Err(MountError::FormatFailed);
        }
        if io.seek(SeekFrom::Start(0)).await.is_err() {
            supervisor.mark_error();
            return Err(MountError::NotReady);
        }
    }

    let options = FsOptions::new().time_provider(FixedClock::new());
    let fs = match FileSystem::new(io, options).await {
        Ok(fs) => fs,
        Err(_) => {
            supervisor.mark_error();
            return Err(MountError::MountFailed);
        }
    };

    supervisor.check(&fs).await?;
    Ok(fs)
}

/// Forced remount: unmount, settle, mount again.
///
/// `fresh_io` must be a new stream over the same medium — the old one is
/// consumed by the unmount. Used whenever an SD access fails mid-session.
pub async fn remount<IO>(
    fs: IngestFs<IO>,
    fresh_io: IO,
    supervisor: &mut MountSupervisor,
) -> Result<IngestFs<IO>, MountError>
where
    IO: Read + Write + Seek,
{
    // Best effort: a failing unmount must not block the remount.
    let _ = fs.unmount().await;
    supervisor.mark_unmounted();
    Timer::after_millis(REMOUNT_SETTLE_MS).await;
    mount_or_format(fresh_io, supervisor).await
}

/// Unmount at shutdown.
pub async fn unmount<IO>(fs: IngestFs<IO>, supervisor: &mut MountSupervisor)
where
    IO: Read + Write + Seek,
{
    let _ = fs.unmount().await;
    supervisor.mark_unmounted();
}
