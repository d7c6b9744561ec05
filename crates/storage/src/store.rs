//! Recording store seam.
//!
//! [`RecordingStore`] is the contract between the recorder/writer pair and
//! the filesystem: one recording file open at a time, created with
//! create-always semantics, written strictly append-only, committed by
//! `sync`/`close`. The FAT-backed [`FatStore`] is the production
//! implementation; `mocks::MockStore` drives the error paths in host tests.

use embedded_fatfs::{Error as FatError, File, LossyOemCpConverter};
use embedded_io_async::{Read, Seek, SeekFrom, Write};

use crate::fattime::FixedClock;
use crate::mount::IngestFs;

/// Errors surfaced by a [`RecordingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The backing medium or filesystem is not ready for access.
    #[error("store not ready")]
    NotReady,
    /// No recording file is open.
    #[error("no file open")]
    NotOpen,
    /// A recording file is already open; close it first.
    #[error("file already open")]
    AlreadyOpen,
    /// The open file handle no longer references a live filesystem object.
    #[error("file handle invalid")]
    FileInvalid,
    /// The requested name is not representable on the volume.
    #[error("invalid file name")]
    InvalidName,
    /// The volume ran out of space.
    #[error("volume full")]
    NoSpace,
    /// Any other filesystem or device failure.
    #[error("store I/O error")]
    Io,
}

impl<E: core::fmt::Debug> From<FatError<E>> for StoreError {
    fn from(e: FatError<E>) -> Self {
        match e {
            FatError::NotFound => Self::Io,
            FatError::AlreadyExists => Self::AlreadyOpen,
            FatError::CorruptedFileSystem => Self::FileInvalid,
            FatError::NotEnoughSpace => Self::NoSpace,
            FatError::InvalidFileNameLength | FatError::UnsupportedFileNameCharacter => {
                Self::InvalidName
            }
            _ => Self::Io,
        }
    }
}

/// Filesystem access contract for the recorder and writer.
///
/// Implementations hold at most one open file; the recorder serialises all
/// calls, so no internal locking is required.
pub trait RecordingStore {
    /// Verify the filesystem is live (free-space probe or equivalent).
    async fn ensure_ready(&mut self) -> Result<(), StoreError>;

    /// Create `name` with create-always semantics and leave it open.
    async fn create(&mut self, name: &str) -> Result<(), StoreError>;

    /// Append exactly `data.len()` bytes to the open file.
    async fn write(&mut self, data: &[u8]) -> Result<(), StoreError>;

    /// Commit file data and directory state to the medium.
    async fn sync(&mut self) -> Result<(), StoreError>;

    /// Sync and close the open file.
    async fn close(&mut self) -> Result<(), StoreError>;

    /// Whether `name` exists on the volume.
    async fn exists(&mut self, name: &str) -> Result<bool, StoreError>;

    /// Size of `name` in bytes. Only valid while the file is not open here.
    async fn size_of(&mut self, name: &str) -> Result<u64, StoreError>;

    /// Whether a recording file is currently open.
    fn is_open(&self) -> bool;
}

/// FAT-backed recording store borrowing a mounted [`IngestFs`].
pub struct FatStore<'fs, IO>
where
    IO: Read + Write + Seek,
{
    fs: &'fs IngestFs<IO>,
    file: Option<File<'fs, IO, FixedClock, LossyOemCpConverter>>,
}

impl<'fs, IO> FatStore<'fs, IO>
where
    IO: Read + Write + Seek,
{
    /// Create a store over a mounted filesystem with no file open.
    pub fn new(fs: &'fs IngestFs<IO>) -> Self {
        Self { fs, file: None }
    }
}

impl<'fs, IO> RecordingStore for FatStore<'fs, IO>
where
    IO: Read + Write + Seek,
{
    async fn ensure_ready(&mut self) -> Result<(), StoreError> {
        self.fs.stats().await.map_err(|_| StoreError::NotReady)?;
        Ok(())
    }

    async fn create(&mut self, name: &str) -> Result<(), StoreError> {
        if self.file.is_some() {
            return Err(StoreError::AlreadyOpen);
        }
        let root = self.fs.root_dir();
        let mut file = root.create_file(name).await?;
        // create-always: an existing file of the same name starts empty.
        file.truncate().await?;
        self.file = Some(file);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        file.write_all(data).await?;
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), StoreError> {
        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        let mut file = self.file.take().ok_or(StoreError::NotOpen)?;
        file.flush().await?;
        Ok(())
    }

    async fn exists(&mut self, name: &str) -> Result<bool, StoreError> {
        let root = self.fs.root_dir();
        match root.open_file(name).await {
            Ok(_) => Ok(true),
            Err(FatError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size_of(&mut self, name: &str) -> Result<u64, StoreError> {
        let root = self.fs.root_dir();
        let mut file = root.open_file(name).await?;
        let size = file.seek(SeekFrom::End(0)).await.map_err(|_| StoreError::Io)?;
        Ok(size)
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
