//! Capture pipeline error taxonomy.
//!
//! Soft conditions (queue overflow, write reentry, sub-threshold late frame
//! sync) are counted and surfaced through status — they never appear here.
//! Everything in [`CaptureError`] drives the recorder into its error state.
//!
//! At the shell boundary errors collapse into process-style exit codes:
//! `0` success, negative families otherwise (see [`CaptureError::exit_code`]).

use platform::sample_source::SourceFault;
use storage::store::StoreError;

/// Fatal capture pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// The SD card or its controller is not ready.
    #[error("SD card not ready")]
    SdNotReady,
    /// The medium carries no mountable filesystem.
    #[error("no filesystem on medium")]
    NoFilesystem,
    /// Mounting (or remounting) the filesystem failed.
    #[error("filesystem mount failed")]
    MountFailed,
    /// Creating the recording file failed.
    #[error("file open failed")]
    FileOpenFailed,
    /// The open file handle stopped referencing a live filesystem object.
    #[error("file handle invalid")]
    FileInvalid,
    /// A data write failed or was short.
    #[error("write failed")]
    WriteFailed,
    /// Closing the recording file failed after all retries.
    #[error("file close failed")]
    FileCloseFailed,
    /// Starting the capture DMA failed.
    #[error("DMA start failed")]
    DmaStartFailed,
    /// The capture DMA did not stop inside its deadline.
    #[error("DMA stop timeout")]
    DmaStopTimeout,
    /// A fatal peripheral fault (overrun, wrong clock, bus error, or an
    /// escalated late frame sync).
    #[error("peripheral fault: {0}")]
    Peripheral(SourceFault),
    /// The requested operation conflicts with the current state.
    #[error("recorder busy")]
    Busy,
    /// A bounded wait elapsed.
    #[error("operation timed out")]
    Timeout,
}

impl CaptureError {
    /// Process-style exit code family for the shell.
    ///
    /// | Code | Family |
    /// |------|--------|
    /// | −1   | generic / timeout |
    /// | −2   | storage not ready / mount |
    /// | −3   | file lifecycle and data writes |
    /// | −4   | peripheral / DMA |
    /// | −5   | busy |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SdNotReady | Self::NoFilesystem | Self::MountFailed => -2,
            Self::FileOpenFailed
            | Self::FileInvalid
            | Self::WriteFailed
            | Self::FileCloseFailed => -3,
            Self::DmaStartFailed | Self::DmaStopTimeout | Self::Peripheral(_) => -4,
            Self::Busy => -5,
            Self::Timeout => -1,
        }
    }
}

impl From<SourceFault> for CaptureError {
    fn from(fault: SourceFault) -> Self {
        match fault {
            SourceFault::Timeout => Self::DmaStopTimeout,
            other => Self::Peripheral(other),
        }
    }
}

impl From<StoreError> for CaptureError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotReady => Self::SdNotReady,
            StoreError::NotOpen | StoreError::AlreadyOpen | StoreError::InvalidName => {
                Self::FileOpenFailed
            }
            StoreError::FileInvalid => Self::FileInvalid,
            StoreError::NoSpace | StoreError::Io => Self::WriteFailed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_into_families() {
        assert_eq!(CaptureError::SdNotReady.exit_code(), -2);
        assert_eq!(CaptureError::MountFailed.exit_code(), -2);
        assert_eq!(CaptureError::FileOpenFailed.exit_code(), -3);
        assert_eq!(CaptureError::WriteFailed.exit_code(), -3);
        assert_eq!(CaptureError::DmaStartFailed.exit_code(), -4);
        assert_eq!(
            CaptureError::Peripheral(SourceFault::Overrun).exit_code(),
            -4
        );
        assert_eq!(CaptureError::Busy.exit_code(), -5);
        assert_eq!(CaptureError::Timeout.exit_code(), -1);
    }

    #[test]
    fn source_faults_convert() {
        assert_eq!(
            CaptureError::from(SourceFault::WrongClock),
            CaptureError::Peripheral(SourceFault::WrongClock)
        );
        assert_eq!(
            CaptureError::from(SourceFault::Timeout),
            CaptureError::DmaStopTimeout
        );
    }

    #[test]
    fn store_errors_convert() {
        assert_eq!(CaptureError::from(StoreError::NotReady), CaptureError::SdNotReady);
        assert_eq!(
            CaptureError::from(StoreError::FileInvalid),
            CaptureError::FileInvalid
        );
        assert_eq!(CaptureError::from(StoreError::Io), CaptureError::WriteFailed);
    }
}
