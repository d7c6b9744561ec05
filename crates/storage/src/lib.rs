//! FAT storage plumbing for the PCM ingest node.
//!
//! The capture pipeline persists raw PCM through three layers, top to
//! bottom:
//!
//! ```text
//! capture::writer / capture::recorder
//!         ↓  RecordingStore (store)
//! embedded-fatfs FileSystem
//!         ↓  byte stream (sector_stream::FatVolumeIo)
//! platform::DiskIo (SD host controller / in-memory mock)
//! ```
//!
//! [`mount`] owns the mount-once / forced-remount / format-on-blank
//! lifecycle; [`fattime`] provides the fixed-epoch FAT clock used when no RTC
//! is wired; [`partition`] locates the first MBR volume on cards that carry a
//! partition table.

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod fattime;
pub mod mount;
pub mod partition;
pub mod sector_stream;
pub mod store;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

pub use fattime::FixedClock;
pub use mount::{mount_or_format, remount, IngestFs, MountError, MountState, MountSupervisor};
pub use sector_stream::FatVolumeIo;
pub use store::{FatStore, RecordingStore, StoreError};
