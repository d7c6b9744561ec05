//! Hardware Abstraction Layer (HAL) for the PCM ingest node
//!
//! This crate provides trait-based abstractions for the hardware the capture
//! pipeline touches, enabling development and testing without physical
//! hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate)
//!         ↓
//! Pipeline Layers (capture, storage)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (Embassy HAL + PAC)
//! ```
//!
//! # Abstraction Levels
//!
//! ## High-Level Peripherals
//! - [`SampleSource`] - Synchronous-audio (SAI) slave receiver
//! - [`DiskIo`] - Removable block device (SD card) sector access
//!
//! ## Mid-Level Peripherals
//! - [`peripheral`] - UART abstraction for the control shell
//! - [`mpu`] - Memory protection region math
//! - [`dma_safety`] - DMA-reachable memory region knowledge
//!
//! # Features
//!
//! - `std`: Enable standard library support (for testing)
//! - `hardware`: Physical hardware implementations
//! - `defmt`: Enable defmt logging

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::missing_panics_doc)] // statically-valid expect() with safety comments
#![allow(clippy::must_use_candidate)] // hardware accessors — callers decide
#![allow(clippy::match_same_arms)] // intentional for readability in DMA access tables
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod blockdev;
pub mod dma_safety;
pub mod mpu;
pub mod peripheral;
pub mod profile;
pub mod sample_source;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

// Re-export main high-level traits
pub use blockdev::{classify_transfer, DiskError, DiskIo, DiskStatus, TransferRoute, SECTOR_LEN};
pub use profile::{CaptureMode, CaptureProfile, PROFILES};
pub use sample_source::{FrameSyncMonitor, SampleSource, SourceFault};

// Re-export peripheral types
pub use peripheral::{DataBits, Parity, StopBits, UartConfig, UartPeripheral};
