//! PCM ingest node firmware — STM32H7 target wiring.
//!
//! # Architecture
//!
//! ```text
//! Shell task (UART) ──┐
//!                     ▼
//!            capture::Recorder (mutex)
//!                     │ commands
//!                     ▼
//! Audio task (SAI1 slave RX, circular DMA)
//!                     │ chunks
//!                     ▼
//!            capture::CaptureQueue
//!                     │
//!                     ▼
//! Writer task → storage::FatStore → SDMMC
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for the STM32H7 target (Embassy HAL, defmt, IWDG)
//! - `std` - Host-side testing of the target-independent pieces
//!
//! ## Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// Logging discipline
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]

pub mod boot;
pub mod shell;

#[cfg(feature = "hardware")]
pub mod cache;
#[cfg(feature = "hardware")]
pub mod sai;
#[cfg(feature = "hardware")]
pub mod sd;
#[cfg(feature = "hardware")]
pub mod tasks;

pub use shell::LineBuffer;
