//! DMA safety marker traits and buffer sizing constants for STM32H743.
//!
//! ## DMA Accessibility on STM32H743
//!
//! | Memory Region | Base Address | Size   | DMA1/2 | MDMA | BDMA | Use case |
//! |---------------|-------------|--------|--------|------|------|----------|
//! | AXI SRAM      | 0x2400_0000 | 512 KB | YES    | YES  | NO   | SAI capture ring, SDMMC bounce |
//! | SRAM1/2 (D2)  | 0x3000_0000 | 256 KB | YES    | YES  | NO   | Task stacks, queue storage |
//! | SRAM4 (D3)    | 0x3800_0000 | 64 KB  | NO     | NO   | YES  | SAI4/BDMA wiring variant |
//! | DTCM          | 0x2000_0000 | 128 KB | NO     | NO   | NO   | CPU-only: stack, ISR scratch |
//!
//! ## Usage
//! ```rust,ignore
//! use platform::dma_safety::CAPTURE_RING_BYTES;
//!
//! // DMA1/2-accessible capture ring (SAI1 wiring):
//! #[link_section = ".axisram"]
//! static CAPTURE_RING: StaticCell<[u16; CAPTURE_RING_BYTES / 2]> = StaticCell::new();
//! ```

use crate::profile::{HALF_BUFFER_BYTES_MAX, TOTAL_BUFFER_BYTES_MAX};

// ── Memory region addresses ──────────────────────────────────────────────────

/// Base address of AXI SRAM (DMA1/2/MDMA accessible, D1 domain).
pub const AXI_SRAM_BASE: u32 = 0x2400_0000;

/// Size of AXI SRAM in bytes (512 KB).
pub const AXI_SRAM_SIZE_BYTES: usize = 512 * 1024;

/// Base address of SRAM4 (BDMA-only, D3 domain).
pub const SRAM4_BASE: u32 = 0x3800_0000;

/// Size of SRAM4 in bytes (64 KB).
pub const SRAM4_SIZE_BYTES: usize = 64 * 1024;

/// True: DTCM is NOT DMA-accessible. Place no DMA buffers here.
///
/// DTCM (0x2000_0000, 128 KB) is tightly coupled to the Cortex-M7 CPU
/// and is invisible to all DMA controllers. Use for: stack, ISR scratch,
/// hot-path data that the CPU touches every cycle.
pub const DTCM_NOT_DMA_ACCESSIBLE: bool = true;

// ── Capture DMA constants ────────────────────────────────────────────────────

/// Size of the SAI capture double-buffer in bytes, sized for the largest
/// profile (8-channel TDM: 1024 frames × 16 bytes/frame = 16384).
pub const CAPTURE_RING_BYTES: usize = TOTAL_BUFFER_BYTES_MAX;

/// Size of one capture half-buffer in bytes (largest profile).
pub const CAPTURE_HALF_BYTES: usize = HALF_BUFFER_BYTES_MAX;

/// Cache line length of the Cortex-M7 D-cache, in bytes.
///
/// DMA buffers and the chunk payloads copied out of them are aligned to this
/// so maintenance operations never clip a neighbouring object.
pub const CACHE_LINE_BYTES: usize = 32;

// ── Marker traits ────────────────────────────────────────────────────────────

/// Marker trait: memory region accessible by DMA1, DMA2, and MDMA.
///
/// # Safety
/// Only implement for zero-sized types representing memory regions
/// that are physically accessible by the STM32H743 DMA controllers.
/// Incorrectly implementing this trait for DTCM will cause silent
/// DMA data corruption or bus faults.
///
/// Valid regions: AXI SRAM (D1), SRAM1/2 (D2).
pub unsafe trait DmaAccessible: Sized {}

/// Marker trait: memory region accessible by BDMA (D3 domain).
///
/// # Safety
/// BDMA can only access D3 SRAM4 (0x3800_0000, 64 KB).
/// DMA1/DMA2 cannot access SRAM4 — mixing them causes bus faults.
///
/// Peripherals requiring BDMA: SPI6, SAI4, LPUART1, I2C4, ADC3.
pub unsafe trait BdmaAccessible: DmaAccessible {}

// ── Region zero-sized types ──────────────────────────────────────────────────

/// Zero-sized type representing AXI SRAM (DMA1/DMA2/MDMA accessible).
///
/// Buffers placed here via `#[link_section = ".axisram"]`:
/// - SAI capture ring (ping-pong double buffer)
/// - SDMMC bounce sector
#[derive(Debug, Clone, Copy)]
pub struct AxiSramRegion;

// SAFETY: AXI SRAM at 0x2400_0000 is in the D1 domain, accessible by all
// DMA controllers (DMA1, DMA2, MDMA) per STM32H743 reference manual Table 3.
unsafe impl DmaAccessible for AxiSramRegion {}

/// Zero-sized type representing SRAM4 (BDMA-only, D3 domain).
///
/// Buffers placed here via `#[link_section = ".sram4"]`:
/// - SAI4 capture ring when the BDMA wiring variant is used
#[derive(Debug, Clone, Copy)]
pub struct Sram4Region;

// SAFETY: SRAM4 at 0x3800_0000 is in the D3 domain, accessible by BDMA only.
// It also satisfies DmaAccessible for type-system consistency, but NOTE:
// DMA1/DMA2 cannot actually access SRAM4 — use BDMA exclusively.
unsafe impl DmaAccessible for Sram4Region {}
unsafe impl BdmaAccessible for Sram4Region {}

/// Zero-sized type representing DTCM (CPU-only, NOT DMA-accessible).
///
/// DTCM is tightly coupled to the Cortex-M7 pipeline.
/// Use for: stack, interrupt handlers, hot-path data.
/// NEVER place DMA buffers here — they will not be transferred correctly.
#[derive(Debug, Clone, Copy)]
pub struct DtcmRegion;
// DtcmRegion intentionally does NOT implement DmaAccessible or BdmaAccessible.
