//! MPU (Memory Protection Unit) configuration for STM32H7 / Cortex-M7
//!
//! # Purpose
//!
//! The Cortex-M7 has a 16 KB D-cache that is enabled early in boot. Any DMA
//! buffer in a cacheable memory region suffers **silent data corruption**
//! unless either:
//!   (a) The MPU marks the region as non-cacheable, OR
//!   (b) The software performs explicit cache maintenance around every
//!       transfer.
//!
//! The ingest node uses both, deliberately split by traffic pattern:
//!   - The audio capture DMA ring runs continuously at the half-period
//!     deadline; its region is marked **non-cacheable + shareable** here so
//!     the ISR-side copy never needs maintenance (approach (a)).
//!   - SD sector traffic is bursty and staged through the block-device
//!     adapter, which cleans/invalidates around each transfer (approach (b)).
//!
//! # References
//!
//! - ARM Cortex-M7 TRM DDI0489F — MPU Region Attribute and Size Register
//! - ST AN4838 — Introduction to MPU Management on STM32 MCUs
//! - ST AN4839 — Level 1 cache on STM32F7 and STM32H7
//!
//! # MPU Region Requirements (Cortex-M7, ARM DDI0489F §B3.5)
//!
//! - Minimum region size: **32 bytes** (SIZE field = 4)
//! - Size must be a **power of 2**
//! - Base address must be **aligned to the region size**
//! - ARM MPU SIZE field encoding: `SIZE = log2(size_bytes) − 1`
//!
//! # Memory Attribute Bits (TEX, S, C, B)
//!
//! For non-cacheable shareable DMA buffers: **TEX = 001, S = 1, C = 0, B = 0**
//! For strongly ordered (peripheral registers): **TEX = 000, S = 1, C = 0, B = 0**
//! For write-back, no write-allocate (normal cached RAM): **TEX = 000, S = 0, C = 1, B = 1**

/// MPU configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpuError {
    /// Region size is not a power of two (ARM MPU requirement: §B3.5 DDI0489F).
    SizeNotPowerOfTwo,
    /// Region size is zero.
    SizeZero,
    /// Base address is not aligned to the region size.
    ///
    /// ARM requires: `base_addr % size == 0`.
    AddressMisaligned,
    /// Region size is below the minimum 32-byte floor imposed by Cortex-M7 MPU.
    SizeTooSmall,
}

/// MPU memory attributes for a region.
///
/// These map to the TEX, S, C, B bit fields in the ARM MPU Region Attribute
/// and Size Register (RASR). See ARM DDI0489F §B3.5.4 for the encoding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpuAttributes {
    /// Strongly ordered — all accesses complete in program order, no
    /// buffering, no caching. Always shareable. Use for peripheral MMIO.
    ///
    /// TEX=000, S=1, C=0, B=0
    StronglyOrdered,

    /// Non-cacheable, shareable normal memory for CPU↔DMA shared buffers.
    ///
    /// TEX=001, S=1, C=0, B=0
    ///
    /// This is the attribute for the capture DMA ring. A cacheable policy on
    /// that region would let the D-cache serve stale sample data behind the
    /// DMA's back.
    NonCacheableShareable,

    /// Write-back, no write-allocate — normal cached RAM.
    ///
    /// TEX=000, S=0, C=1, B=1
    ///
    /// Use for code/data that is exclusively CPU-accessed with no DMA sharing.
    WriteBackNoWriteAllocate,

    /// Write-through, no write-allocate — conservative caching policy.
    ///
    /// TEX=000, S=0, C=1, B=0
    WriteThrough,
}

impl MpuAttributes {
    /// The `(TEX, S, C, B)` encoding for this attribute set.
    pub fn tex_s_c_b(&self) -> (u8, bool, bool, bool) {
        match self {
            Self::StronglyOrdered => (0b000, true, false, false),
            Self::NonCacheableShareable => (0b001, true, false, false),
            Self::WriteBackNoWriteAllocate => (0b000, false, true, true),
            Self::WriteThrough => (0b000, false, true, false),
        }
    }
}

/// A validated MPU region descriptor.
///
/// Construction via [`MpuRegion::new`] enforces the ARM Cortex-M7 MPU
/// alignment and size invariants at runtime so that callers cannot produce
/// an invalid hardware configuration.
#[derive(Debug, Clone, Copy)]
pub struct MpuRegion {
    base: u32,
    size: u32,
    attrs: MpuAttributes,
}

impl MpuRegion {
    /// Create a new MPU region, validating size and alignment.
    ///
    /// # Errors
    ///
    /// - [`MpuError::SizeZero`] if `size == 0`
    /// - [`MpuError::SizeTooSmall`] if `size < 32` (Cortex-M7 minimum)
    /// - [`MpuError::SizeNotPowerOfTwo`] if `size` is not a power of two
    /// - [`MpuError::AddressMisaligned`] if `base % size != 0`
    pub fn new(base: u32, size: u32, attrs: MpuAttributes) -> Result<Self, MpuError> {
        if size == 0 {
            return Err(MpuError::SizeZero);
        }
        if size < 32 {
            return Err(MpuError::SizeTooSmall);
        }
        if !size.is_power_of_two() {
            return Err(MpuError::SizeNotPowerOfTwo);
        }
        if base % size != 0 {
            return Err(MpuError::AddressMisaligned);
        }
        Ok(Self { base, size, attrs })
    }

    /// Encode the size as the ARM MPU `SIZE` field value (`log2(size) − 1`).
    ///
    /// The Cortex-M7 RASR register stores the region size as a 5-bit field
    /// where `SIZE = log2(size_in_bytes) − 1`. Because `size` must be a power
    /// of two, `log2(size)` is simply the number of trailing zero bits.
    ///
    /// Examples:
    /// - 32 B   = 2^5  → trailing_zeros = 5 → SIZE = 4
    /// - 16 KB  = 2^14 → trailing_zeros = 14 → SIZE = 13
    /// - 64 KB  = 2^16 → trailing_zeros = 16 → SIZE = 15
    /// - 512 KB = 2^19 → trailing_zeros = 19 → SIZE = 18
    ///
    /// # Errors
    ///
    /// - [`MpuError::SizeZero`] if `size == 0`
    /// - [`MpuError::SizeNotPowerOfTwo`] if `size` is not a power of two
    // trailing_zeros() returns u32; n fits in u8 for all valid MPU region sizes
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_size(size: u32) -> Result<u8, MpuError> {
        if size == 0 {
            return Err(MpuError::SizeZero);
        }
        if !size.is_power_of_two() {
            return Err(MpuError::SizeNotPowerOfTwo);
        }
        // size = 2^n  →  trailing_zeros = n  →  SIZE field = n - 1
        let n = size.trailing_zeros();
        // saturating_sub keeps a direct encode_size(1) call graceful even
        // though `new` already rejects size < 32.
        Ok((n as u8).saturating_sub(1))
    }

    /// Base address of this region.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Size of this region in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Exclusive end address of this region (`base + size`).
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // Safety: base + size fits u32 for valid MPU regions
    pub fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Memory attributes assigned to this region.
    #[must_use]
    pub fn attrs(&self) -> MpuAttributes {
        self.attrs
    }

    /// Check whether this region overlaps with `other`.
    ///
    /// Regions that share only a boundary point (end of one == start of the
    /// other) do NOT overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.base < other.end() && other.base < self.end()
    }

    /// Compute the `(RBAR, RASR)` register pair that programs this region
    /// into hardware slot `slot`.
    ///
    /// ## RBAR layout (ARM DDI0489F §B3.5)
    ///
    /// ```text
    /// [31:5]  ADDR   — region base address (upper 27 bits)
    /// [4]     VALID  — 1 = REGION field selects the slot
    /// [3:0]   REGION — hardware region slot number (0–15)
    /// ```
    ///
    /// ## RASR layout
    ///
    /// ```text
    /// [28]    XN     — Execute Never
    /// [26:24] AP     — 0b011 = full privileged+user RW
    /// [21:19] TEX / [18] S / [17] C / [16] B — memory type
    /// [15:8]  SRD    — 0 = all subregions enabled
    /// [5:1]   SIZE   — log2(region_bytes) − 1
    /// [0]     ENABLE
    /// ```
    #[allow(clippy::arithmetic_side_effects)] // Safety: shifts/ORs on masked fields
    pub fn register_pair(&self, slot: u8) -> Result<(u32, u32), MpuError> {
        let size_field = Self::encode_size(self.size)?;
        let rbar = (self.base & 0xFFFF_FFE0) | 0x10 | u32::from(slot & 0x0F);

        let (tex, s, c, b) = self.attrs.tex_s_c_b();
        let mut rasr: u32 = 1; // ENABLE
        rasr |= u32::from(size_field) << 1;
        rasr |= u32::from(b) << 16;
        rasr |= u32::from(c) << 17;
        rasr |= u32::from(s) << 18;
        rasr |= u32::from(tex) << 19;
        rasr |= 0b011 << 24; // AP: full access
        rasr |= 1 << 28; // XN: DMA buffers never hold code
        Ok((rbar, rasr))
    }
}

/// DMA controller variants present on STM32H743.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaController {
    /// DMA1 — general-purpose, D2 peripherals. Cannot reach D3 (SRAM4).
    Dma1,
    /// DMA2 — general-purpose, D2 peripherals. Cannot reach D3 (SRAM4).
    Dma2,
    /// BDMA — basic DMA, D3 domain. Can only reach SRAM4 (0x3800_0000).
    ///
    /// BDMA-only peripherals: SPI6, I2C4, LPUART1, ADC3, SAI4, DFSDM2.
    Bdma,
}

/// Named DMA-accessible (or inaccessible) memory regions on STM32H743.
///
/// Use [`DmaRegion::is_dma_accessible`] to check compatibility with a given
/// [`DmaController`] before placing DMA buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaRegion {
    /// DTCM — 128 KB at 0x2000_0000.
    ///
    /// Tightly-coupled to the Cortex-M7 core via a dedicated port. The AXI
    /// bus matrix (and therefore any DMA controller) **cannot reach DTCM**.
    /// Placing DMA buffers here causes silent failures: the DMA sees stale
    /// memory while the CPU sees correct data through its local path.
    Dtcm,

    /// AXI SRAM (D1 domain) — 512 KB at 0x2400_0000.
    ///
    /// Primary pool for DMA buffers: the SAI capture ring and SDMMC bounce
    /// sectors live here. DMA1 and DMA2 accessible; BDMA cannot reach it.
    AxiSram,

    /// SRAM1/SRAM2 (D2 domain) — 256 KB at 0x3000_0000.
    ///
    /// Task stacks, heapless collections. DMA1 and DMA2 accessible.
    Sram12,

    /// SRAM4 (D3 domain) — 64 KB at 0x3800_0000.
    ///
    /// Accessible **only** by BDMA. Required for buffers belonging to
    /// BDMA-only peripherals (SAI4 among them).
    Sram4,
}

impl DmaRegion {
    /// Base address of this region.
    #[must_use]
    pub fn base(&self) -> u32 {
        match self {
            Self::Dtcm => 0x2000_0000,
            Self::AxiSram => 0x2400_0000,
            Self::Sram12 => 0x3000_0000,
            Self::Sram4 => 0x3800_0000,
        }
    }

    /// Size of this region in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        match self {
            Self::Dtcm => 128 * 1024,
            Self::AxiSram => 512 * 1024,
            Self::Sram12 => 256 * 1024,
            Self::Sram4 => 64 * 1024,
        }
    }

    /// Return `true` if this region is accessible by `ctrl` for DMA transfers.
    ///
    /// | Region  | DMA1 | DMA2 | BDMA |
    /// |---------|------|------|------|
    /// | DTCM    | NO   | NO   | NO   |
    /// | AXI SRAM| YES  | YES  | NO   |
    /// | SRAM1/2 | YES  | YES  | NO   |
    /// | SRAM4   | NO   | NO   | YES  |
    #[must_use]
    pub fn is_dma_accessible(&self, ctrl: DmaController) -> bool {
        match (self, ctrl) {
            // DTCM: no DMA controller can reach it
            (Self::Dtcm, _) => false,
            // SRAM4: only BDMA
            (Self::Sram4, DmaController::Bdma) => true,
            (Self::Sram4, _) => false,
            // All other regions: DMA1/DMA2 yes, BDMA no
            (_, DmaController::Bdma) => false,
            (_, DmaController::Dma1 | DmaController::Dma2) => true,
        }
    }
}

/// Pre-computed MPU region plan for the ingest node.
///
/// Apply during hardware initialisation, **before** enabling the D-cache.
/// The capture DMA ring region must be non-cacheable before the SAI DMA
/// starts; everything else keeps the reset-default cached policy and relies
/// on explicit maintenance in the block-device adapter.
pub struct IngestMpuConfig;

impl IngestMpuConfig {
    /// Hardware slot used for the capture DMA ring region.
    pub const CAPTURE_RING_SLOT: u8 = 7;

    /// Capture DMA ring region — 16 KB at the bottom of AXI SRAM.
    ///
    /// Covers the SAI circular buffer (8 KB per half at the TDM profile).
    /// Non-cacheable + shareable, so neither the DMA writes nor the ISR-side
    /// copy-out ever need cache maintenance.
    ///
    /// Attributes: `NonCacheableShareable` (TEX=001, S=1, C=0, B=0)
    #[must_use]
    pub fn capture_ring_region() -> MpuRegion {
        // Safety: 0x2400_0000 is 16 KB-aligned; parameters are statically valid.
        #[allow(clippy::expect_used)]
        MpuRegion::new(0x2400_0000, 16 * 1024, MpuAttributes::NonCacheableShareable)
            .expect("capture ring MPU region parameters are statically valid")
    }

    /// SRAM4 non-cacheable BDMA region — 64 KB at 0x3800_0000.
    ///
    /// Only needed when the SAI4/BDMA wiring variant is used; the default
    /// build captures through SAI1/DMA1 out of AXI SRAM.
    ///
    /// Attributes: `NonCacheableShareable` (TEX=001, S=1, C=0, B=0)
    #[must_use]
    pub fn sram4_bdma_region() -> MpuRegion {
        // Safety: 0x3800_0000 is 64 KB-aligned; parameters are statically valid.
        #[allow(clippy::expect_used)]
        MpuRegion::new(0x3800_0000, 64 * 1024, MpuAttributes::NonCacheableShareable)
            .expect("SRAM4 MPU region parameters are statically valid")
    }

    /// The `(RBAR, RASR)` pairs to program, in slot order.
    #[must_use]
    pub fn register_pairs() -> [(u32, u32); 1] {
        // Safety: the region constructors above validate their parameters.
        #[allow(clippy::expect_used)]
        [Self::capture_ring_region()
            .register_pair(Self::CAPTURE_RING_SLOT)
            .expect("capture ring region encodes")]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_size() {
        let r = MpuRegion::new(0x2400_0000, 0, MpuAttributes::NonCacheableShareable);
        assert!(matches!(r, Err(MpuError::SizeZero)));
    }

    #[test]
    fn rejects_sub_32_byte_regions() {
        let r = MpuRegion::new(0x2400_0000, 16, MpuAttributes::NonCacheableShareable);
        assert!(matches!(r, Err(MpuError::SizeTooSmall)));
    }

    #[test]
    fn rejects_non_power_of_two() {
        let r = MpuRegion::new(0x2400_0000, 96 * 1024, MpuAttributes::NonCacheableShareable);
        assert!(matches!(r, Err(MpuError::SizeNotPowerOfTwo)));
    }

    #[test]
    fn rejects_misaligned_base() {
        let r = MpuRegion::new(0x2400_1000, 64 * 1024, MpuAttributes::NonCacheableShareable);
        assert!(matches!(r, Err(MpuError::AddressMisaligned)));
    }

    #[test]
    fn size_field_encoding() {
        assert_eq!(MpuRegion::encode_size(32).unwrap(), 4);
        assert_eq!(MpuRegion::encode_size(16 * 1024).unwrap(), 13);
        assert_eq!(MpuRegion::encode_size(64 * 1024).unwrap(), 15);
        assert_eq!(MpuRegion::encode_size(512 * 1024).unwrap(), 18);
    }

    #[test]
    fn attribute_encodings_match_ddi0489f() {
        assert_eq!(
            MpuAttributes::NonCacheableShareable.tex_s_c_b(),
            (0b001, true, false, false)
        );
        assert_eq!(
            MpuAttributes::StronglyOrdered.tex_s_c_b(),
            (0b000, true, false, false)
        );
        assert_eq!(
            MpuAttributes::WriteBackNoWriteAllocate.tex_s_c_b(),
            (0b000, false, true, true)
        );
    }

    #[test]
    fn capture_ring_register_pair() {
        let region = IngestMpuConfig::capture_ring_region();
        let (rbar, rasr) = region
            .register_pair(IngestMpuConfig::CAPTURE_RING_SLOT)
            .unwrap();
        // RBAR: base | VALID | slot 7
        assert_eq!(rbar, 0x2400_0017);
        // RASR: ENABLE, SIZE=13 (16 KB), TEX=001 S=1 C=0 B=0, AP=011, XN
        assert_eq!(rasr & 1, 1, "ENABLE set");
        assert_eq!((rasr >> 1) & 0x1F, 13, "SIZE field");
        assert_eq!((rasr >> 19) & 0b111, 0b001, "TEX");
        assert_eq!((rasr >> 18) & 1, 1, "S");
        assert_eq!((rasr >> 17) & 1, 0, "C");
        assert_eq!((rasr >> 16) & 1, 0, "B");
        assert_eq!((rasr >> 24) & 0b111, 0b011, "AP");
        assert_eq!((rasr >> 28) & 1, 1, "XN");
    }

    #[test]
    fn capture_ring_covers_largest_profile_buffer() {
        use crate::profile::TOTAL_BUFFER_BYTES_MAX;
        let region = IngestMpuConfig::capture_ring_region();
        assert!(region.size() as usize >= TOTAL_BUFFER_BYTES_MAX);
    }

    #[test]
    fn overlap_detection() {
        let a = MpuRegion::new(0x2400_0000, 64 * 1024, MpuAttributes::NonCacheableShareable)
            .unwrap();
        let b = MpuRegion::new(0x2401_0000, 64 * 1024, MpuAttributes::NonCacheableShareable)
            .unwrap();
        // Adjacent regions share only the boundary point.
        assert!(!a.overlaps(&b));
        let c = MpuRegion::new(0x2400_0000, 128 * 1024, MpuAttributes::NonCacheableShareable)
            .unwrap();
        assert!(a.overlaps(&c) && b.overlaps(&c));
    }

    #[test]
    fn dtcm_is_invisible_to_all_dma() {
        for ctrl in [DmaController::Dma1, DmaController::Dma2, DmaController::Bdma] {
            assert!(!DmaRegion::Dtcm.is_dma_accessible(ctrl));
        }
    }

    #[test]
    fn sram4_is_bdma_only() {
        assert!(DmaRegion::Sram4.is_dma_accessible(DmaController::Bdma));
        assert!(!DmaRegion::Sram4.is_dma_accessible(DmaController::Dma1));
        assert!(!DmaRegion::AxiSram.is_dma_accessible(DmaController::Bdma));
    }
}
