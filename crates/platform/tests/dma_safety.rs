//! Architecture tests: DMA safety marker traits.
//! These tests enforce compile-time guarantees about DMA buffer placement.

// Test files legitimately use arithmetic for verification; allow at file level.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
// Some imports are used only to verify trait/type accessibility at compile time.
#![allow(unused_imports)]
// Some assertions check documented compile-time constants for architectural correctness.
#![allow(clippy::assertions_on_constants)]

use platform::dma_safety::{
    AxiSramRegion, BdmaAccessible, DmaAccessible, Sram4Region, AXI_SRAM_BASE,
    AXI_SRAM_SIZE_BYTES, CACHE_LINE_BYTES, CAPTURE_HALF_BYTES, CAPTURE_RING_BYTES,
    DTCM_NOT_DMA_ACCESSIBLE, SRAM4_BASE, SRAM4_SIZE_BYTES,
};
use platform::profile::{profile_for, CaptureMode, PROFILES};

// Test 1: AxiSramRegion implements DmaAccessible
#[test]
fn axi_sram_region_implements_dma_accessible() {
    fn assert_dma_accessible<T: DmaAccessible>() {}
    assert_dma_accessible::<AxiSramRegion>();
    assert_eq!(core::mem::size_of::<AxiSramRegion>(), 0);
}

// Test 2: Sram4Region implements BdmaAccessible AND DmaAccessible
#[test]
fn sram4_region_implements_bdma_accessible() {
    fn assert_bdma_accessible<T: BdmaAccessible>() {}
    assert_bdma_accessible::<Sram4Region>();
}

// Test 3: DtcmRegion does NOT implement DmaAccessible (checked by documentation constant)
#[test]
fn dtcm_region_not_dma_accessible() {
    // The constant exists to document this architectural constraint.
    assert!(DTCM_NOT_DMA_ACCESSIBLE);
}

// Test 4: capture ring constants match the largest profile
#[test]
fn capture_ring_sized_for_largest_profile() {
    let largest = PROFILES
        .iter()
        .map(|p| p.total_buffer_bytes() as usize)
        .max()
        .unwrap_or(0);
    assert_eq!(CAPTURE_RING_BYTES, largest);
    assert_eq!(CAPTURE_HALF_BYTES, largest / 2);
}

// Test 5: the TDM profile is the sizing profile (8 ch × 2 B × 1024 frames)
#[test]
fn capture_ring_bytes_equals_16384() {
    assert_eq!(
        CAPTURE_RING_BYTES,
        profile_for(CaptureMode::Tdm).total_buffer_bytes() as usize
    );
    assert_eq!(CAPTURE_RING_BYTES, 16384);
}

// Test 6: ring and halves are cache-line multiples
#[test]
fn capture_ring_is_cache_line_aligned_size() {
    assert_eq!(CAPTURE_RING_BYTES % CACHE_LINE_BYTES, 0);
    assert_eq!(CAPTURE_HALF_BYTES % CACHE_LINE_BYTES, 0);
}

// Test 7: ring fits in AXI SRAM with comfortable margin
#[test]
fn capture_ring_fits_in_axisram() {
    // Ring + queue storage (6 chunks) + 64KB margin for stacks and statics.
    let queue_storage = 6 * (CAPTURE_HALF_BYTES + 64);
    let margin = 64 * 1024;
    assert!(
        CAPTURE_RING_BYTES + queue_storage + margin <= AXI_SRAM_SIZE_BYTES,
        "AXI SRAM budget exceeded: ring ({CAPTURE_RING_BYTES}) + queue ({queue_storage}) + margin ({margin})"
    );
}

// Test 8: region address constants are correct
#[test]
fn region_address_constants() {
    assert_eq!(AXI_SRAM_BASE, 0x2400_0000u32);
    assert_eq!(AXI_SRAM_SIZE_BYTES, 512 * 1024);
    assert_eq!(SRAM4_BASE, 0x3800_0000u32);
    assert_eq!(SRAM4_SIZE_BYTES, 64 * 1024);
}

// Test 9: a ring in SRAM4 (BDMA wiring variant) also fits
#[test]
fn capture_ring_fits_in_sram4() {
    assert!(CAPTURE_RING_BYTES <= SRAM4_SIZE_BYTES);
}
