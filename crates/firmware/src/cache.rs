//! D-cache maintenance for DMA on cacheable memory.
//!
//! The capture DMA ring is non-cacheable by MPU configuration and never
//! needs these. SD sector traffic is the opposite case: its buffers live in
//! ordinary cacheable RAM, so every DMA transfer is bracketed explicitly —
//! clean (write back) the source range before a DMA write, invalidate the
//! destination range before *and* after a DMA read (speculative loads can
//! repopulate lines while the transfer is in flight).
//!
//! Ranges must be 32-byte aligned and sized; the SD bounce buffer is
//! declared that way.

use platform::blockdev::DMA_ALIGN;

/// Clean (write back) the D-cache lines covering `buf`.
///
/// Call before starting a DMA transfer that reads from `buf`.
pub fn clean_dcache(buf: &[u8]) {
    debug_assert_eq!(buf.as_ptr() as usize % DMA_ALIGN, 0);
    // SAFETY: stealing the peripherals only to reach SCB cache maintenance;
    // these operations do not alias any driver-owned register state.
    let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
    scb.clean_dcache_by_address(buf.as_ptr() as usize, buf.len());
}

/// Invalidate the D-cache lines covering `buf`.
///
/// Call before starting, and again after completing, a DMA transfer that
/// writes into `buf`. The range must cover whole cache lines exclusively
/// owned by `buf`, or unrelated neighbouring data is lost.
pub fn invalidate_dcache(buf: &mut [u8]) {
    debug_assert_eq!(buf.as_ptr() as usize % DMA_ALIGN, 0);
    debug_assert_eq!(buf.len() % DMA_ALIGN, 0);
    // SAFETY: see above for the steal. The invalidate itself is sound
    // because the bounce buffer is cache-line aligned and sized, so no
    // neighbouring data shares its lines.
    let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
    unsafe {
        scb.invalidate_dcache_by_address(buf.as_ptr() as usize, buf.len());
    }
}
