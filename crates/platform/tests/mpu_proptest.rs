//! Property tests for the MPU region math.

#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::unwrap_used)]

use platform::mpu::{MpuAttributes, MpuError, MpuRegion};
use proptest::prelude::*;

proptest! {
    /// encode_size inverts log2 for every legal region size.
    #[test]
    fn encode_size_matches_log2(exp in 5u32..=31u32) {
        let size = 1u32 << exp;
        let field = MpuRegion::encode_size(size).unwrap();
        prop_assert_eq!(u32::from(field), exp - 1);
    }

    /// Non-power-of-two sizes are always rejected.
    #[test]
    fn non_pow2_sizes_rejected(size in 33u32..=0x0FFF_FFFF) {
        prop_assume!(!size.is_power_of_two());
        prop_assert_eq!(MpuRegion::encode_size(size), Err(MpuError::SizeNotPowerOfTwo));
    }

    /// A region never accepts a base that is not size-aligned.
    #[test]
    fn misaligned_bases_rejected(exp in 5u32..=20u32, offset in 1u32..=31u32) {
        let size = 1u32 << exp;
        let base = 0x2400_0000u32 + offset; // 0x2400_0000 is aligned for all sizes here
        let r = MpuRegion::new(base, size, MpuAttributes::NonCacheableShareable);
        prop_assert!(matches!(r, Err(MpuError::AddressMisaligned)));
    }

    /// RBAR always preserves the base address bits and the requested slot.
    #[test]
    fn register_pair_roundtrip(exp in 5u32..=19u32, slot in 0u8..=15u8) {
        let size = 1u32 << exp;
        let base = 0x2400_0000u32 & !(size - 1);
        let region = MpuRegion::new(base, size, MpuAttributes::NonCacheableShareable).unwrap();
        let (rbar, rasr) = region.register_pair(slot).unwrap();
        prop_assert_eq!(rbar & 0xFFFF_FFE0, base);
        prop_assert_eq!(rbar & 0x0F, u32::from(slot));
        prop_assert_eq!(rbar & 0x10, 0x10, "VALID bit");
        prop_assert_eq!((rasr >> 1) & 0x1F, exp - 1, "SIZE field");
        prop_assert_eq!(rasr & 1, 1, "ENABLE");
    }
}
