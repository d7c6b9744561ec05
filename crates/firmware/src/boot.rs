//! Hardware boot sequence for the PCM ingest node.
//!
//! Initialization order (MUST be respected — order matters for correctness):
//!   1. Configure MPU (mark the capture DMA ring non-cacheable + shareable)
//!   2. Enable D-cache (now safe because the DMA ring is excluded)
//!   3. Enable I-cache
//!   4. Configure RCC: HSI → PLL1 (400 MHz sysclk), HSI48 + CRS for SDMMC1
//!   5. Arm IWDG
//!   6. Start Embassy executor, spawn the pipeline tasks
//!
//! # Safety
//! These steps must run from privileged mode before any RTOS tasks start.

use platform::mpu::IngestMpuConfig;

/// Ordered list of boot sequence steps for documentation and testing.
///
/// The ordering of these strings encodes the required hardware
/// initialization sequence. Tests assert MPU < cache ordering, and firmware
/// main follows this list top to bottom.
///
/// # Correctness Invariants
///
/// - MPU must be configured BEFORE enabling D-cache (ST AN4838/AN4839).
///   Enabling D-cache first lets the cache serve stale data for the capture
///   DMA ring — silent sample corruption with no fault raised.
/// - HSI48 must be enabled before `embassy_stm32::init()` returns a usable
///   SDMMC1 (embassy-stm32 issue #3049: silent lockup otherwise).
/// - The IWDG cannot be stopped once unleashed; the heartbeat loop owns the
///   pet.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. MPU: mark the capture DMA ring non-cacheable before any DMA use",
    "2. D-cache: enable after MPU is configured (DMA ring safely excluded)",
    "3. I-cache: enable for instruction fetch performance",
    "4. RCC: HSI/PLL1 sysclk 400 MHz, HSI48+CRS for SDMMC1 (issue #3049)",
    "5. IWDG: arm the watchdog before spawning tasks",
    "6. Embassy executor: spawn audio, writer, shell tasks",
];

/// IWDG timeout. The heartbeat loop must pet at least this often.
pub const WATCHDOG_TIMEOUT_MS: u32 = 8_000;

/// Watchdog constructor argument (microseconds).
pub fn init_watchdog_config() -> u32 {
    WATCHDOG_TIMEOUT_MS.saturating_mul(1000)
}

/// The `(RBAR, RASR)` register pairs for the ingest MPU configuration.
///
/// Apply to the Cortex-M7 MPU in order, before the D-cache is enabled.
/// Pure math — computes register values without touching hardware.
#[must_use]
pub fn mpu_register_pairs() -> [(u32, u32); 1] {
    IngestMpuConfig::register_pairs()
}

/// HSI48 clock configuration note for hardware boot code.
///
/// Without HSI48, SDMMC `init_card()` silently hangs with no error code.
/// See embassy-stm32 issue #3049.
pub const SDMMC_HSI48_NOTE: &str =
    "SDMMC1 requires HSI48 clock. Enable via rcc.hsi48 before embassy_stm32::init().";

// ── Hardware application ─────────────────────────────────────────────────────

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Register-level application of the boot configuration.

    use super::mpu_register_pairs;

    /// Program the MPU regions and enable the MPU.
    ///
    /// Must run before `embassy_stm32::init()` enables the D-cache.
    pub fn apply_mpu_config() {
        let pairs = mpu_register_pairs();
        // SAFETY: boot context — single core, interrupts masked by reset
        // state, no DMA running yet. The register values were validated by
        // `platform::mpu::MpuRegion`.
        unsafe {
            let mpu = &*cortex_m::peripheral::MPU::PTR;
            cortex_m::asm::dmb();
            // Disable while programming.
            mpu.ctrl.write(0);
            for (rbar, rasr) in pairs {
                mpu.rbar.write(rbar);
                mpu.rasr.write(rasr);
            }
            // ENABLE | PRIVDEFENA: unmapped addresses keep the default map.
            mpu.ctrl.write(0b101);
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
    }

    /// Build the `embassy_stm32::Config` for the ingest node.
    ///
    /// Clock tree: HSI 64 MHz / DIV4 × MUL50 / DIV2 → 400 MHz sysclk;
    /// PLL1Q 100 MHz for peripheral kernels; HSI48 for SDMMC1.
    pub fn build_embassy_config() -> embassy_stm32::Config {
        use embassy_stm32::rcc::{
            AHBPrescaler, APBPrescaler, Hsi48Config, HSIPrescaler, Pll, PllDiv, PllMul,
            PllPreDiv, PllSource, Sysclk, VoltageScale,
        };

        let mut config = embassy_stm32::Config::default();
        config.rcc.hsi = Some(HSIPrescaler::DIV1);
        config.rcc.csi = true;
        // REQUIRED: SDMMC1 clocks from HSI48 — embassy-stm32 issue #3049.
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: false,
        });
        config.rcc.pll1 = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL50,
            divp: Some(PllDiv::DIV2), // 400 MHz sysclk
            divq: Some(PllDiv::DIV8), // 100 MHz kernel clock
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV2;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.apb3_pre = APBPrescaler::DIV2;
        config.rcc.apb4_pre = APBPrescaler::DIV2;
        config.rcc.voltage_scale = VoltageScale::Scale1;
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mpu_precedes_cache_in_the_boot_order() {
        let mpu = BOOT_SEQUENCE_STEPS
            .iter()
            .position(|s| s.contains("MPU"))
            .unwrap();
        let dcache = BOOT_SEQUENCE_STEPS
            .iter()
            .position(|s| s.contains("D-cache"))
            .unwrap();
        assert!(mpu < dcache, "MPU must be configured before D-cache enable");
    }

    #[test]
    fn watchdog_timeout_converts_to_micros() {
        assert_eq!(init_watchdog_config(), 8_000_000);
    }

    #[test]
    fn register_pairs_target_the_capture_ring() {
        let [(rbar, rasr)] = mpu_register_pairs();
        assert_eq!(rbar & 0xFFFF_FFE0, 0x2400_0000, "AXI SRAM base");
        assert_eq!(rasr & 1, 1, "region enabled");
    }
}
