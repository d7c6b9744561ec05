//! PCM ingest node firmware — main entry point.
//!
//! Hardware-only entry point for STM32H7 (Cortex-M7).

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::usart::{self, Uart};
use embassy_stm32::{bind_interrupts, peripherals, sdmmc};
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;

use capture::recorder::Recorder;
use firmware::sai::{SaiLink, SaiResources, RING_WORDS};
use firmware::sd::SdmmcDisk;
use firmware::tasks::{
    audio_task, shell_task, writer_task, ChunkScratch, IngestFs, RecorderMutex, VolumeIo,
    CAPTURE_QUEUE, SAI_CONTROL,
};
use platform::blockdev::DiskIo;
use platform::profile::CaptureMode;
use platform::peripheral::UartConfig;
use storage::mount::{mount_or_format, MountSupervisor};
use storage::partition::{first_volume_lba, OffsetDisk};
use storage::sector_stream::FatVolumeIo;
use storage::store::FatStore;

// Panic handler
use panic_probe as _;
// defmt transport
use defmt_rtt as _;

bind_interrupts!(struct Irqs {
    SDMMC1 => sdmmc::InterruptHandler<peripherals::SDMMC1>;
    USART3 => usart::InterruptHandler<peripherals::USART3>;
});

// Capture DMA ring in AXI SRAM — the MPU marks this region non-cacheable
// before the D-cache comes up, so neither the DMA nor the copy-out needs
// runtime cache maintenance. `.axisram` is NOLOAD: contents start
// undefined, which is fine — the DMA writes before anything reads.
#[link_section = ".axisram"]
static mut CAPTURE_RING: [u16; RING_WORDS] = [0u16; RING_WORDS];

static CHUNK_SCRATCH: StaticCell<ChunkScratch> = StaticCell::new();
static FILESYSTEM: StaticCell<IngestFs> = StaticCell::new();
static RECORDER: StaticCell<RecorderMutex> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Step 1: Configure the MPU BEFORE embassy_stm32::init() enables the
    // D-cache. Without this, the cache serves the capture ring as cacheable
    // memory and the recorded samples are silently corrupted.
    // References: ST AN4838/AN4839, ARM DDI0489F §B3.5.
    // See: firmware::boot::BOOT_SEQUENCE_STEPS for the full ordered list.
    firmware::boot::hardware::apply_mpu_config();

    defmt::info!("PCM ingest node v{=str}", env!("CARGO_PKG_VERSION"));
    defmt::info!("Initializing STM32H7 — Cortex-M7 @ 400 MHz");

    let p = embassy_stm32::init(firmware::boot::hardware::build_embassy_config());

    // Step 2: Arm the IWDG. Once unleashed it cannot be stopped — the
    // heartbeat loop below MUST pet it at least once per timeout period.
    let mut watchdog = embassy_stm32::wdg::IndependentWatchdog::new(
        p.IWDG1,
        firmware::boot::init_watchdog_config(),
    );
    watchdog.unleash();
    defmt::info!(
        "IWDG watchdog armed: timeout={=u32}ms",
        firmware::boot::WATCHDOG_TIMEOUT_MS
    );

    // Step 3: SDMMC1 in 4-bit mode. Clock source: HSI48 (enabled in
    // build_embassy_config — embassy-stm32 issue #3049).
    let sd = sdmmc::Sdmmc::new_4bit(
        p.SDMMC1, Irqs, p.PC12, // CLK
        p.PD2,  // CMD
        p.PC8, p.PC9, p.PC10, p.PC11, // D0-D3
        Default::default(),
    );
    let mut disk = SdmmcDisk::new(sd);

    // The node is useless without its medium: poll for the card, petting
    // the watchdog while we wait.
    while disk.initialize().await.is_err() {
        defmt::warn!("sd: card not ready, retrying");
        watchdog.pet();
        Timer::after_millis(500).await;
    }
    defmt::info!("sd: card ready, {=u32} sectors", disk.sector_count().unwrap_or(0));

    // Step 4: locate the FAT volume (MBR partition or superfloppy), mount
    // it — formatting a blank card FAT32 — and build the recording store.
    let base_lba = first_volume_lba(&mut disk).await.unwrap_or(0);
    defmt::info!("sd: volume base lba {=u32}", base_lba);
    let volume = OffsetDisk::new(disk, base_lba);
    let io: VolumeIo = match FatVolumeIo::new(volume).await {
        Ok(io) => io,
        Err(e) => {
            defmt::error!("sd: volume stream failed: {}", e);
            // Unrecoverable without the medium: let the IWDG reset us.
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    let mut supervisor = MountSupervisor::new();
    let fs = match mount_or_format(io, &mut supervisor).await {
        Ok(fs) => FILESYSTEM.init(fs),
        Err(e) => {
            defmt::error!("fs: mount failed: {}", e);
            loop {
                Timer::after_secs(1).await;
            }
        }
    };
    if let Some(stats) = supervisor.last_stats() {
        defmt::info!(
            "fs: mounted, {=u32} free clusters of {=u32} bytes",
            stats.free_clusters,
            stats.cluster_size
        );
    }

    // Step 5: the recorder singleton over the SAI control link and the
    // FAT-backed store.
    let store = FatStore::new(fs);
    let recorder = RECORDER.init(Mutex::new(Recorder::new(
        SaiLink::new(&SAI_CONTROL),
        store,
        CaptureMode::Stereo,
    )));

    // Step 6: shell UART (115200 8N1 — platform::UartConfig::shell_default).
    let shell_cfg = UartConfig::shell_default();
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = shell_cfg.baud_rate;
    let uart = match Uart::new(
        p.USART3, p.PD9, // RX
        p.PD8, // TX
        Irqs, p.DMA1_CH2, p.DMA1_CH3, uart_config,
    ) {
        Ok(uart) => uart,
        Err(_) => {
            defmt::error!("shell: UART init failed");
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    // Step 7: spawn the pipeline.
    // SAFETY: the only reference to the ring, taken once at boot and moved
    // into the audio task.
    let ring = unsafe { &mut *core::ptr::addr_of_mut!(CAPTURE_RING) };
    let scratch = CHUNK_SCRATCH.init(ChunkScratch::new());
    let sai_res = SaiResources {
        sai: p.SAI1,
        fs: p.PE4,
        sck: p.PE5,
        sd: p.PE6,
        dma: p.DMA1_CH0,
        ring,
    };
    spawner.must_spawn(audio_task(sai_res, recorder, scratch));
    spawner.must_spawn(writer_task(recorder, &CAPTURE_QUEUE));
    spawner.must_spawn(shell_task(uart, recorder, &CAPTURE_QUEUE));
    defmt::info!("pipeline tasks spawned — queue depth {=usize}", capture::QUEUE_DEPTH);

    // Main loop — heartbeat and watchdog.
    let mut tick = 0u32;
    loop {
        Timer::after(Duration::from_secs(1)).await;
        tick = tick.wrapping_add(1);
        if tick % 60 == 0 {
            let depth = CAPTURE_QUEUE.depth();
            let dropped = CAPTURE_QUEUE.dropped();
            defmt::debug!(
                "heartbeat tick={=u32} queue={=usize} dropped={=u32}",
                tick,
                depth,
                dropped
            );
        }
        // Must run at least once per WATCHDOG_TIMEOUT_MS (8 s); this 1 s
        // heartbeat leaves comfortable margin. If this loop stalls, the MCU
        // resets.
        watchdog.pet();
    }
}
