//! Embassy task wiring for the capture pipeline.
//!
//! Three tasks cooperate around the shared recorder mutex and the static
//! handoff queue:
//!
//! - [`audio_task`] owns the SAI peripheral and the capture ring; it
//!   services recorder control commands and pumps completed halves into the
//!   queue.
//! - [`writer_task`] drains the queue into the FAT store and emits the
//!   rate-limited overflow warnings (never from the capture path itself).
//! - [`shell_task`] runs the UART control shell.

use capture::pump::{pump_step, PumpEvent, PumpState};
use capture::queue::CaptureQueue;
use capture::recorder::Recorder;
use capture::writer::consume_chunk;
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use platform::profile::{profile_for, CaptureMode, CaptureProfile, HALF_BUFFER_BYTES_MAX};
use platform::sample_source::SourceFault;
use storage::partition::OffsetDisk;
use storage::sector_stream::FatVolumeIo;
use storage::store::FatStore;

use crate::sai::{SaiCommand, SaiControl, SaiLink, SaiResources, SaiRx};
use crate::sd::SdmmcDisk;
use crate::shell::hardware::{shell_loop, ShellUart};

/// The byte stream the FAT layer mounts: partition view over the SD card.
pub type VolumeIo = FatVolumeIo<OffsetDisk<SdmmcDisk>>;

/// The mounted filesystem singleton type.
pub type IngestFs = storage::mount::IngestFs<VolumeIo>;

/// The concrete recorder: SAI control link + FAT store.
pub type IngestRecorder = Recorder<SaiLink, FatStore<'static, VolumeIo>>;

/// The recorder singleton behind its pipeline mutex.
pub type RecorderMutex = Mutex<CriticalSectionRawMutex, IngestRecorder>;

/// The handoff queue singleton.
pub static CAPTURE_QUEUE: CaptureQueue = CaptureQueue::new();

/// The recorder ↔ audio-task rendezvous.
pub static SAI_CONTROL: SaiControl = SaiControl::new();

/// Cache-line-aligned scratch for one half-buffer copy-out.
#[repr(align(32))]
pub struct ChunkScratch(pub [u8; HALF_BUFFER_BYTES_MAX]);

impl ChunkScratch {
    /// Zeroed scratch.
    pub const fn new() -> Self {
        Self([0u8; HALF_BUFFER_BYTES_MAX])
    }
}

/// The audio task: owns the SAI resources, serves control commands, and
/// pumps capture halves while a session is running.
#[embassy_executor::task]
pub async fn audio_task(
    mut res: SaiResources,
    recorder: &'static RecorderMutex,
    scratch: &'static mut ChunkScratch,
) {
    let control = &SAI_CONTROL;
    let mut profile: &'static CaptureProfile = profile_for(CaptureMode::Stereo);

    loop {
        match control.cmd.receive().await {
            SaiCommand::Configure(p) => {
                profile = p;
                defmt::info!(
                    "sai: configured {=str} ({=u8} ch, {=u32} Hz)",
                    p.name,
                    p.channels,
                    p.sample_rate_hz
                );
                control.ack.send(Ok(())).await;
            }
            SaiCommand::Stop => {
                // Nothing running; stop is idempotent.
                control.ack.send(Ok(())).await;
            }
            SaiCommand::Start => {
                control.abort.reset();
                let mut pump = PumpState::new();
                let mut rx = SaiRx::start(&mut res, profile);
                defmt::info!("sai: capture started ({=str})", profile.name);
                control.ack.send(Ok(())).await;

                loop {
                    let step = pump_step(
                        &mut rx,
                        &mut pump,
                        scratch.0.as_mut_slice(),
                        recorder,
                        &CAPTURE_QUEUE,
                    );
                    match select3(control.cmd.receive(), control.abort.wait(), step).await {
                        Either3::First(SaiCommand::Stop) => {
                            let drained = rx.stop().await;
                            drop(rx);
                            if drained.is_err() {
                                defmt::warn!("sai: stop deadline missed, aborted");
                            }
                            control.ack.send(drained).await;
                            break;
                        }
                        Either3::First(_) => {
                            // Configure/Start mid-session: the recorder
                            // refuses these upstream; fail the straggler.
                            control.ack.send(Err(SourceFault::Timeout)).await;
                        }
                        Either3::Second(()) => {
                            defmt::warn!("sai: capture aborted");
                            drop(rx);
                            break;
                        }
                        Either3::Third(PumpEvent::Fatal(fault)) => {
                            defmt::error!("sai: fatal fault {}", fault);
                            drop(rx);
                            break;
                        }
                        Either3::Third(PumpEvent::Recovered(fault)) => {
                            defmt::warn!("sai: recovered fault {}", fault);
                        }
                        Either3::Third(_) => {}
                    }
                }
            }
        }
    }
}

/// The writer task: queue → FAT store, plus rate-limited drop warnings.
#[embassy_executor::task]
pub async fn writer_task(recorder: &'static RecorderMutex, queue: &'static CaptureQueue) -> ! {
    let mut reported_drops = 0u32;
    loop {
        let chunk = queue.recv().await;

        // Overflow accounting is ISR-side; the warning is emitted here, out
        // of the capture path, at most once per ten drops.
        let dropped = queue.dropped();
        if dropped != reported_drops && dropped % 10 == 1 {
            defmt::warn!("writer: queue overflow, {=u32} chunks dropped", dropped);
        }
        reported_drops = dropped;

        let mut rec = recorder.lock().await;
        let _ = consume_chunk(&mut rec, &chunk).await;
    }
}

/// The UART shell task.
#[embassy_executor::task]
pub async fn shell_task(
    mut uart: ShellUart,
    recorder: &'static RecorderMutex,
    queue: &'static CaptureQueue,
) -> ! {
    shell_loop(&mut uart, recorder, queue).await
}
