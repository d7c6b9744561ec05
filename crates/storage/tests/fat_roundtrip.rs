//! End-to-end FAT tests on an in-memory medium: format, mount, record-style
//! writes, remount, bit-exact read-back.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]

use embedded_io_async::Read;
use platform::mocks::MemDisk;
use storage::mount::{mount_or_format, remount, MountState, MountSupervisor};
use storage::sector_stream::FatVolumeIo;
use storage::store::{FatStore, RecordingStore};

/// 64 MiB: comfortably above the FAT32 cluster-count floor.
const TEST_DISK_SECTORS: u32 = 131_072;

/// Half-buffer of the stereo profile, in bytes.
const HALF_BYTES: usize = 2048;

fn half_pattern(half: usize) -> Vec<u8> {
    (0..HALF_BYTES).map(|i| ((i + half * 7) % 251) as u8).collect()
}

#[tokio::test]
async fn blank_medium_formats_and_mounts() {
    let disk = MemDisk::new(TEST_DISK_SECTORS);
    let mut sup = MountSupervisor::new();
    let io = FatVolumeIo::new(disk.clone()).await.unwrap();
    let fs = mount_or_format(io, &mut sup).await.unwrap();
    assert_eq!(sup.state(), MountState::Mounted);
    let stats = sup.last_stats().unwrap();
    assert!(stats.free_clusters > 0, "fresh volume has free space");
    storage::mount::unmount(fs, &mut sup).await;
    assert_eq!(sup.state(), MountState::NotMounted);
}

#[tokio::test]
async fn recording_survives_a_remount_bit_exact() {
    let disk = MemDisk::new(TEST_DISK_SECTORS);
    let mut sup = MountSupervisor::new();
    let name = "audio_2ch_16bit_16000Hz_001.pcm";

    // Session 1: format, mount, write four half-buffers, clean close.
    let written: Vec<u8> = {
        let io = FatVolumeIo::new(disk.clone()).await.unwrap();
        let fs = mount_or_format(io, &mut sup).await.unwrap();
        let mut store = FatStore::new(&fs);
        store.ensure_ready().await.unwrap();
        store.create(name).await.unwrap();

        let mut all = Vec::new();
        for half in 0..4 {
            let payload = half_pattern(half);
            store.write(&payload).await.unwrap();
            all.extend_from_slice(&payload);
        }
        store.close().await.unwrap();

        assert!(store.exists(name).await.unwrap());
        assert_eq!(store.size_of(name).await.unwrap(), all.len() as u64);
        drop(store);
        storage::mount::unmount(fs, &mut sup).await;
        all
    };

    // Session 2: fresh mount of the same medium; the bytes must match what
    // was captured, which is the on-disk form of the cache-coherency law.
    {
        let io = FatVolumeIo::new(disk.clone()).await.unwrap();
        let fs = mount_or_format(io, &mut sup).await.unwrap();
        let root = fs.root_dir();
        let mut file = root.open_file(name).await.unwrap();
        let mut back = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = file.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            back.extend_from_slice(&buf[..n]);
        }
        assert_eq!(back.len(), written.len());
        assert_eq!(back, written, "read-back must bit-match capture");
    }
}

#[tokio::test]
async fn long_recording_filenames_are_preserved() {
    let disk = MemDisk::new(TEST_DISK_SECTORS);
    let mut sup = MountSupervisor::new();
    let io = FatVolumeIo::new(disk.clone()).await.unwrap();
    let fs = mount_or_format(io, &mut sup).await.unwrap();
    let mut store = FatStore::new(&fs);

    // Both profile filename shapes, plus an incremented counter.
    for name in [
        "audio_2ch_16bit_16000Hz_001.pcm",
        "audio_8ch_16bit_16000Hz_002.pcm",
    ] {
        store.create(name).await.unwrap();
        store.write(&[0u8; 64]).await.unwrap();
        store.close().await.unwrap();
        assert!(store.exists(name).await.unwrap(), "{name} must exist");
    }
    assert!(!store.exists("audio_2ch_16bit_16000Hz_003.pcm").await.unwrap());
}

#[tokio::test]
async fn create_always_truncates_an_existing_recording() {
    let disk = MemDisk::new(TEST_DISK_SECTORS);
    let mut sup = MountSupervisor::new();
    let io = FatVolumeIo::new(disk.clone()).await.unwrap();
    let fs = mount_or_format(io, &mut sup).await.unwrap();
    let mut store = FatStore::new(&fs);
    let name = "audio_2ch_16bit_16000Hz_001.pcm";

    store.create(name).await.unwrap();
    store.write(&[0xAA; 4096]).await.unwrap();
    store.close().await.unwrap();

    store.create(name).await.unwrap();
    store.write(&[0x55; 16]).await.unwrap();
    store.close().await.unwrap();

    assert_eq!(store.size_of(name).await.unwrap(), 16);
}

#[tokio::test]
async fn forced_remount_recovers_a_live_volume() {
    let disk = MemDisk::new(TEST_DISK_SECTORS);
    let mut sup = MountSupervisor::new();

    let io = FatVolumeIo::new(disk.clone()).await.unwrap();
    let fs = mount_or_format(io, &mut sup).await.unwrap();
    {
        let mut store = FatStore::new(&fs);
        store.create("audio_2ch_16bit_16000Hz_001.pcm").await.unwrap();
        store.write(&[7u8; 512]).await.unwrap();
        store.close().await.unwrap();
    }

    // Remount over a fresh stream on the same medium.
    let fresh = FatVolumeIo::new(disk.clone()).await.unwrap();
    let fs = remount(fs, fresh, &mut sup).await.unwrap();
    assert_eq!(sup.state(), MountState::Mounted);

    let mut store = FatStore::new(&fs);
    assert!(store
        .exists("audio_2ch_16bit_16000Hz_001.pcm")
        .await
        .unwrap());
    assert_eq!(
        store.size_of("audio_2ch_16bit_16000Hz_001.pcm").await.unwrap(),
        512
    );
}

#[tokio::test]
async fn sync_commits_data_visible_after_unclean_drop() {
    let disk = MemDisk::new(TEST_DISK_SECTORS);
    let mut sup = MountSupervisor::new();
    let name = "audio_8ch_16bit_16000Hz_001.pcm";

    {
        let io = FatVolumeIo::new(disk.clone()).await.unwrap();
        let fs = mount_or_format(io, &mut sup).await.unwrap();
        let mut store = FatStore::new(&fs);
        store.create(name).await.unwrap();
        store.write(&half_pattern(0)).await.unwrap();
        store.sync().await.unwrap();
        // No close, no unmount: the session dies here, as it would on a
        // host-issued error event.
    }

    // The synced half must be present after a fresh mount (card reinserted).
    let io = FatVolumeIo::new(disk.clone()).await.unwrap();
    let fs = mount_or_format(io, &mut sup).await.unwrap();
    let mut store = FatStore::new(&fs);
    assert!(store.exists(name).await.unwrap());
    assert_eq!(store.size_of(name).await.unwrap(), HALF_BYTES as u64);
}
