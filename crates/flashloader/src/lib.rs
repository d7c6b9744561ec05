//! Flash-loader personality: device descriptor ABI.
//!
//! When the firmware is built as an external loader, the programmer tool
//! locates a `StorageInfo` record in the `.dev_info` ELF section and reads
//! it with a fixed byte layout. That layout is host-visible ABI and cannot
//! change; everything here exists to pin it down:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 100  | device name, null-terminated ASCII |
//! | 100    | 2    | device type code |
//! | 102    | 2    | padding (natural alignment) |
//! | 104    | 4    | device start address |
//! | 108    | 4    | device size |
//! | 112    | 4    | page size |
//! | 116    | 1    | erase value |
//! | 117    | 3    | padding |
//! | 120    | 4    | page-program time (units of 100 µs) |
//! | 124    | 4    | sector-erase time (ms) |
//! | 128    | 4    | chip-erase time (ms) |
//! | 132    | 8×10 | sector-info array {size, count}, {0,0}-terminated |
//!
//! All multi-byte fields little-endian; the struct uses natural alignment —
//! NOT packed. The programming engine itself (QSPI command sequencing) is a
//! separate concern wired only into loader builds.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown)]

/// Device type codes understood by the programmer tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum DeviceType {
    /// On-chip flash.
    McuFlash = 1,
    /// NAND flash.
    NandFlash = 2,
    /// Parallel NOR flash.
    NorFlash = 3,
    /// Static RAM.
    Sram = 4,
    /// Pseudo-static RAM.
    Psram = 5,
    /// PC card.
    PcCard = 6,
    /// Serial (SPI/QSPI) NOR flash.
    SpiFlash = 7,
    /// I2C flash.
    I2cFlash = 8,
    /// SDRAM.
    Sdram = 9,
    /// I2C EEPROM.
    I2cEeprom = 10,
}

/// One `{size, count}` entry of the sector geometry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SectorInfo {
    /// Sector size in bytes.
    pub sector_size: u32,
    /// Number of sectors of this size.
    pub sector_count: u32,
}

impl SectorInfo {
    /// The `{0, 0}` terminator.
    pub const END: Self = Self {
        sector_size: 0,
        sector_count: 0,
    };
}

/// Number of entries in the sector geometry table (including terminator
/// space).
pub const SECTOR_TABLE_LEN: usize = 10;

/// The programmer-visible device descriptor. Natural alignment, not packed;
/// the padding the table above shows is exactly what `repr(C)` inserts.
#[repr(C)]
pub struct StorageInfo {
    /// Device name, null-terminated ASCII.
    pub device_name: [u8; 100],
    /// Device type code (see [`DeviceType`]).
    pub device_type: u16,
    /// Base address the device is mapped at.
    pub device_start_address: u32,
    /// Device size in bytes.
    pub device_size: u32,
    /// Programming page size in bytes.
    pub page_size: u32,
    /// Memory content after erase.
    pub erased_value: u8,
    /// Page-program time in units of 100 µs.
    pub page_program_time: u32,
    /// Sector-erase time in milliseconds.
    pub sector_erase_time_ms: u32,
    /// Chip-erase time in milliseconds.
    pub chip_erase_time_ms: u32,
    /// Sector geometry, terminated by `{0, 0}`.
    pub sectors: [SectorInfo; SECTOR_TABLE_LEN],
}

/// Build the 100-byte null-padded name field from an ASCII string.
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)] // Safety: i < 99 < both lengths
const fn name_field(name: &str) -> [u8; 100] {
    let bytes = name.as_bytes();
    let mut out = [0u8; 100];
    let mut i = 0;
    // Leave at least one trailing null.
    while i < bytes.len() && i < 99 {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Descriptor for the W25Q256 QSPI NOR behind the STM32H750's QUADSPI
/// bank 1 mapping.
///
/// Timing values carry generous margin over the datasheet typicals
/// (page program ~0.4 ms, 4 KiB sector erase ~45 ms, chip erase ~80 s).
pub const W25Q256_DEVICE: StorageInfo = StorageInfo {
    device_name: name_field("W25Q256_STM32H750"),
    device_type: DeviceType::SpiFlash as u16,
    device_start_address: 0x9000_0000,
    device_size: 0x0200_0000, // 32 MiB (256 Mbit)
    page_size: 0x100,
    erased_value: 0xFF,
    page_program_time: 10,
    sector_erase_time_ms: 50,
    chip_erase_time_ms: 100_000,
    sectors: [
        SectorInfo {
            sector_size: 0x1000,
            sector_count: 0x2000, // 32 MiB / 4 KiB
        },
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
        SectorInfo::END,
    ],
};

/// The descriptor instance the programmer tool reads.
///
/// `.dev_info` placement and the un-mangled name are what the tool's ELF
/// scan looks for.
#[no_mangle]
#[link_section = ".dev_info"]
#[used]
#[allow(non_upper_case_globals)] // the tool scans for this exact symbol name
pub static StorageInfo: StorageInfo = W25Q256_DEVICE;
