//! Tests for the flash simulators
//!
//! These tests verify:
//! - NOR programming rules (bits only clear, erase sets 0xFF)
//! - Bounds and alignment checks
//! - Operation counters and fault injection on RamFlash
//! - FileFlash image creation and persistence
//! - A store reopened from a FileFlash image

use flashkv::flash::FlashStats;
use flashkv::{Config, FileFlash, Flash, FlashError, NvmStore, RamFlash};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const TOTAL_SIZE: u32 = 16 * 1024;
const SECTOR_SIZE: u32 = 4096;

fn setup_temp_image() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("flash.img");
    (temp_dir, path)
}

// =============================================================================
// RamFlash Tests
// =============================================================================

#[test]
fn test_ram_flash_starts_erased() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    let mut buf = [0u8; 16];

    flash.read(100, &mut buf).unwrap();

    assert_eq!(buf, [0xFF; 16]);
    assert_eq!(flash.total_size(), TOTAL_SIZE);
    assert_eq!(flash.sector_size(), SECTOR_SIZE);
    assert!(flash.is_erased(0, TOTAL_SIZE as usize));
}

#[test]
fn test_ram_flash_write_clears_bits() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);

    flash.write(0, &[0b1111_0000]).unwrap();
    flash.write(0, &[0b1010_0000]).unwrap();

    assert_eq!(flash.image()[0], 0b1010_0000);
}

#[test]
fn test_ram_flash_rejects_setting_bits() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    flash.write(10, &[0x00, 0x0F]).unwrap();

    let result = flash.write(10, &[0x00, 0xFF]);

    assert!(matches!(result, Err(FlashError::NotErased { address: 11 })));
    assert_eq!(&flash.image()[10..12], &[0x00, 0x0F]);
}

#[test]
fn test_ram_flash_erase_restores_ff() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    flash.write(SECTOR_SIZE, &[0u8; 64]).unwrap();
    flash.write(2 * SECTOR_SIZE, &[0u8; 64]).unwrap();

    flash.erase_sectors(SECTOR_SIZE, 1).unwrap();

    assert!(flash.is_erased(SECTOR_SIZE, SECTOR_SIZE as usize));
    assert!(!flash.is_erased(2 * SECTOR_SIZE, 64));
}

#[test]
fn test_ram_flash_bounds_and_alignment() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    let mut buf = [0u8; 8];

    assert!(matches!(
        flash.read(TOTAL_SIZE - 4, &mut buf),
        Err(FlashError::OutOfBounds { .. })
    ));
    assert!(matches!(
        flash.write(TOTAL_SIZE, &[0]),
        Err(FlashError::OutOfBounds { .. })
    ));
    assert!(matches!(
        flash.erase_sectors(100, 1),
        Err(FlashError::Misaligned { .. })
    ));
    assert!(matches!(
        flash.erase_sectors(3 * SECTOR_SIZE, 2),
        Err(FlashError::OutOfBounds { .. })
    ));
}

#[test]
fn test_zero_sector_size_rejects_erase() {
    let mut flash = RamFlash::new(TOTAL_SIZE, 0);
    assert!(matches!(
        flash.erase_sectors(0, 1),
        Err(FlashError::Misaligned { sector_size: 0, .. })
    ));

    let (_temp_dir, path) = setup_temp_image();
    let mut flash = FileFlash::open(&path, TOTAL_SIZE, 0).unwrap();
    assert!(matches!(
        flash.erase_sectors(0, 1),
        Err(FlashError::Misaligned { sector_size: 0, .. })
    ));
}

#[test]
fn test_ram_flash_stats() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    let mut buf = [0u8; 4];

    flash.init().unwrap();
    flash.write(0, &[1, 2, 3]).unwrap();
    flash.read(0, &mut buf).unwrap();
    flash.erase_sectors(0, 2).unwrap();

    assert_eq!(
        flash.stats(),
        FlashStats {
            reads: 1,
            writes: 1,
            bytes_written: 3,
            erase_calls: 1,
            sectors_erased: 2,
            inits: 1,
        }
    );

    flash.reset_stats();
    assert_eq!(flash.stats(), FlashStats::default());
}

#[test]
fn test_ram_flash_torn_write() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    flash.fail_after_bytes(3);

    let result = flash.write(0, &[0u8; 8]);

    assert!(matches!(result, Err(FlashError::Injected(_))));
    assert_eq!(&flash.image()[0..3], &[0, 0, 0]);
    assert!(flash.is_erased(3, 5));

    // Budget exhausted: nothing more is programmed
    assert!(flash.write(16, &[0u8; 1]).is_err());
    assert!(flash.is_erased(16, 1));

    flash.clear_faults();
    flash.write(16, &[0u8; 1]).unwrap();
}

#[test]
fn test_ram_flash_erase_fault_is_one_shot() {
    let mut flash = RamFlash::new(TOTAL_SIZE, SECTOR_SIZE);
    flash.write(0, &[0u8; 4]).unwrap();
    flash.fail_next_erase();

    assert!(flash.erase_sectors(0, 1).is_err());
    assert!(!flash.is_erased(0, 4));

    flash.erase_sectors(0, 1).unwrap();
    assert!(flash.is_erased(0, 4));
}

// =============================================================================
// FileFlash Tests
// =============================================================================

#[test]
fn test_file_flash_creates_erased_image() {
    let (_temp, path) = setup_temp_image();

    let mut flash = FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), TOTAL_SIZE as u64);
    let mut buf = [0u8; 32];
    flash.read(TOTAL_SIZE - 32, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 32]);
    assert_eq!(flash.path(), path.as_path());
}

#[test]
fn test_file_flash_persists_writes() {
    let (_temp, path) = setup_temp_image();
    {
        let mut flash = FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();
        flash.write(4096, b"persist").unwrap();
    }

    let mut flash = FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();
    let mut buf = [0u8; 7];
    flash.read(4096, &mut buf).unwrap();

    assert_eq!(&buf, b"persist");
}

#[test]
fn test_file_flash_nor_rules() {
    let (_temp, path) = setup_temp_image();
    let mut flash = FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();

    flash.write(0, &[0x0F]).unwrap();
    assert!(matches!(
        flash.write(0, &[0xF0]),
        Err(FlashError::NotErased { address: 0 })
    ));

    flash.erase_sectors(0, 1).unwrap();
    flash.write(0, &[0xF0]).unwrap();

    let mut buf = [0u8; 1];
    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0xF0]);
}

#[test]
fn test_file_flash_rejects_size_mismatch() {
    let (_temp, path) = setup_temp_image();
    FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();

    let result = FileFlash::open(&path, 2 * TOTAL_SIZE, SECTOR_SIZE);

    assert!(matches!(result, Err(FlashError::Io(_))));
}

#[test]
fn test_store_on_file_flash_survives_reopen() {
    let (_temp, path) = setup_temp_image();
    {
        let flash = FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();
        let mut store = NvmStore::open(flash, Config::default()).unwrap();
        store.write(1, b"hello").unwrap();
        store.write(2, b"world").unwrap();
        store.write(1, b"bye!!").unwrap();
    }

    let flash = FileFlash::open(&path, TOTAL_SIZE, SECTOR_SIZE).unwrap();
    let mut store = NvmStore::open(flash, Config::default()).unwrap();

    assert_eq!(store.cursor(), 84);
    assert_eq!(store.get(1).unwrap(), Some(b"bye!!".to_vec()));
    assert_eq!(store.get(2).unwrap(), Some(b"world".to_vec()));
    assert_eq!(store.init_report().tombstones, 1);
}
