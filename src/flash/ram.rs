//! In-memory NOR flash simulator
//!
//! Behaves like a real NOR part: erased bytes read 0xFF, writes can only
//! clear bits, erases work on whole sectors. Counts every operation so tests
//! can assert on physical writes, and can inject faults to simulate a power
//! cut in the middle of a write.

use super::{check_erase, check_range, program, Flash, FlashError, ERASED_BYTE};

/// Operation counters for a [`RamFlash`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashStats {
    /// Number of `read` calls
    pub reads: u64,
    /// Number of `write` calls
    pub writes: u64,
    /// Total bytes programmed
    pub bytes_written: u64,
    /// Number of `erase_sectors` calls
    pub erase_calls: u64,
    /// Total sectors erased
    pub sectors_erased: u64,
    /// Number of `init` calls
    pub inits: u64,
}

/// In-memory flash device
#[derive(Debug, Clone)]
pub struct RamFlash {
    /// Raw cell contents
    cells: Vec<u8>,
    /// Erase granularity
    sector_size: u32,
    /// Operation counters
    stats: FlashStats,
    /// Bytes that may still be programmed before writes start failing
    write_budget: Option<usize>,
    /// Fail the next erase request
    fail_next_erase: bool,
}

impl RamFlash {
    /// Create a fully erased device of `total_size` bytes
    pub fn new(total_size: u32, sector_size: u32) -> Self {
        Self::from_image(vec![ERASED_BYTE; total_size as usize], sector_size)
    }

    /// Create a device from an existing image (for crafting recovery scenarios)
    pub fn from_image(image: Vec<u8>, sector_size: u32) -> Self {
        Self {
            cells: image,
            sector_size,
            stats: FlashStats::default(),
            write_budget: None,
            fail_next_erase: false,
        }
    }

    /// Raw device contents
    pub fn image(&self) -> &[u8] {
        &self.cells
    }

    /// Mutable raw device contents. Bypasses NOR rules.
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Consume the device, returning its contents
    pub fn into_image(self) -> Vec<u8> {
        self.cells
    }

    /// Operation counters since creation or the last `reset_stats`
    pub fn stats(&self) -> FlashStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = FlashStats::default();
    }

    /// Allow only `bytes` more bytes to be programmed.
    ///
    /// A write crossing the budget programs the bytes that still fit and then
    /// fails, leaving a torn write behind.
    pub fn fail_after_bytes(&mut self, bytes: usize) {
        self.write_budget = Some(bytes);
    }

    /// Make the next `erase_sectors` call fail without erasing anything
    pub fn fail_next_erase(&mut self) {
        self.fail_next_erase = true;
    }

    /// Remove any injected faults
    pub fn clear_faults(&mut self) {
        self.write_budget = None;
        self.fail_next_erase = false;
    }

    /// Whether every byte in `[address, address + len)` reads as erased
    pub fn is_erased(&self, address: u32, len: usize) -> bool {
        let start = address as usize;
        self.cells
            .get(start..start + len)
            .is_some_and(|bytes| bytes.iter().all(|&b| b == ERASED_BYTE))
    }
}

impl Flash for RamFlash {
    fn init(&mut self) -> Result<(), FlashError> {
        self.stats.inits += 1;
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        check_range(address, buf.len(), self.total_size())?;
        let start = address as usize;
        buf.copy_from_slice(&self.cells[start..start + buf.len()]);
        self.stats.reads += 1;
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        check_range(address, data.len(), self.total_size())?;
        let start = address as usize;

        let (accepted, torn) = match self.write_budget {
            Some(budget) if budget < data.len() => (budget, true),
            _ => (data.len(), false),
        };

        program(
            &mut self.cells[start..start + accepted],
            &data[..accepted],
            address,
        )?;

        self.stats.writes += 1;
        self.stats.bytes_written += accepted as u64;
        if let Some(budget) = self.write_budget.as_mut() {
            *budget -= accepted;
        }

        if torn {
            return Err(FlashError::Injected("write budget exhausted"));
        }
        Ok(())
    }

    fn erase_sectors(&mut self, address: u32, count: u32) -> Result<(), FlashError> {
        let range = check_erase(address, count, self.sector_size, self.total_size())?;
        if std::mem::take(&mut self.fail_next_erase) {
            return Err(FlashError::Injected("erase failure"));
        }

        self.cells[range].fill(ERASED_BYTE);
        self.stats.erase_calls += 1;
        self.stats.sectors_erased += count as u64;
        Ok(())
    }

    fn total_size(&self) -> u32 {
        self.cells.len() as u32
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }
}
