//! Flash Driver Module
//!
//! The raw flash interface the store is built on. The store never touches
//! flash electrically; it only issues logical read/write/erase calls through
//! the [`Flash`] trait.
//!
//! ## NOR Semantics
//! ```text
//! erase  : every byte of a sector      -> 0xFF
//! write  : new = old & data            (bits may only go 1 -> 0)
//! ```
//! Tombstoning a record relies on the second rule: zeroing a header that is
//! already programmed is a legal write without an erase.
//!
//! ## Implementations
//! - [`RamFlash`] - in-memory simulator with operation counters and fault
//!   injection, for tests and benchmarks
//! - [`FileFlash`] - flash image file on the host filesystem

mod file;
mod ram;

pub use file::FileFlash;
pub use ram::{FlashStats, RamFlash};

use thiserror::Error;

/// Value every byte reads back as after an erase
pub const ERASED_BYTE: u8 = 0xFF;

/// Errors reported by a flash driver
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("access of {len} bytes at {address:#010x} is outside the {size} byte device")]
    OutOfBounds { address: u32, len: usize, size: u32 },

    #[error("erase address {address:#010x} is not aligned to the {sector_size} byte sector size")]
    Misaligned { address: u32, sector_size: u32 },

    #[error("write at {address:#010x} would set bits that are already cleared")]
    NotErased { address: u32 },

    #[error("injected fault: {0}")]
    Injected(&'static str),

    #[error("flash image IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device geometry, queried once when a store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Device size in bytes
    pub total_size: u32,
    /// Erase granularity in bytes
    pub sector_size: u32,
}

/// A raw, byte-addressable flash device
pub trait Flash {
    /// One-time hardware setup. Called by `NvmStore::open`.
    fn init(&mut self) -> Result<(), FlashError> {
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `address` into `buf`
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program `data` at `address`.
    ///
    /// Must support clearing bits of already-programmed bytes without an
    /// erase.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erase `count` whole sectors starting at the sector-aligned `address`
    fn erase_sectors(&mut self, address: u32, count: u32) -> Result<(), FlashError>;

    /// Device size in bytes
    fn total_size(&self) -> u32;

    /// Erase granularity in bytes
    fn sector_size(&self) -> u32;

    fn geometry(&self) -> FlashGeometry {
        FlashGeometry {
            total_size: self.total_size(),
            sector_size: self.sector_size(),
        }
    }
}

impl<F: Flash + ?Sized> Flash for &mut F {
    fn init(&mut self) -> Result<(), FlashError> {
        (**self).init()
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).write(address, data)
    }

    fn erase_sectors(&mut self, address: u32, count: u32) -> Result<(), FlashError> {
        (**self).erase_sectors(address, count)
    }

    fn total_size(&self) -> u32 {
        (**self).total_size()
    }

    fn sector_size(&self) -> u32 {
        (**self).sector_size()
    }
}

impl<F: Flash + ?Sized> Flash for Box<F> {
    fn init(&mut self) -> Result<(), FlashError> {
        (**self).init()
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).write(address, data)
    }

    fn erase_sectors(&mut self, address: u32, count: u32) -> Result<(), FlashError> {
        (**self).erase_sectors(address, count)
    }

    fn total_size(&self) -> u32 {
        (**self).total_size()
    }

    fn sector_size(&self) -> u32 {
        (**self).sector_size()
    }
}

// =============================================================================
// Shared NOR helpers (used by both simulators)
// =============================================================================

/// Validate that `[address, address + len)` lies inside a device of `size` bytes
pub(crate) fn check_range(address: u32, len: usize, size: u32) -> Result<(), FlashError> {
    let end = address as u64 + len as u64;
    if end > size as u64 {
        return Err(FlashError::OutOfBounds { address, len, size });
    }
    Ok(())
}

/// Validate an erase request and return the byte range it covers
pub(crate) fn check_erase(
    address: u32,
    count: u32,
    sector_size: u32,
    size: u32,
) -> Result<std::ops::Range<usize>, FlashError> {
    if sector_size == 0 || address % sector_size != 0 {
        return Err(FlashError::Misaligned {
            address,
            sector_size,
        });
    }
    let len = count as u64 * sector_size as u64;
    if address as u64 + len > size as u64 {
        return Err(FlashError::OutOfBounds {
            address,
            len: len as usize,
            size,
        });
    }
    let start = address as usize;
    Ok(start..start + len as usize)
}

/// Apply NOR programming of `data` onto `cells` in place.
///
/// Fails without modifying anything if any bit would go 0 -> 1.
pub(crate) fn program(cells: &mut [u8], data: &[u8], address: u32) -> Result<(), FlashError> {
    debug_assert_eq!(cells.len(), data.len());
    if let Some(pos) = cells
        .iter()
        .zip(data)
        .position(|(&old, &new)| old & new != new)
    {
        return Err(FlashError::NotErased {
            address: address + pos as u32,
        });
    }
    for (cell, &new) in cells.iter_mut().zip(data) {
        *cell &= new;
    }
    Ok(())
}
