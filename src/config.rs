//! Configuration for flashkv
//!
//! Centralized configuration with sensible defaults.

use crate::error::{NvmError, Result};
use crate::flash::FlashGeometry;
use crate::record::{CHECKSUM_SEED, HEADER_SIZE};

/// Main configuration for a store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Region Configuration
    // -------------------------------------------------------------------------
    /// First byte of the log region on the flash device.
    /// Must sit on a sector boundary.
    pub start_address: u32,

    /// Size of the log region in bytes. `None` uses everything from
    /// `start_address` to the end of the device.
    pub region_size: Option<u32>,

    // -------------------------------------------------------------------------
    // Integrity Configuration
    // -------------------------------------------------------------------------
    /// Seed shared by header and payload checksums
    pub checksum_seed: u32,

    /// What read/write/erase do when a scan hits a corrupted header
    pub corruption_policy: CorruptionPolicy,
}

/// Handling of header corruption found outside of `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Run the same recovery as `open` (erase the region), then fail the call
    /// with `CorruptionRecovered`
    Recover,

    /// Leave flash untouched and fail the call with `Corrupted`
    Report,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_address: 0,
            region_size: None,
            checksum_seed: CHECKSUM_SEED,
            corruption_policy: CorruptionPolicy::Recover,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolve the region `[start, end)` against a device geometry
    pub(crate) fn region(&self, geometry: FlashGeometry) -> Result<Region> {
        let FlashGeometry {
            total_size,
            sector_size,
        } = geometry;

        if sector_size == 0 || sector_size % 4 != 0 {
            return Err(NvmError::Config(format!(
                "sector size {} is not a non-zero multiple of 4",
                sector_size
            )));
        }
        if self.start_address % sector_size != 0 {
            return Err(NvmError::Config(format!(
                "start address {:#x} is not aligned to the {} byte sector size",
                self.start_address, sector_size
            )));
        }
        if self.start_address >= total_size {
            return Err(NvmError::Config(format!(
                "start address {:#x} is outside the {} byte device",
                self.start_address, total_size
            )));
        }

        let size = self
            .region_size
            .unwrap_or(total_size - self.start_address);
        if size % sector_size != 0 {
            return Err(NvmError::Config(format!(
                "region size {} is not a whole number of {} byte sectors",
                size, sector_size
            )));
        }
        let end = self
            .start_address
            .checked_add(size)
            .filter(|&end| end <= total_size)
            .ok_or_else(|| {
                NvmError::Config(format!(
                    "region of {} bytes at {:#x} does not fit the {} byte device",
                    size, self.start_address, total_size
                ))
            })?;
        if size < HEADER_SIZE {
            return Err(NvmError::Config(format!(
                "region of {} bytes cannot hold a record header",
                size
            )));
        }

        Ok(Region {
            start: self.start_address,
            end,
            sector_size,
        })
    }
}

/// Resolved log region on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First byte of the region
    pub start: u32,
    /// One past the last byte of the region
    pub end: u32,
    /// Erase granularity
    pub sector_size: u32,
}

impl Region {
    /// Region size in bytes
    pub fn size(&self) -> u32 {
        self.end - self.start
    }

    /// Round `address` up to the next sector boundary, capped at the region end
    pub fn align_up(&self, address: u32) -> u32 {
        let offset = address - self.start;
        let sectors = offset.div_ceil(self.sector_size);
        self.start
            .saturating_add(sectors.saturating_mul(self.sector_size))
            .min(self.end)
    }

    /// Number of sectors between the region start and `address` (rounded up)
    pub fn sectors_until(&self, address: u32) -> u32 {
        (self.align_up(address) - self.start) / self.sector_size
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the start address of the log region
    pub fn start_address(mut self, address: u32) -> Self {
        self.config.start_address = address;
        self
    }

    /// Set the size of the log region (in bytes)
    pub fn region_size(mut self, size: u32) -> Self {
        self.config.region_size = Some(size);
        self
    }

    /// Set the checksum seed
    pub fn checksum_seed(mut self, seed: u32) -> Self {
        self.config.checksum_seed = seed;
        self
    }

    /// Set the corruption policy for read/write/erase
    pub fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.config.corruption_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
