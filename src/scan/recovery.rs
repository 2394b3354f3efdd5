//! Recovery probe and scan reports

use crate::config::Region;
use crate::error::Result;
use crate::flash::Flash;
use crate::record::{ID_SIZE, UNUSED_ID};

/// Find the first id-sized word reading as erased at or after `from`.
///
/// Used after a corrupted header: the length field can no longer be trusted,
/// so the probe walks forward one id width at a time looking for the tail of
/// the written area. Returns `None` if the region ends first.
pub fn find_unused_id<F: Flash>(flash: &mut F, region: Region, from: u32) -> Result<Option<u32>> {
    let mut address = from;
    let mut word = [0u8; ID_SIZE as usize];

    while address as u64 + ID_SIZE as u64 <= region.end as u64 {
        flash.read(address, &mut word)?;
        if u64::from_le_bytes(word) == UNUSED_ID {
            return Ok(Some(address));
        }
        address += ID_SIZE;
    }

    Ok(None)
}

/// Summary of the startup scan done by `NvmStore::open`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Live records found
    pub live_records: u64,
    /// Tombstones found
    pub tombstones: u64,
    /// Append cursor after init
    pub cursor: u32,
    /// Address of the corrupted header, if recovery ran
    pub recovered_from: Option<u32>,
    /// Sectors erased by recovery
    pub sectors_erased: u32,
}

impl InitReport {
    pub fn was_recovered(&self) -> bool {
        self.recovered_from.is_some()
    }
}

/// Result of a read-only integrity check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Live records with a valid header
    pub live_records: u64,
    /// Tombstones
    pub tombstones: u64,
    /// End of the log (or the corrupted header)
    pub end_address: u32,
    /// First corrupted header, if any
    pub corrupt_at: Option<u32>,
    /// Live records whose payload checksum does not match
    pub payload_errors: Vec<u32>,
}

impl ScanReport {
    /// No corrupted header and no bad payload
    pub fn is_clean(&self) -> bool {
        self.corrupt_at.is_none() && self.payload_errors.is_empty()
    }
}
