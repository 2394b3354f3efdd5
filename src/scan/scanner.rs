//! Header-by-header log traversal

use crate::config::Region;
use crate::error::Result;
use crate::flash::Flash;
use crate::record::{HeaderState, RecordHeader, HEADER_SIZE};

/// A validated header slot in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Address of the header
    pub address: u32,
    /// Decoded header
    pub header: RecordHeader,
    /// Either `Live` or `Tombstone`
    pub state: HeaderState,
}

impl Slot {
    /// Address of the first payload byte
    pub fn payload_address(&self) -> u32 {
        self.address + HEADER_SIZE
    }

    /// Whether this is a live record with the given id
    pub fn is_live_id(&self, id: u64) -> bool {
        self.state == HeaderState::Live && self.header.id == id
    }

    pub fn is_live(&self) -> bool {
        self.state == HeaderState::Live
    }
}

/// Outcome of one traversal step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A live record or tombstone; the scanner has moved past it
    Record(Slot),
    /// End of the log: the first free address
    End { address: u32 },
    /// The header at `address` is not in any legal state
    Corrupt { address: u32 },
}

/// Forward-only cursor over the record log
#[derive(Debug, Clone)]
pub struct LogScanner {
    /// Region being scanned
    region: Region,
    /// Checksum seed
    seed: u32,
    /// Address of the next header to read
    position: u32,
}

impl LogScanner {
    /// Start a traversal at the beginning of `region`
    pub fn new(region: Region, seed: u32) -> Self {
        Self {
            region,
            seed,
            position: region.start,
        }
    }

    /// Read and classify the next header.
    ///
    /// `End` and `Corrupt` do not advance the scanner, so repeated calls keep
    /// returning them.
    pub fn step<F: Flash>(&mut self, flash: &mut F) -> Result<Step> {
        let address = self.position;

        // Region filled to the last byte that could hold a header
        if address as u64 + HEADER_SIZE as u64 > self.region.end as u64 {
            return Ok(Step::End { address });
        }

        let mut raw = [0u8; HEADER_SIZE as usize];
        flash.read(address, &mut raw)?;
        let header = RecordHeader::decode(&raw);

        let state = header.classify(self.seed);
        tracing::trace!(address, id = header.id, len = header.len, ?state, "scan");

        match state {
            HeaderState::Unused => Ok(Step::End { address }),
            HeaderState::Corrupt => Ok(Step::Corrupt { address }),
            HeaderState::Live | HeaderState::Tombstone => {
                let next = address as u64 + header.record_size();
                if next > self.region.end as u64 {
                    // A length that runs off the region cannot be trusted
                    return Ok(Step::Corrupt { address });
                }
                self.position = next as u32;
                Ok(Step::Record(Slot {
                    address,
                    header,
                    state,
                }))
            }
        }
    }
}
