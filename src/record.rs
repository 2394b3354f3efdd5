//! Record framing
//!
//! Defines the on-flash layout of a single record and the checksum that
//! protects it.
//!
//! ## Record Format (little-endian)
//! ```text
//! ┌─────────┬─────────┬───────────────┬─────────────┬──────────────┬───────────┐
//! │ Id (8)  │ Len (4) │ HeaderCRC (4) │ DataCRC (4) │ Payload(len) │ Pad to 4  │
//! └─────────┴─────────┴───────────────┴─────────────┴──────────────┴───────────┘
//! ```
//! - HeaderCRC covers exactly the Id and Len bytes
//! - DataCRC covers the payload, not the padding
//! - Id == u64::MAX marks erased flash (end of log)
//! - Id == 0 with both CRCs zero marks a tombstone

/// Header size: Id (8) + Len (4) + HeaderCRC (4) + DataCRC (4) = 20 bytes
pub const HEADER_SIZE: u32 = 20;

/// Width of the id field, also the stride of the recovery scan
pub const ID_SIZE: u32 = 8;

/// Payloads are padded to this boundary on flash
pub const ALIGNMENT: u32 = 4;

/// Id of a tombstoned (deleted or superseded) record
pub const RESERVED_ID: u64 = 0;

/// Id that erased flash reads back as
pub const UNUSED_ID: u64 = u64::MAX;

/// Default seed shared by header and payload checksums
pub const CHECKSUM_SEED: u32 = 0x4E56_4D31;

/// Bytes of the header covered by the header checksum
const CRC_COVERED: usize = 12;

/// 32-bit checksum of `data` starting from `seed`
pub fn checksum(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(data);
    hasher.finalize()
}

/// Whether `id` may be used by callers
pub fn is_valid_id(id: u64) -> bool {
    id != RESERVED_ID && id != UNUSED_ID
}

/// Payload length rounded up to the alignment boundary
pub fn padded_len(len: u32) -> u64 {
    let align = ALIGNMENT as u64;
    (len as u64).div_ceil(align) * align
}

/// Bytes a record with a `len`-byte payload occupies on flash
pub fn record_size(len: u32) -> u64 {
    HEADER_SIZE as u64 + padded_len(len)
}

/// Classification of a header read from flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    /// Erased flash: the end of the log
    Unused,
    /// Logically deleted record; skip its payload
    Tombstone,
    /// Valid caller record
    Live,
    /// Anything else
    Corrupt,
}

/// A record header as stored on flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub id: u64,
    pub len: u32,
    pub header_crc: u32,
    pub data_crc: u32,
}

impl RecordHeader {
    /// Build the header for a new record holding `data`
    pub fn new(id: u64, data: &[u8], seed: u32) -> Self {
        let len = data.len() as u32;
        Self {
            id,
            len,
            header_crc: Self::compute_header_crc(id, len, seed),
            data_crc: checksum(seed, data),
        }
    }

    /// The tombstone written over a record with a `len`-byte payload.
    ///
    /// Only clears bits relative to any live header with the same length.
    pub fn tombstone(len: u32) -> Self {
        Self {
            id: RESERVED_ID,
            len,
            header_crc: 0,
            data_crc: 0,
        }
    }

    /// Checksum over the (id, len) bytes exactly as they are laid out on flash
    pub fn compute_header_crc(id: u64, len: u32, seed: u32) -> u32 {
        let mut covered = [0u8; CRC_COVERED];
        covered[..8].copy_from_slice(&id.to_le_bytes());
        covered[8..].copy_from_slice(&len.to_le_bytes());
        checksum(seed, &covered)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        bytes[0..8].copy_from_slice(&self.id.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.len.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.header_crc.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.data_crc.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE as usize]) -> Self {
        let mut id = [0u8; 8];
        let mut len = [0u8; 4];
        let mut header_crc = [0u8; 4];
        let mut data_crc = [0u8; 4];
        id.copy_from_slice(&bytes[0..8]);
        len.copy_from_slice(&bytes[8..12]);
        header_crc.copy_from_slice(&bytes[12..16]);
        data_crc.copy_from_slice(&bytes[16..20]);

        Self {
            id: u64::from_le_bytes(id),
            len: u32::from_le_bytes(len),
            header_crc: u32::from_le_bytes(header_crc),
            data_crc: u32::from_le_bytes(data_crc),
        }
    }

    /// Decide which of the legal header states this is, if any
    pub fn classify(&self, seed: u32) -> HeaderState {
        match self.id {
            UNUSED_ID => HeaderState::Unused,
            RESERVED_ID if self.header_crc == 0 && self.data_crc == 0 => HeaderState::Tombstone,
            RESERVED_ID => HeaderState::Corrupt,
            id if self.header_crc == Self::compute_header_crc(id, self.len, seed) => {
                HeaderState::Live
            }
            _ => HeaderState::Corrupt,
        }
    }

    /// Bytes this record occupies on flash (header plus padded payload)
    pub fn record_size(&self) -> u64 {
        record_size(self.len)
    }
}
