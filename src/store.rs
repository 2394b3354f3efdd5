//! Store Module
//!
//! The NVM record store that coordinates scanning, appending, tombstoning and
//! erasing on top of a [`Flash`] device.
//!
//! ## Responsibilities
//! - Establish the append cursor at open, recovering from corruption
//! - Revalidate the log from the start on every operation
//! - Update by append-then-tombstone; never rewrite a payload in place
//! - Reclaim space only by erasing the whole used region

use std::collections::BTreeMap;

use crate::config::{Config, CorruptionPolicy, Region};
use crate::error::{NvmError, Result};
use crate::flash::{Flash, FlashGeometry};
use crate::record::{checksum, is_valid_id, record_size, RecordHeader, HEADER_SIZE};
use crate::scan::{find_unused_id, InitReport, LogScanner, ScanReport, Slot, Step};
use crate::snapshot::{ImportSummary, Snapshot};

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The newest copy already holds this payload; nothing was written
    Unchanged { address: u32, remaining: u32 },
    /// A new record was appended at `address`
    Appended { address: u32, remaining: u32 },
}

impl WriteOutcome {
    /// Address of the record now holding the payload
    pub fn address(&self) -> u32 {
        match *self {
            WriteOutcome::Unchanged { address, .. } | WriteOutcome::Appended { address, .. } => {
                address
            }
        }
    }

    /// Free bytes left in the region after this write
    pub fn remaining(&self) -> u32 {
        match *self {
            WriteOutcome::Unchanged { remaining, .. }
            | WriteOutcome::Appended { remaining, .. } => remaining,
        }
    }

    pub fn is_appended(&self) -> bool {
        matches!(self, WriteOutcome::Appended { .. })
    }

    /// No room left for even an empty record
    pub fn is_near_full(&self) -> bool {
        self.remaining() < HEADER_SIZE
    }
}

/// One header slot as reported by [`NvmStore::records`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// Header address
    pub address: u32,
    /// Record id (0 for tombstones)
    pub id: u64,
    /// Payload length
    pub len: u32,
    /// Whether the record is live (false = tombstone)
    pub live: bool,
}

/// Space accounting for the region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub live_records: u64,
    pub tombstones: u64,
    /// Bytes between the region start and the cursor
    pub used_bytes: u32,
    /// Bytes held by tombstones (reclaimable only by erase_all)
    pub dead_bytes: u32,
    /// Region size
    pub capacity: u32,
    /// Bytes after the cursor
    pub remaining: u32,
}

/// How a traversal ended
enum Traversal {
    End(u32),
    Corrupt(u32),
}

/// The flash-backed record store
///
/// ## Concurrency Model
///
/// Every operation takes `&mut self` and scans the whole log, so a store is
/// single-caller by construction. Wrap it in [`crate::SharedStore`] to share
/// it between threads behind one mutex.
pub struct NvmStore<F: Flash> {
    /// Underlying device
    flash: F,

    /// Store configuration
    config: Config,

    /// Geometry cached at open
    geometry: FlashGeometry,

    /// Resolved log region
    region: Region,

    /// Next free address; only moves forward except on erase
    cursor: u32,

    /// Outcome of the startup scan
    init_report: InitReport,
}

impl<F: Flash> NvmStore<F> {
    /// Open a store on `flash`
    ///
    /// On startup:
    /// 1. Initialize the device and cache its geometry
    /// 2. Scan the log to find the append cursor
    /// 3. On a corrupted header, erase the used region and start empty
    pub fn open(mut flash: F, config: Config) -> Result<Self> {
        flash.init()?;
        let geometry = flash.geometry();
        let region = config.region(geometry)?;

        let mut store = Self {
            flash,
            config,
            geometry,
            region,
            cursor: region.start,
            init_report: InitReport::default(),
        };
        store.init_report = store.initialize()?;

        tracing::info!(
            start = region.start,
            end = region.end,
            cursor = store.cursor,
            live = store.init_report.live_records,
            tombstones = store.init_report.tombstones,
            "NVM store opened"
        );

        Ok(store)
    }

    /// Open with the default config
    pub fn open_default(flash: F) -> Result<Self> {
        Self::open(flash, Config::default())
    }

    /// Startup scan: establish the cursor, recovering if needed
    fn initialize(&mut self) -> Result<InitReport> {
        let mut scanner = LogScanner::new(self.region, self.config.checksum_seed);
        let mut report = InitReport::default();

        loop {
            match scanner.step(&mut self.flash)? {
                Step::Record(slot) => {
                    if slot.is_live() {
                        report.live_records += 1;
                    } else {
                        report.tombstones += 1;
                    }
                }
                Step::End { address } => {
                    self.cursor = address;
                    break;
                }
                Step::Corrupt { address } => {
                    let sectors_erased = self.recover(address)?;
                    report = InitReport {
                        recovered_from: Some(address),
                        sectors_erased,
                        ..InitReport::default()
                    };
                    break;
                }
            }
        }

        report.cursor = self.cursor;
        Ok(report)
    }

    /// Erase everything from the region start through the tail of the
    /// written area that follows the corrupted header at `corrupt_at`.
    ///
    /// The erase also reaches the current cursor, which at open is still the
    /// region start and after open is the known end of the log.
    ///
    /// Returns the number of sectors erased.
    fn recover(&mut self, corrupt_at: u32) -> Result<u32> {
        tracing::warn!("Corrupted header at {:#010x}, recovering", corrupt_at);

        let tail = find_unused_id(&mut self.flash, self.region, corrupt_at)?.ok_or_else(|| {
            tracing::error!(
                "No unused slot after {:#010x}; region must be formatted",
                corrupt_at
            );
            NvmError::RecoveryExhausted
        })?;

        self.cursor = self.region.align_up(tail).max(self.cursor);
        let sectors = self.region.sectors_until(self.cursor);
        self.erase_all()?;

        tracing::info!(
            "Recovery erased {} sectors (tail found at {:#010x})",
            sectors,
            tail
        );
        Ok(sectors)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Visit every live record and tombstone, without handling corruption
    fn traverse<V>(&mut self, mut visit: V) -> Result<Traversal>
    where
        V: FnMut(&mut F, &Slot) -> Result<()>,
    {
        let mut scanner = LogScanner::new(self.region, self.config.checksum_seed);
        loop {
            match scanner.step(&mut self.flash)? {
                Step::Record(slot) => visit(&mut self.flash, &slot)?,
                Step::End { address } => return Ok(Traversal::End(address)),
                Step::Corrupt { address } => return Ok(Traversal::Corrupt(address)),
            }
        }
    }

    /// Visit every slot and return the end of the log, applying the
    /// corruption policy if a bad header stops the scan
    fn walk<V>(&mut self, visit: V) -> Result<u32>
    where
        V: FnMut(&mut F, &Slot) -> Result<()>,
    {
        match self.traverse(visit)? {
            Traversal::End(address) => {
                if address != self.cursor {
                    tracing::warn!(
                        "Log ends at {:#010x} but cursor is {:#010x}",
                        address,
                        self.cursor
                    );
                    self.cursor = self.cursor.max(address);
                }
                Ok(address)
            }
            Traversal::Corrupt(address) => match self.config.corruption_policy {
                CorruptionPolicy::Report => {
                    tracing::warn!("Corrupted header at {:#010x}", address);
                    Err(NvmError::Corrupted { address })
                }
                CorruptionPolicy::Recover => {
                    self.recover(address)?;
                    Err(NvmError::CorruptionRecovered { address })
                }
            },
        }
    }

    /// Clear the id and checksums of a record in place
    fn tombstone(&mut self, slot: &Slot) -> Result<()> {
        let tombstone = RecordHeader::tombstone(slot.header.len);
        self.flash.write(slot.address, &tombstone.encode())?;
        tracing::debug!(
            "Tombstoned id {} at {:#010x}",
            slot.header.id,
            slot.address
        );
        Ok(())
    }

    /// Read a slot's payload and check it against the stored checksum
    fn load_payload(flash: &mut F, slot: &Slot, seed: u32) -> Result<Option<Vec<u8>>> {
        let mut data = vec![0u8; slot.header.len as usize];
        flash.read(slot.payload_address(), &mut data)?;
        if checksum(seed, &data) == slot.header.data_crc {
            Ok(Some(data))
        } else {
            tracing::warn!(
                "Payload checksum mismatch for id {} at {:#010x}",
                slot.header.id,
                slot.address
            );
            Ok(None)
        }
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Read the newest valid record with `id` and exactly `buf.len()` bytes
    ///
    /// Returns `Ok(false)` if no such record exists. Records whose payload
    /// checksum fails are skipped. On error the contents of `buf` are
    /// unspecified.
    pub fn read(&mut self, id: u64, buf: &mut [u8]) -> Result<bool> {
        ensure_valid_id(id)?;
        let Ok(len) = u32::try_from(buf.len()) else {
            return Ok(false);
        };

        let seed = self.config.checksum_seed;
        let mut found = false;
        self.walk(|flash, slot| {
            if slot.is_live_id(id) && slot.header.len == len {
                if let Some(data) = Self::load_payload(flash, slot, seed)? {
                    buf.copy_from_slice(&data);
                    found = true;
                }
            }
            Ok(())
        })?;

        Ok(found)
    }

    /// Get the newest valid payload stored under `id`, whatever its length
    pub fn get(&mut self, id: u64) -> Result<Option<Vec<u8>>> {
        ensure_valid_id(id)?;

        let seed = self.config.checksum_seed;
        let mut latest = None;
        self.walk(|flash, slot| {
            if slot.is_live_id(id) {
                if let Some(data) = Self::load_payload(flash, slot, seed)? {
                    latest = Some(data);
                }
            }
            Ok(())
        })?;

        Ok(latest)
    }

    /// Whether a live header exists for `id`
    pub fn contains(&mut self, id: u64) -> Result<bool> {
        ensure_valid_id(id)?;

        let mut found = false;
        self.walk(|_, slot| {
            found |= slot.is_live_id(id);
            Ok(())
        })?;
        Ok(found)
    }

    /// Store `data` under `id`
    ///
    /// Steps:
    /// 1. Scan to the end of the log, collecting live copies of `id`
    /// 2. If the newest copy already holds `data`, stop
    /// 3. Append the new record at the end of the log
    /// 4. Tombstone every older copy
    ///
    /// The new record is durable before the old one disappears, so a cut
    /// between steps 3 and 4 leaves both copies and reads return the newer.
    pub fn write(&mut self, id: u64, data: &[u8]) -> Result<WriteOutcome> {
        ensure_valid_id(id)?;
        let len = u32::try_from(data.len()).map_err(|_| NvmError::PayloadTooLarge(data.len()))?;

        let seed = self.config.checksum_seed;
        let header = RecordHeader::new(id, data, seed);

        let mut copies: Vec<Slot> = Vec::new();
        let end = self.walk(|_, slot| {
            if slot.is_live_id(id) {
                copies.push(*slot);
            }
            Ok(())
        })?;

        // Step 2: no-op update
        if let Some(newest) = copies.last().copied() {
            if newest.header.len == len
                && newest.header.data_crc == header.data_crc
                && Self::load_payload(&mut self.flash, &newest, seed)?.is_some()
            {
                for older in &copies[..copies.len() - 1] {
                    self.tombstone(older)?;
                }
                tracing::debug!("Write of id {} unchanged", id);
                return Ok(WriteOutcome::Unchanged {
                    address: newest.address,
                    remaining: self.remaining(),
                });
            }
        }

        // Step 3: append
        let needed = record_size(len);
        let available = self.region.end - end;
        if needed > available as u64 {
            tracing::warn!(
                "No capacity for id {}: need {} bytes, {} available",
                id,
                needed,
                available
            );
            return Err(NvmError::NoCapacity {
                needed: u32::try_from(needed).unwrap_or(u32::MAX),
                available,
            });
        }

        // The cursor covers the record before any byte of it is programmed
        self.cursor = self.cursor.max(end + needed as u32);
        self.flash.write(end, &header.encode())?;
        if !data.is_empty() {
            self.flash.write(end + HEADER_SIZE, data)?;
        }
        tracing::debug!("Appended id {} ({} bytes) at {:#010x}", id, len, end);

        // Step 4: retire older copies
        for older in &copies {
            self.tombstone(older)?;
        }

        Ok(WriteOutcome::Appended {
            address: end,
            remaining: self.remaining(),
        })
    }

    /// Tombstone every live record with `id`
    ///
    /// Returns `Ok(false)` if there was nothing to erase. No space is
    /// reclaimed.
    pub fn erase(&mut self, id: u64) -> Result<bool> {
        ensure_valid_id(id)?;

        let mut copies: Vec<Slot> = Vec::new();
        self.walk(|_, slot| {
            if slot.is_live_id(id) {
                copies.push(*slot);
            }
            Ok(())
        })?;

        for slot in &copies {
            self.tombstone(slot)?;
        }
        Ok(!copies.is_empty())
    }

    /// Erase every sector from the region start through the cursor and reset
    /// the cursor
    pub fn erase_all(&mut self) -> Result<()> {
        let sectors = self.region.sectors_until(self.cursor);
        if sectors > 0 {
            self.flash.erase_sectors(self.region.start, sectors)?;
        }
        tracing::debug!("Erased {} sectors from {:#010x}", sectors, self.region.start);

        self.cursor = self.region.start;
        Ok(())
    }

    /// Erase the entire region regardless of the cursor
    pub fn format(&mut self) -> Result<()> {
        format_region(&mut self.flash, &self.config)?;
        self.cursor = self.region.start;
        self.init_report = InitReport {
            cursor: self.cursor,
            ..InitReport::default()
        };
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Every header slot in log order
    pub fn records(&mut self) -> Result<Vec<RecordInfo>> {
        let mut records = Vec::new();
        self.walk(|_, slot| {
            records.push(RecordInfo {
                address: slot.address,
                id: slot.header.id,
                len: slot.header.len,
                live: slot.is_live(),
            });
            Ok(())
        })?;
        Ok(records)
    }

    /// Space accounting for the region
    pub fn stats(&mut self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        let end = self.walk(|_, slot| {
            if slot.is_live() {
                stats.live_records += 1;
            } else {
                stats.tombstones += 1;
                stats.dead_bytes += slot.header.record_size() as u32;
            }
            Ok(())
        })?;

        stats.used_bytes = end - self.region.start;
        stats.capacity = self.region.size();
        stats.remaining = self.region.end - end;
        Ok(stats)
    }

    /// Check every header and live payload without modifying flash
    pub fn verify(&mut self) -> Result<ScanReport> {
        let seed = self.config.checksum_seed;
        let mut report = ScanReport::default();

        let traversal = self.traverse(|flash, slot| {
            if slot.is_live() {
                report.live_records += 1;
                if Self::load_payload(flash, slot, seed)?.is_none() {
                    report.payload_errors.push(slot.address);
                }
            } else {
                report.tombstones += 1;
            }
            Ok(())
        })?;

        match traversal {
            Traversal::End(address) => report.end_address = address,
            Traversal::Corrupt(address) => {
                report.end_address = address;
                report.corrupt_at = Some(address);
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Collect the newest valid payload of every live id
    pub fn export(&mut self) -> Result<Snapshot> {
        let seed = self.config.checksum_seed;
        let mut latest: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        self.walk(|flash, slot| {
            if slot.is_live() {
                if let Some(data) = Self::load_payload(flash, slot, seed)? {
                    latest.insert(slot.header.id, data);
                }
            }
            Ok(())
        })?;

        Ok(Snapshot::from_records(latest))
    }

    /// Write every record of a snapshot
    pub fn import(&mut self, snapshot: &Snapshot) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for record in snapshot.records() {
            if self.write(record.id, &record.data)?.is_appended() {
                summary.written += 1;
            } else {
                summary.unchanged += 1;
            }
        }
        tracing::info!(
            "Imported snapshot: {} written, {} unchanged",
            summary.written,
            summary.unchanged
        );
        Ok(summary)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Next free address
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Free bytes after the cursor
    pub fn remaining(&self) -> u32 {
        self.region.end - self.cursor
    }

    /// Resolved log region
    pub fn region(&self) -> Region {
        self.region
    }

    /// Geometry cached at open
    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    /// Outcome of the startup scan
    pub fn init_report(&self) -> &InitReport {
        &self.init_report
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutable access to the device. Writing behind the store's back
    /// invalidates its cursor until the next scan.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Close the store, returning the device
    pub fn into_flash(self) -> F {
        self.flash
    }
}

/// Erase every sector of the configured region.
///
/// Works without a store, so a region that `open` refused with
/// `RecoveryExhausted` can be wiped and reopened.
pub fn format_region<F: Flash>(flash: &mut F, config: &Config) -> Result<()> {
    let region = config.region(flash.geometry())?;
    let sectors = region.size() / region.sector_size;
    flash.erase_sectors(region.start, sectors)?;
    tracing::info!(
        "Formatted {} sectors from {:#010x}",
        sectors,
        region.start
    );
    Ok(())
}

fn ensure_valid_id(id: u64) -> Result<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(NvmError::ReservedId(id))
    }
}
