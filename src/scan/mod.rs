//! Log Scanning Module
//!
//! Walks the record log from the start of the region, one header at a time.
//!
//! ## Responsibilities
//! - Validate every header before trusting its length
//! - Stop at the first erased header (end of log)
//! - Report the first corrupted header instead of guessing past it
//! - Locate a safe restart point after corruption (recovery probe)
//!
//! ## Traversal
//! ```text
//! start ──► [hdr|payload|pad] ──► [tomb|payload|pad] ──► [0xFF...] = end of log
//!              Live                  Tombstone              Unused
//! ```
//! Any header that is neither Live, Tombstone nor Unused stops the traversal
//! with `Step::Corrupt`.

mod recovery;
mod scanner;

pub use recovery::{find_unused_id, InitReport, ScanReport};
pub use scanner::{LogScanner, Slot, Step};
