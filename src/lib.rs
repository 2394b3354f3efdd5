//! # flashkv
//!
//! A minimal, crash-tolerant, append-only key/value record store built
//! directly on raw NOR flash, with:
//! - CRC-protected record headers and payloads
//! - Update by append plus in-place tombstone (bit-clearing write)
//! - Corruption recovery by erasing the used region
//! - No filesystem, no index: every operation rescans the log
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SharedStore (optional mutex)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        NvmStore                              │
//! │       read / write / erase / erase_all  + append cursor      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ LogScanner  │          │   Record    │
//!   │ (+recovery) │          │  (framing)  │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ Flash trait │  RamFlash / FileFlash / device driver
//!   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use flashkv::{NvmStore, RamFlash};
//!
//! let flash = RamFlash::new(64 * 1024, 4096);
//! let mut store = NvmStore::open_default(flash).unwrap();
//!
//! store.write(1, b"hello").unwrap();
//! let mut buf = [0u8; 5];
//! assert!(store.read(1, &mut buf).unwrap());
//! assert_eq!(&buf, b"hello");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod flash;
pub mod record;
pub mod scan;
pub mod store;
pub mod shared;
pub mod snapshot;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{NvmError, Result};
pub use config::{Config, CorruptionPolicy};
pub use flash::{FileFlash, Flash, FlashError, RamFlash};
pub use shared::SharedStore;
pub use snapshot::Snapshot;
pub use store::{format_region, NvmStore, WriteOutcome};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flashkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
