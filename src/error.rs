//! Error types for flashkv
//!
//! Provides a unified error type for all store operations. "Not found" is
//! never an error: reads and erases report it as `false` / `None`.

use thiserror::Error;

use crate::flash::FlashError;

/// Result type alias using NvmError
pub type Result<T> = std::result::Result<T, NvmError>;

/// Unified error type for flashkv operations
#[derive(Debug, Error)]
pub enum NvmError {
    // -------------------------------------------------------------------------
    // Device Errors
    // -------------------------------------------------------------------------
    #[error("Flash error: {0}")]
    Flash(#[from] FlashError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Record id {0:#018x} is reserved")]
    ReservedId(u64),

    #[error("Payload of {0} bytes exceeds the record length field")]
    PayloadTooLarge(usize),

    #[error("Not enough capacity: record needs {needed} bytes, {available} available")]
    NoCapacity { needed: u32, available: u32 },

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Corrupted record header at {address:#010x}")]
    Corrupted { address: u32 },

    #[error("Corrupted record header at {address:#010x}; region erased")]
    CorruptionRecovered { address: u32 },

    #[error("Recovery found no unused slot before the end of the region")]
    RecoveryExhausted,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl NvmError {
    /// Whether this error reports corrupted flash content
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            NvmError::Corrupted { .. }
                | NvmError::CorruptionRecovered { .. }
                | NvmError::RecoveryExhausted
        )
    }
}
