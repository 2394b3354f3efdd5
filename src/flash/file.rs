//! File-backed flash image
//!
//! Stores a flash device as a plain file of `total_size` bytes so a store can
//! persist across process runs on a host. NOR rules are enforced on every
//! write, so the image stays byte-identical to what a real part would hold.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{check_erase, check_range, program, Flash, FlashError, ERASED_BYTE};

/// Flash device backed by an image file
#[derive(Debug)]
pub struct FileFlash {
    /// Path to the image file
    path: PathBuf,
    /// Open image file
    file: File,
    /// Device size in bytes
    total_size: u32,
    /// Erase granularity
    sector_size: u32,
}

impl FileFlash {
    /// Open an image file, creating a fully erased one if it does not exist.
    ///
    /// An existing image must be exactly `total_size` bytes long.
    pub fn open(path: &Path, total_size: u32, sector_size: u32) -> Result<Self, FlashError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            tracing::debug!(
                "Creating erased flash image {} ({} bytes)",
                path.display(),
                total_size
            );
            let sector = vec![ERASED_BYTE; sector_size.max(1) as usize];
            let mut remaining = total_size as usize;
            while remaining > 0 {
                let n = remaining.min(sector.len());
                file.write_all(&sector[..n])?;
                remaining -= n;
            }
            file.sync_all()?;
        } else if len != total_size as u64 {
            return Err(FlashError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "flash image {} is {} bytes, expected {}",
                    path.display(),
                    len,
                    total_size
                ),
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            total_size,
            sector_size,
        })
    }

    /// Path to the image file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Flash for FileFlash {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        check_range(address, buf.len(), self.total_size)?;
        self.file.seek(SeekFrom::Start(address as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        check_range(address, data.len(), self.total_size)?;

        let mut cells = vec![0u8; data.len()];
        self.read(address, &mut cells)?;
        program(&mut cells, data, address)?;

        self.file.seek(SeekFrom::Start(address as u64))?;
        self.file.write_all(&cells)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn erase_sectors(&mut self, address: u32, count: u32) -> Result<(), FlashError> {
        let range = check_erase(address, count, self.sector_size, self.total_size)?;

        let erased = vec![ERASED_BYTE; self.sector_size as usize];
        self.file.seek(SeekFrom::Start(range.start as u64))?;
        for _ in 0..count {
            self.file.write_all(&erased)?;
        }
        self.file.sync_data()?;
        Ok(())
    }

    fn total_size(&self) -> u32 {
        self.total_size
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }
}
