//! Shared store
//!
//! Every store operation scans the whole log and may move the append cursor,
//! so concurrent callers must be serialized as a unit. `SharedStore` puts the
//! store behind a single mutex and can be cloned across threads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::flash::Flash;
use crate::scan::ScanReport;
use crate::store::{NvmStore, StoreStats, WriteOutcome};

/// A cloneable, thread-safe handle to an [`NvmStore`]
pub struct SharedStore<F: Flash> {
    inner: Arc<Mutex<NvmStore<F>>>,
}

impl<F: Flash> Clone for SharedStore<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Flash> SharedStore<F> {
    pub fn new(store: NvmStore<F>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with exclusive access to the store
    pub fn with<R>(&self, f: impl FnOnce(&mut NvmStore<F>) -> R) -> R {
        let mut store = self.inner.lock();
        f(&mut store)
    }

    pub fn read(&self, id: u64, buf: &mut [u8]) -> Result<bool> {
        self.inner.lock().read(id, buf)
    }

    pub fn get(&self, id: u64) -> Result<Option<Vec<u8>>> {
        self.inner.lock().get(id)
    }

    pub fn write(&self, id: u64, data: &[u8]) -> Result<WriteOutcome> {
        self.inner.lock().write(id, data)
    }

    pub fn erase(&self, id: u64) -> Result<bool> {
        self.inner.lock().erase(id)
    }

    pub fn erase_all(&self) -> Result<()> {
        self.inner.lock().erase_all()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.inner.lock().stats()
    }

    pub fn verify(&self) -> Result<ScanReport> {
        self.inner.lock().verify()
    }

    /// Recover the store if this is the last handle
    pub fn try_into_inner(self) -> std::result::Result<NvmStore<F>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
