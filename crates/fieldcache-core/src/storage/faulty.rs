//! Storage double whose reads and writes can be made to fail on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use super::{MemoryStorage, Storage};

#[derive(Default)]
pub(crate) struct FaultyStorage {
    inner: MemoryStorage,
    /// Reads of keys containing this fragment fail
    read_fault: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl FaultyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_reads_of(&self, fragment: &str) {
        *self.read_fault.lock().unwrap() = Some(fragment.to_string());
    }

    pub(crate) fn heal_reads(&self) {
        *self.read_fault.lock().unwrap() = None;
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(anyhow!("disk full"))
        } else {
            Ok(())
        }
    }
}

impl Storage for FaultyStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        if let Some(fragment) = self.read_fault.lock().unwrap().as_deref() {
            if key.contains(fragment) {
                return Err(anyhow!("input/output error"));
            }
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_write()?;
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check_write()?;
        self.inner.remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}
