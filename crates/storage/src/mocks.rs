//! Mock recording store for host tests.
//!
//! Backs recordings with in-memory byte vectors and lets tests inject the
//! failure modes the recorder and writer must survive: not-ready media,
//! failed creates, invalid handles, short writes, close failures, and
//! FAT-allocation-style write stalls.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::unwrap_used, clippy::expect_used)] // test-support code
#![allow(clippy::arithmetic_side_effects)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::store::{RecordingStore, StoreError};

#[derive(Debug, Default)]
struct StoreState {
    files: HashMap<String, Vec<u8>>,
    open: Option<String>,
    fail_ready: usize,
    fail_create: usize,
    fail_writes: Vec<StoreError>,
    fail_sync: usize,
    fail_close: usize,
    stall_writes_ms: u64,
    create_count: usize,
    write_count: usize,
    sync_count: usize,
    close_count: usize,
}

/// In-memory, fault-injecting [`RecordingStore`].
///
/// Cloned handles share state so a test can keep one for assertions while
/// the recorder owns another.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` `ensure_ready` calls with `NotReady`.
    pub fn fail_ready(&self, n: usize) {
        self.state.lock().unwrap().fail_ready = n;
    }

    /// Fail the next `n` `create` calls with `Io`.
    pub fn fail_create(&self, n: usize) {
        self.state.lock().unwrap().fail_create = n;
    }

    /// Fail upcoming `write` calls with the given errors, in order.
    pub fn fail_writes(&self, errors: &[StoreError]) {
        self.state.lock().unwrap().fail_writes = errors.to_vec();
    }

    /// Fail the next `n` `sync` calls with `Io`.
    pub fn fail_sync(&self, n: usize) {
        self.state.lock().unwrap().fail_sync = n;
    }

    /// Fail the next `n` `close` calls with `Io`.
    pub fn fail_close(&self, n: usize) {
        self.state.lock().unwrap().fail_close = n;
    }

    /// Stall every write by `ms` milliseconds.
    pub fn stall_writes_ms(&self, ms: u64) {
        self.state.lock().unwrap().stall_writes_ms = ms;
    }

    /// Bytes of `name` as stored.
    pub fn file_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(name).cloned()
    }

    /// Names of all stored files.
    pub fn file_names(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    /// Name of the currently open file, if any.
    pub fn open_name(&self) -> Option<String> {
        self.state.lock().unwrap().open.clone()
    }

    /// Number of `write` calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().write_count
    }

    /// Number of `sync` calls.
    pub fn sync_count(&self) -> usize {
        self.state.lock().unwrap().sync_count
    }

    /// Number of successful `close` calls.
    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }
}

impl RecordingStore for MockStore {
    async fn ensure_ready(&mut self) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        if s.fail_ready > 0 {
            s.fail_ready -= 1;
            return Err(StoreError::NotReady);
        }
        Ok(())
    }

    async fn create(&mut self, name: &str) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        if s.open.is_some() {
            return Err(StoreError::AlreadyOpen);
        }
        if s.fail_create > 0 {
            s.fail_create -= 1;
            return Err(StoreError::Io);
        }
        s.create_count += 1;
        // create-always: truncate any previous content.
        s.files.insert(name.to_owned(), Vec::new());
        s.open = Some(name.to_owned());
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let stall = {
            let s = self.state.lock().unwrap();
            s.stall_writes_ms
        };
        if stall > 0 {
            embassy_time::Timer::after_millis(stall).await;
        }
        let mut s = self.state.lock().unwrap();
        let Some(name) = s.open.clone() else {
            return Err(StoreError::NotOpen);
        };
        if !s.fail_writes.is_empty() {
            let err = s.fail_writes.remove(0);
            if err == StoreError::FileInvalid {
                // An invalid handle also drops the open file, like the
                // null-filesystem-pointer path in the original.
                s.open = None;
            }
            return Err(err);
        }
        s.write_count += 1;
        s.files.get_mut(&name).ok_or(StoreError::FileInvalid)?.extend_from_slice(data);
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        if s.open.is_none() {
            return Err(StoreError::NotOpen);
        }
        if s.fail_sync > 0 {
            s.fail_sync -= 1;
            return Err(StoreError::Io);
        }
        s.sync_count += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        if s.open.is_none() {
            return Err(StoreError::NotOpen);
        }
        if s.fail_close > 0 {
            s.fail_close -= 1;
            return Err(StoreError::Io);
        }
        s.close_count += 1;
        s.open = None;
        Ok(())
    }

    async fn exists(&mut self, name: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().unwrap().files.contains_key(name))
    }

    async fn size_of(&mut self, name: &str) -> Result<u64, StoreError> {
        let s = self.state.lock().unwrap();
        s.files
            .get(name)
            .map(|f| f.len() as u64)
            .ok_or(StoreError::Io)
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_write_close_round_trip() {
        let mut store = MockStore::new();
        store.create("a.pcm").await.unwrap();
        store.write(&[1, 2, 3]).await.unwrap();
        store.write(&[4]).await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.file_bytes("a.pcm").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(store.size_of("a.pcm").await.unwrap(), 4);
        assert!(store.exists("a.pcm").await.unwrap());
        assert!(!store.is_open());
    }

    #[tokio::test]
    async fn create_always_truncates() {
        let mut store = MockStore::new();
        store.create("a.pcm").await.unwrap();
        store.write(&[9; 16]).await.unwrap();
        store.close().await.unwrap();
        store.create("a.pcm").await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.file_bytes("a.pcm").unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn injected_write_errors_fire_in_order() {
        let mut store = MockStore::new();
        store.create("a.pcm").await.unwrap();
        store.fail_writes(&[StoreError::Io]);
        assert_eq!(store.write(&[0]).await, Err(StoreError::Io));
        assert!(store.write(&[0]).await.is_ok());
    }

    #[tokio::test]
    async fn file_invalid_drops_the_open_file() {
        let mut store = MockStore::new();
        store.create("a.pcm").await.unwrap();
        store.fail_writes(&[StoreError::FileInvalid]);
        assert_eq!(store.write(&[0]).await, Err(StoreError::FileInvalid));
        assert!(!store.is_open());
        assert_eq!(store.write(&[0]).await, Err(StoreError::NotOpen));
    }

    #[tokio::test]
    async fn close_retry_injection() {
        let mut store = MockStore::new();
        store.create("a.pcm").await.unwrap();
        store.fail_close(2);
        assert_eq!(store.close().await, Err(StoreError::Io));
        assert_eq!(store.close().await, Err(StoreError::Io));
        assert!(store.close().await.is_ok(), "third attempt succeeds");
    }
}
