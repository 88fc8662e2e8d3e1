//! FeedbackCache - last received arguments per OSC path
//!
//! Written by the receive path, read by feedback evaluation. Every operation
//! runs under one lock, so a `store` and a `consume_once` on the same path are
//! ordered: whichever takes the lock first wins and nothing is lost in between.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::osc::OscArg;

/// Shared map of OSC path -> most recent argument list
#[derive(Clone, Default)]
pub struct FeedbackCache {
    entries: Arc<Mutex<HashMap<String, Vec<OscArg>>>>,
}

impl FeedbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `path` with `args`
    pub fn store(&self, path: &str, args: Vec<OscArg>) {
        self.entries.lock().insert(path.to_string(), args);
    }

    /// Store only if `accept` still holds once the lock is taken
    ///
    /// Lets a caller tie a write to a condition that a concurrent `clear`
    /// invalidates. Returns whether the entry was written.
    pub fn store_if(&self, path: &str, args: Vec<OscArg>, accept: impl FnOnce() -> bool) -> bool {
        let mut entries = self.entries.lock();
        if !accept() {
            return false;
        }
        entries.insert(path.to_string(), args);
        true
    }

    /// Snapshot of the arguments last stored for `path`
    pub fn lookup(&self, path: &str) -> Option<Vec<OscArg>> {
        self.entries.lock().get(path).cloned()
    }

    /// One-shot read: true if `path` holds a non-empty argument list, in which
    /// case the entry is removed
    pub fn consume_once(&self, path: &str) -> bool {
        self.take(path).is_some()
    }

    /// Remove and return the entry for `path` if it holds any arguments
    pub fn take(&self, path: &str) -> Option<Vec<OscArg>> {
        let mut entries = self.entries.lock();
        match entries.get(path) {
            Some(args) if !args.is_empty() => entries.remove(path),
            _ => None,
        }
    }

    /// Drop every entry, returning how many were held
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Paths currently cached, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}
