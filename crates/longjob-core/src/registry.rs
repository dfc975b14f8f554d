//! Concurrent store of live jobs.
//!
//! The registry maps a [`JobId`] to a [`JobEntry`] (payload plus cancellation
//! token). It is backed by a sharded [`DashMap`]: every operation takes one
//! shard lock for the duration of a single non-suspending call and never
//! across an `.await`.
//!
//! Removal is the coordination point between the two paths that race to
//! finalize a job (the stream reaching the end of its payload, and an explicit
//! cancel). Only one concurrent caller of [`JobRegistry::remove`] or
//! [`JobRegistry::take`] for a given id ever observes the entry.

use crate::common::types::{JobId, Payload};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio_util::sync::CancellationToken;

/// A registered job: its precomputed output and its one-shot cancel trigger.
///
/// Cloning is cheap: the payload is reference counted and the token is a
/// handle onto shared state.
#[derive(Clone, Debug)]
pub struct JobEntry {
    payload: Payload,
    cancel: CancellationToken,
}

impl JobEntry {
    /// Creates an entry with a fresh, unset cancellation token.
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            cancel: CancellationToken::new(),
        }
    }

    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `id`.
    ///
    /// Returns `false`, leaving the existing entry untouched, if `id` is
    /// already registered.
    pub fn insert(&self, id: JobId, entry: JobEntry) -> bool {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Looks up a job. Returns `None` for unknown or already removed ids.
    pub fn try_get(&self, id: &JobId) -> Option<JobEntry> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Removes a job and hands back its entry, if it was still registered.
    pub fn take(&self, id: &JobId) -> Option<JobEntry> {
        self.jobs.remove(id).map(|(_, entry)| entry)
    }

    /// Removes a job. Returns whether this call performed the removal.
    pub fn remove(&self, id: &JobId) -> bool {
        self.take(id).is_some()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
