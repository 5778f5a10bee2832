//! In-memory tag provider.
//!
//! Stands in for a cloud tagging API in tests and dry runs: it records how
//! many calls it served and can be told to fail upcoming calls.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use super::{TagReader, TagWriter};
use crate::models::{ResourceRef, TagSet};
use crate::{Error, Result};

/// The provider call an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    AddOrUpdate,
    Remove,
}

#[derive(Debug, Default)]
pub struct MemoryTagStore {
    resources: Mutex<HashMap<ResourceRef, TagSet>>,
    failures: Mutex<VecDeque<(Operation, Error)>>,
    reads: AtomicUsize,
    adds: AtomicUsize,
    removes: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register `resource` with its current tags.
    pub fn insert(&self, resource: ResourceRef, tags: TagSet) {
        lock(&self.resources).insert(resource, tags);
    }

    pub fn tags(&self, resource: &ResourceRef) -> Option<TagSet> {
        lock(&self.resources).get(resource).cloned()
    }

    /// Make the next `op` call fail with `error`. Failures queue up in order.
    pub fn fail_next(&self, op: Operation, error: Error) {
        lock(&self.failures).push_back((op, error));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Add and remove calls served so far, failed ones included.
    pub fn writes(&self) -> usize {
        self.adds() + self.removes()
    }

    fn take_failure(&self, op: Operation) -> Option<Error> {
        let mut failures = lock(&self.failures);
        let pos = failures.iter().position(|(o, _)| *o == op)?;
        failures.remove(pos).map(|(_, e)| e)
    }

    fn with_resource<T>(
        &self,
        resource: &ResourceRef,
        f: impl FnOnce(&mut TagSet) -> T,
    ) -> Result<T> {
        let mut resources = lock(&self.resources);
        match resources.get_mut(resource) {
            Some(tags) => Ok(f(tags)),
            None => Err(Error::Transport(format!(
                "ResourceNotFoundException: {resource} does not exist"
            ))),
        }
    }
}

#[async_trait]
impl TagReader for MemoryTagStore {
    async fn get_current_tags(&self, resource: &ResourceRef) -> Result<TagSet> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure(Operation::Read) {
            return Err(e);
        }
        self.with_resource(resource, |tags| tags.clone())
    }
}

#[async_trait]
impl TagWriter for MemoryTagStore {
    async fn add_or_update_tags(&self, resource: &ResourceRef, tags: &TagSet) -> Result<()> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure(Operation::AddOrUpdate) {
            return Err(e);
        }
        debug!("Tagging {resource} with {} tags", tags.len());
        self.with_resource(resource, |current| current.extend_from(tags))
    }

    async fn remove_tags(&self, resource: &ResourceRef, keys: &[String]) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.take_failure(Operation::Remove) {
            return Err(e);
        }
        debug!("Untagging {resource}: {keys:?}");
        self.with_resource(resource, |current| {
            for key in keys {
                current.remove(key);
            }
        })
    }
}
