//! Provider collaborators consumed by the reconciler.
//!
//! Concrete cloud clients implement [`TagReader`] and [`TagWriter`]; they are
//! expected to report rate-limit rejections as `Error::Throttle` (see
//! [`crate::governor::ThrottleCodes::classify`]) and everything else as
//! `Error::Transport`.
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ResourceRef, TagSet};
use crate::Result;

pub mod governed;
pub mod memory;

pub use governed::GovernedClient;
pub use memory::MemoryTagStore;

#[async_trait]
pub trait TagReader: Send + Sync {
    /// Fetch the tags currently set on `resource`.
    async fn get_current_tags(&self, resource: &ResourceRef) -> Result<TagSet>;
}

#[async_trait]
pub trait TagWriter: Send + Sync {
    /// Add `tags` to `resource`, overwriting the values of existing keys.
    async fn add_or_update_tags(&self, resource: &ResourceRef, tags: &TagSet) -> Result<()>;

    /// Remove `keys` from `resource`. Missing keys are not an error.
    async fn remove_tags(&self, resource: &ResourceRef, keys: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: TagReader + ?Sized> TagReader for Arc<T> {
    async fn get_current_tags(&self, resource: &ResourceRef) -> Result<TagSet> {
        (**self).get_current_tags(resource).await
    }
}

#[async_trait]
impl<T: TagWriter + ?Sized> TagWriter for Arc<T> {
    async fn add_or_update_tags(&self, resource: &ResourceRef, tags: &TagSet) -> Result<()> {
        (**self).add_or_update_tags(resource, tags).await
    }

    async fn remove_tags(&self, resource: &ResourceRef, keys: &[String]) -> Result<()> {
        (**self).remove_tags(resource, keys).await
    }
}
