use async_trait::async_trait;

use super::{TagReader, TagWriter};
use crate::governor::Governor;
use crate::models::{ResourceRef, TagSet};
use crate::Result;

/// GovernedClient sends every tag API call of `C` through a [`Governor`].
#[derive(Debug, Clone)]
pub struct GovernedClient<C> {
    inner: C,
    governor: Governor,
}

impl<C> GovernedClient<C> {
    pub fn new(inner: C, governor: Governor) -> Self {
        Self { inner, governor }
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: TagReader> TagReader for GovernedClient<C> {
    async fn get_current_tags(&self, resource: &ResourceRef) -> Result<TagSet> {
        self.governor
            .call(|| self.inner.get_current_tags(resource))
            .await
    }
}

#[async_trait]
impl<C: TagWriter> TagWriter for GovernedClient<C> {
    async fn add_or_update_tags(&self, resource: &ResourceRef, tags: &TagSet) -> Result<()> {
        self.governor
            .call(|| self.inner.add_or_update_tags(resource, tags))
            .await
    }

    async fn remove_tags(&self, resource: &ResourceRef, keys: &[String]) -> Result<()> {
        self.governor
            .call(|| self.inner.remove_tags(resource, keys))
            .await
    }
}
