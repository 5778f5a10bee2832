//! Tag reconciliation.
//!
//! A pass reads the tags currently set on a resource, diffs them against the
//! desired set and issues at most one add/update call and one remove call,
//! all through the governed client. Passes fail fast and never retry: the
//! algorithm is idempotent, so the scheduling loop simply runs it again later.
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{GovernedClient, TagReader, TagWriter};
use crate::config::ClusterScope;
use crate::diff::diff;
use crate::governor::Governor;
use crate::models::{
    nodegroup_tags, BuildParams, ReconcileOutcome, ResourceRef, TagSet, COMMON_ROLE_TAG_VALUE,
};
use crate::{Error, Result};

pub struct Reconciler<C> {
    client: Arc<GovernedClient<C>>,
}

impl<C> Clone for Reconciler<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C> std::fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("governor", self.client.governor())
            .finish_non_exhaustive()
    }
}

impl<C: TagReader + TagWriter> Reconciler<C> {
    /// Reconciler issuing every call of `client` through `governor`.
    pub fn new(client: C, governor: Governor) -> Self {
        Self {
            client: Arc::new(GovernedClient::new(client, governor)),
        }
    }

    pub fn governor(&self) -> &Governor {
        self.client.governor()
    }

    pub fn client(&self) -> &C {
        self.client.inner()
    }

    /// Converge the tags of `resource` to `desired`.
    pub async fn reconcile(
        &self,
        resource: &ResourceRef,
        desired: &TagSet,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_with(resource, desired, true).await
    }

    /// Make sure `desired` is set on `resource`, leaving every other tag alone.
    pub async fn ensure(
        &self,
        resource: &ResourceRef,
        desired: &TagSet,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_with(resource, desired, false).await
    }

    // Without `prune`, keys absent from `desired` stay on the resource.
    async fn reconcile_with(
        &self,
        resource: &ResourceRef,
        desired: &TagSet,
        prune: bool,
    ) -> Result<ReconcileOutcome> {
        resource.validate()?;
        desired.validate()?;

        let current = self.client.get_current_tags(resource).await?;
        let mut plan = diff(&current, desired);
        if !prune {
            plan.remove_keys.clear();
        }
        if plan.is_empty() {
            debug!("Tags of {resource} already converged");
            return Ok(ReconcileOutcome::default());
        }

        if !plan.upsert.is_empty() {
            info!("Tagging {resource}: {} tags to add or update", plan.upsert.len());
            self.client
                .add_or_update_tags(resource, &plan.upsert)
                .await
                .map_err(|e| {
                    warn!("Fail to tag {resource}: {e}");
                    e
                })?;
        }

        if !plan.remove_keys.is_empty() {
            info!("Untagging {resource}: {:?}", plan.remove_keys);
            self.client
                .remove_tags(resource, &plan.remove_keys)
                .await
                .map_err(|e| {
                    warn!("Fail to untag {resource}: {e}");
                    e
                })?;
        }

        Ok(ReconcileOutcome {
            upserted: plan.upsert.len(),
            removed: plan.remove_keys.len(),
        })
    }

    /// Like [`Reconciler::reconcile`], abandoned with `Error::Cancelled` once
    /// `token` is cancelled. Calls already issued are not rolled back; the
    /// next pass finishes the job.
    pub async fn reconcile_cancellable(
        &self,
        resource: &ResourceRef,
        desired: &TagSet,
        token: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            res = self.reconcile(resource, desired) => res,
        }
    }

    /// Ensure the ownership tags of the cluster itself.
    /// Tags set on the cluster by anyone else are kept.
    pub async fn reconcile_cluster(
        &self,
        scope: &ClusterScope,
        cluster: &ResourceRef,
    ) -> Result<ReconcileOutcome> {
        let desired = cluster_tags(scope, cluster);
        self.ensure(cluster, &desired).await
    }

    /// Reconcile the tags of a managed node group of the cluster.
    pub async fn reconcile_nodegroup(
        &self,
        scope: &ClusterScope,
        nodegroup: &ResourceRef,
    ) -> Result<ReconcileOutcome> {
        let desired = nodegroup_tags(&scope.name, &scope.additional_tags);
        self.reconcile(nodegroup, &desired).await
    }
}

impl<C: TagReader + TagWriter + 'static> Reconciler<C> {
    /// Reconcile several resources in parallel, one task each, all drawing
    /// on the same rate budget. Results come back in completion order.
    pub async fn reconcile_batch(
        &self,
        items: Vec<(ResourceRef, TagSet)>,
    ) -> Vec<(ResourceRef, Result<ReconcileOutcome>)> {
        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::with_capacity(items.len());
        let total = items.len();
        for (resource, desired) in items {
            let this = self.clone();
            let key = resource.clone();
            let handle = tasks.spawn(async move {
                let res = this.reconcile(&resource, &desired).await;
                (resource, res)
            });
            spawned.insert(handle.id(), key);
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    let resource = spawned
                        .remove(&e.id())
                        .unwrap_or_else(|| ResourceRef::new(""));
                    error!("Reconcile task for {resource} failed: {e}");
                    results.push((
                        resource,
                        Err(Error::Task(format!("reconcile task failed: {e}"))),
                    ));
                }
            }
        }
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!("{failed} of {total} reconciliations failed");
        }
        results
    }
}

/// Desired tags of the cluster resource.
pub fn cluster_tags(scope: &ClusterScope, cluster: &ResourceRef) -> TagSet {
    BuildParams {
        cluster_name: scope.name.clone(),
        resource_id: cluster.to_string(),
        lifecycle: scope.lifecycle,
        name: Some(scope.kubernetes_cluster_name.clone()),
        role: Some(COMMON_ROLE_TAG_VALUE.to_string()),
        additional: scope.additional_tags.clone(),
    }
    .build()
}
