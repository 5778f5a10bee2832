use serde::{Deserialize, Serialize};

use super::tag_set::TagSet;

/// Prefix of the tag marking which cluster owns a resource.
pub const CLUSTER_TAG_PREFIX: &str = "sigs.k8s.io/cluster-api-provider-aws/cluster/";

/// Tag key holding the role of a resource within the cluster.
pub const ROLE_TAG_KEY: &str = "sigs.k8s.io/cluster-api-provider-aws/role";

/// Role value shared by cluster-wide resources.
pub const COMMON_ROLE_TAG_VALUE: &str = "common";

/// Prefix of the tag the Kubernetes cloud provider uses to discover cluster resources.
pub const CLOUD_PROVIDER_TAG_PREFIX: &str = "kubernetes.io/cluster/";

pub const NAME_TAG_KEY: &str = "Name";

/// Whether the cluster owns a resource or merely uses it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceLifecycle {
    /// The resource is created, updated and deleted along with the cluster.
    #[serde(rename = "owned")]
    Owned,
    /// The resource is shared with other clusters and must outlive this one.
    #[serde(rename = "shared")]
    Shared,
}

impl ResourceLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLifecycle::Owned => "owned",
            ResourceLifecycle::Shared => "shared",
        }
    }
}

/// Key of the ownership tag for `cluster_name`.
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{CLUSTER_TAG_PREFIX}{cluster_name}")
}

/// Key of the cloud provider discovery tag for `cluster_name`.
pub fn cloud_provider_tag_key(cluster_name: &str) -> String {
    format!("{CLOUD_PROVIDER_TAG_PREFIX}{cluster_name}")
}

/// BuildParams describes the desired tags of one resource.
/// Fixed fields always win over `additional`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildParams {
    /// Name of the owning cluster.
    pub cluster_name: String,

    /// Provider identifier of the resource the tags are built for.
    pub resource_id: String,

    pub lifecycle: ResourceLifecycle,

    /// Value of the `Name` tag.
    pub name: Option<String>,

    /// Value of the role tag.
    pub role: Option<String>,

    /// User supplied tags merged underneath the fixed ones.
    #[serde(default)]
    pub additional: TagSet,
}

impl BuildParams {
    pub fn build(&self) -> TagSet {
        let mut tags = self.additional.clone();
        tags.insert(cluster_tag_key(&self.cluster_name), self.lifecycle.as_str());
        if let Some(role) = &self.role {
            tags.insert(ROLE_TAG_KEY, role.as_str());
        }
        if let Some(name) = &self.name {
            tags.insert(NAME_TAG_KEY, name.as_str());
        }
        tags
    }
}

/// Desired tags of a managed node group: the additional tags plus the
/// cloud provider ownership marker.
pub fn nodegroup_tags(cluster_name: &str, additional: &TagSet) -> TagSet {
    let mut tags = additional.clone();
    tags.insert(
        cloud_provider_tag_key(cluster_name),
        ResourceLifecycle::Owned.as_str(),
    );
    tags
}
