pub mod build_params;
pub mod resource_ref;
pub mod tag_set;
pub mod update_plan;

pub use build_params::{
    cloud_provider_tag_key, cluster_tag_key, nodegroup_tags, BuildParams, ResourceLifecycle,
    COMMON_ROLE_TAG_VALUE,
};
pub use resource_ref::ResourceRef;
pub use tag_set::TagSet;
pub use update_plan::{ReconcileOutcome, TagUpdatePlan};
