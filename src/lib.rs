//! Rate-governed tag reconciliation for cloud resources.
//!
//! A [`Reconciler`] converges the tags of provider resources to a desired
//! set, issuing every provider call through a [`Governor`] whose token bucket
//! [`Limiter`] is drained as soon as the provider reports throttling.
pub mod client;
pub mod config;
pub mod diff;
mod error;
pub mod governor;
pub mod models;
pub mod options;
pub mod rate;
pub mod reconcile;

pub use crate::client::{GovernedClient, MemoryTagStore, TagReader, TagWriter};
pub use crate::config::{ClusterScope, GovernorConfig, ReconcilerConfig};
pub use crate::diff::diff;
pub use crate::error::{Error, Result};
pub use crate::governor::{Governor, ThrottleCodes};
pub use crate::models::{ReconcileOutcome, ResourceRef, TagSet, TagUpdatePlan};
pub use crate::options::GovernorOptions;
pub use crate::rate::Limiter;
pub use crate::reconcile::Reconciler;
