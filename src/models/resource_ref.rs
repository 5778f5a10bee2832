use std::fmt;

use log::error;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// ResourceRef identifies a taggable provider resource,
/// usually its ARN, e.g. `arn:aws:eks:us-west-2:123456789012:cluster/prod`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            let msg = "Resource reference must not be empty".to_string();
            error!("{msg}");
            return Err(Error::Config(msg));
        }
        if self.0.chars().any(char::is_whitespace) {
            let msg = format!("Resource reference {:?} contains whitespace", self.0);
            error!("{msg}");
            return Err(Error::Config(msg));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}
