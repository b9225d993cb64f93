use crate::{deployment::validate_name, Result};
use serde::{Deserialize, Serialize};

/// A namespace owning deployments, jobs, and bindings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub name: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub compliance: String,
    /// The cluster this space's workloads run on.
    #[serde(default, rename = "stack")]
    pub cluster: String,
}

impl Space {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, "space")
    }

    pub fn compliance_tags(&self) -> impl Iterator<Item = &str> {
        self.compliance
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
