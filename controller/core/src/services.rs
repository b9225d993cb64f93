use crate::{config::Binding, config::EnvVar, Result};
use std::collections::BTreeMap;

/// Resolves the variables a backing-service binding contributes to an app's environment.
#[async_trait::async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn service_vars(&self, binding: &Binding) -> Result<Vec<EnvVar>>;
}

/// Reads credentials and key material kept outside the engine.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the key/value pairs stored at `path`; a missing path is `NotFound`.
    async fn secret(&self, path: &str) -> Result<BTreeMap<String, String>>;
}
