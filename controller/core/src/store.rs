//! The relations the engine reads and writes.
//!
//! Every mutation is a single statement, idempotent at its natural key, except
//! [`Store::add_config_vars`], which must apply atomically.

use crate::{
    config::{Binding, ConfigSet, ConfigVar},
    deployment::{Deployment, Memory},
    job::{CronJob, Job},
    space::Space,
    Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A symbolic resource class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    #[serde(rename = "type", default)]
    pub plan_type: String,
    pub memory: Memory,
}

/// A site route bound to a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub domain: String,
    pub path: String,
    /// Whether the site is served by the private ingress.
    #[serde(default)]
    pub internal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    pub api_server: String,
    pub auth: ClusterAuth,
    /// Where the credentials live in the secret store.
    pub secret_path: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterAuth {
    /// Mutual TLS with a client certificate, key, and CA bundle.
    Certificate,
    /// A static bearer token, verified against a CA bundle.
    Token,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // Spaces.

    async fn space(&self, name: &str) -> Result<Option<Space>>;

    async fn spaces(&self) -> Result<Vec<Space>>;

    /// Fails with `Conflict` if the space exists.
    async fn create_space(&self, space: &Space) -> Result<()>;

    async fn delete_space(&self, name: &str) -> Result<()>;

    // Deployments.

    async fn deployment(&self, name: &str, space: &str) -> Result<Option<Deployment>>;

    async fn deployments(&self, space: &str) -> Result<Vec<Deployment>>;

    async fn deployments_by_app_id(&self, app_id: Uuid) -> Result<Vec<Deployment>>;

    /// Fails with `Conflict` if (name, space) exists.
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Fails with `NotFound` if (name, space) does not exist.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    async fn delete_deployment(&self, name: &str, space: &str) -> Result<()>;

    // Bindings, in stored order.

    async fn bindings(&self, app: &str, space: &str) -> Result<Vec<Binding>>;

    async fn bindings_to(&self, bind_type: &str, bind_name: &str) -> Result<Vec<Binding>>;

    async fn add_binding(&self, binding: &Binding) -> Result<()>;

    async fn delete_binding(&self, binding: &Binding) -> Result<()>;

    async fn delete_bindings(&self, app: &str, space: &str) -> Result<()>;

    // Config sets.

    async fn config_set(&self, name: &str) -> Result<Option<ConfigSet>>;

    async fn config_sets(&self) -> Result<Vec<ConfigSet>>;

    async fn create_config_set(&self, set: &ConfigSet) -> Result<()>;

    /// Deletes the set, its variables, and its includes.
    async fn delete_config_set(&self, name: &str) -> Result<()>;

    async fn config_vars(&self, set: &str) -> Result<Vec<ConfigVar>>;

    /// Variables of every set `set` includes, one level deep.
    async fn included_config_vars(&self, set: &str) -> Result<Vec<ConfigVar>>;

    async fn includes(&self, set: &str) -> Result<Vec<String>>;

    async fn add_include(&self, parent: &str, child: &str) -> Result<()>;

    async fn delete_include(&self, parent: &str, child: &str) -> Result<()>;

    /// Inserts or replaces the value at (set, name).
    async fn upsert_config_var(&self, var: &ConfigVar) -> Result<()>;

    async fn delete_config_var(&self, set: &str, name: &str) -> Result<()>;

    /// Atomically ensures `set` and `binding` exist and upserts `vars` into the set.
    async fn add_config_vars(
        &self,
        set: &ConfigSet,
        binding: &Binding,
        vars: &[ConfigVar],
    ) -> Result<()>;

    // Plans, features, and routes.

    async fn plan(&self, name: &str) -> Result<Option<Plan>>;

    async fn features(&self, app: &str, space: &str) -> Result<BTreeMap<String, bool>>;

    async fn routes(&self, app: &str, space: &str) -> Result<Vec<Route>>;

    // Jobs.

    async fn job(&self, name: &str, space: &str) -> Result<Option<Job>>;

    async fn jobs(&self, space: &str) -> Result<Vec<Job>>;

    async fn put_job(&self, job: &Job) -> Result<()>;

    async fn delete_job(&self, name: &str, space: &str) -> Result<()>;

    async fn cron_job(&self, name: &str, space: &str) -> Result<Option<CronJob>>;

    async fn cron_jobs(&self, space: &str) -> Result<Vec<CronJob>>;

    async fn put_cron_job(&self, cron: &CronJob) -> Result<()>;

    async fn delete_cron_job(&self, name: &str, space: &str) -> Result<()>;

    // Clusters.

    async fn clusters(&self) -> Result<Vec<ClusterRecord>>;
}
