//! The abstract capability set the reconcilers use to write cluster state.
//!
//! Implementations translate these operations into a particular orchestrator's vocabulary;
//! nothing above this trait knows which orchestrator it is talking to.

use crate::{
    deployment::{ServiceSpec, Workload},
    job::{CronWorkload, JobWorkload},
    space::Space,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// The object does not exist.
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    /// The cluster rejected the object as malformed.
    #[error("rejected by the cluster: {0}")]
    Invalid(String),

    /// Any other non-success response, returned verbatim.
    #[error("cluster responded {code}: {body}")]
    Status { code: u16, body: String },

    /// The request never completed; callers may retry.
    #[error("cluster request failed: {0}")]
    Transport(String),

    #[error("unexpected cluster response: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
            || matches!(self, Self::Status { code, .. } if *code >= 500)
    }
}

/// Observed state of a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LiveDeployment {
    pub name: String,
    pub image: Option<String>,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub revision: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplicaSetInfo {
    pub name: String,
    pub revision: i64,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub phase: Option<String>,
    pub app: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LiveJob {
    pub name: String,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub parallelism: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LiveCronJob {
    pub name: String,
    pub schedule: String,
    pub suspended: bool,
    pub last_schedule: Option<DateTime<Utc>>,
}

pub type ClusterResult<T> = Result<T, ClusterError>;

#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    fn name(&self) -> &str;

    async fn create_namespace(&self, space: &Space) -> ClusterResult<()>;

    async fn delete_namespace(&self, space: &str) -> ClusterResult<()>;

    async fn deployment(&self, space: &str, name: &str) -> ClusterResult<Option<LiveDeployment>>;

    async fn deployments(&self, space: &str) -> ClusterResult<Vec<LiveDeployment>>;

    async fn create_deployment(&self, workload: &Workload) -> ClusterResult<()>;

    async fn update_deployment(&self, workload: &Workload) -> ClusterResult<()>;

    async fn delete_deployment(&self, space: &str, name: &str) -> ClusterResult<()>;

    async fn scale_deployment(&self, space: &str, name: &str, replicas: i32) -> ClusterResult<()>;

    /// Forces a rollout by stamping the first container's `RESTART` variable.
    async fn restart_deployment(&self, space: &str, name: &str, stamp: &str) -> ClusterResult<()>;

    /// Returns the deployment's pod template to the one recorded at `revision`.
    async fn rollback_deployment(&self, space: &str, name: &str, revision: i64)
        -> ClusterResult<()>;

    /// Lists the replica sets owned by the app, newest revision last.
    async fn replica_sets(&self, space: &str, app: &str) -> ClusterResult<Vec<ReplicaSetInfo>>;

    async fn delete_replica_set(&self, space: &str, name: &str) -> ClusterResult<()>;

    async fn service_exists(&self, space: &str, name: &str) -> ClusterResult<bool>;

    async fn create_service(&self, service: &ServiceSpec) -> ClusterResult<()>;

    async fn update_service(&self, service: &ServiceSpec) -> ClusterResult<()>;

    async fn delete_service(&self, space: &str, name: &str) -> ClusterResult<()>;

    /// Lists pods in the space, optionally only those labelled with the app's name.
    async fn pods(&self, space: &str, app: Option<&str>) -> ClusterResult<Vec<PodInfo>>;

    async fn create_pod(&self, workload: &Workload) -> ClusterResult<()>;

    async fn delete_pod(&self, space: &str, name: &str) -> ClusterResult<()>;

    async fn job(&self, space: &str, name: &str) -> ClusterResult<Option<LiveJob>>;

    async fn create_job(&self, job: &JobWorkload) -> ClusterResult<()>;

    async fn delete_job(&self, space: &str, name: &str) -> ClusterResult<()>;

    async fn scale_job(
        &self,
        space: &str,
        name: &str,
        parallelism: i32,
        active_deadline_seconds: i64,
    ) -> ClusterResult<()>;

    async fn cron_job(&self, space: &str, name: &str) -> ClusterResult<Option<LiveCronJob>>;

    async fn create_cron_job(&self, cron: &CronWorkload) -> ClusterResult<()>;

    async fn update_cron_job(&self, cron: &CronWorkload) -> ClusterResult<()>;

    async fn delete_cron_job(&self, space: &str, name: &str) -> ClusterResult<()>;
}

/// Treats a missing object as already gone.
pub fn ignore_not_found(res: ClusterResult<()>) -> ClusterResult<()> {
    match res {
        Err(ClusterError::NotFound(_)) => Ok(()),
        res => res,
    }
}
