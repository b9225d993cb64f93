use crate::{gateway::Gateway, labels, shape::Shaper};
use k8s_openapi::api::{
    apps::v1::{Deployment, ReplicaSet},
    batch::v1::{CronJob, Job},
    core::v1::{Pod, Service},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use region_controller_core::{
    cluster::{
        ClusterError, ClusterResult, LiveCronJob, LiveDeployment, LiveJob, PodInfo,
        ReplicaSetInfo,
    },
    deployment::{ServiceSpec, Workload},
    job::{CronWorkload, JobWorkload},
    space::Space,
    Cluster,
};
use serde_json::json;
use tracing::debug;

/// A cluster reached through the Kubernetes API.
#[derive(Clone, Debug)]
pub struct KubeCluster {
    gateway: Gateway,
    shaper: Shaper,
}

fn deployments(space: &str) -> String {
    format!("/apis/apps/v1/namespaces/{space}/deployments")
}

fn replica_sets(space: &str) -> String {
    format!("/apis/apps/v1/namespaces/{space}/replicasets")
}

fn services(space: &str) -> String {
    format!("/api/v1/namespaces/{space}/services")
}

fn pods(space: &str) -> String {
    format!("/api/v1/namespaces/{space}/pods")
}

fn jobs(space: &str) -> String {
    format!("/apis/batch/v1/namespaces/{space}/jobs")
}

fn cron_jobs(space: &str) -> String {
    format!("/apis/batch/v1/namespaces/{space}/cronjobs")
}

const NAMESPACES: &str = "/api/v1/namespaces";

/// Deletes dependents in the background so the call returns once the owner is gone.
const BACKGROUND: &str = "?propagationPolicy=Background";

// === impl KubeCluster ===

impl KubeCluster {
    pub fn new(gateway: Gateway, shaper: Shaper) -> Self {
        Self { gateway, shaper }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn deployment_object(&self, space: &str, name: &str) -> ClusterResult<Deployment> {
        let path = format!("{}/{name}", deployments(space));
        self.gateway
            .get(&path)
            .await?
            .ok_or(ClusterError::NotFound(path))
    }
}

#[async_trait::async_trait]
impl Cluster for KubeCluster {
    fn name(&self) -> &str {
        self.gateway.name()
    }

    async fn create_namespace(&self, space: &Space) -> ClusterResult<()> {
        self.gateway
            .post(NAMESPACES, &self.shaper.namespace(space))
            .await
    }

    async fn delete_namespace(&self, space: &str) -> ClusterResult<()> {
        self.gateway.delete(&format!("{NAMESPACES}/{space}")).await
    }

    async fn deployment(&self, space: &str, name: &str) -> ClusterResult<Option<LiveDeployment>> {
        let path = format!("{}/{name}", deployments(space));
        let deployment = self.gateway.get::<Deployment>(&path).await?;
        Ok(deployment.map(live_deployment))
    }

    async fn deployments(&self, space: &str) -> ClusterResult<Vec<LiveDeployment>> {
        let items = self.gateway.list::<Deployment>(&deployments(space)).await?;
        Ok(items.into_iter().map(live_deployment).collect())
    }

    async fn create_deployment(&self, workload: &Workload) -> ClusterResult<()> {
        let obj = self.shaper.deployment(workload);
        self.gateway.post(&deployments(&workload.space), &obj).await
    }

    async fn update_deployment(&self, workload: &Workload) -> ClusterResult<()> {
        let obj = self.shaper.deployment(workload);
        let path = format!("{}/{}", deployments(&workload.space), workload.name);
        self.gateway.put(&path, &obj).await
    }

    async fn delete_deployment(&self, space: &str, name: &str) -> ClusterResult<()> {
        let path = format!("{}/{name}{BACKGROUND}", deployments(space));
        self.gateway.delete(&path).await
    }

    async fn scale_deployment(&self, space: &str, name: &str, replicas: i32) -> ClusterResult<()> {
        let path = format!("{}/{name}", deployments(space));
        self.gateway
            .merge_patch(&path, &json!({ "spec": { "replicas": replicas } }))
            .await
    }

    async fn restart_deployment(&self, space: &str, name: &str, stamp: &str) -> ClusterResult<()> {
        let mut deployment = self.deployment_object(space, name).await?;
        let container = deployment
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
            .and_then(|p| p.containers.first_mut())
            .ok_or_else(|| ClusterError::Decode(format!("deployment {name} has no containers")))?;

        let env = container.env.get_or_insert_with(Vec::new);
        match env.iter_mut().find(|v| v.name == "RESTART") {
            Some(var) => var.value = Some(stamp.to_string()),
            None => env.push(k8s_openapi::api::core::v1::EnvVar {
                name: "RESTART".to_string(),
                value: Some(stamp.to_string()),
                ..Default::default()
            }),
        }

        let path = format!("{}/{name}", deployments(space));
        self.gateway.put(&path, &deployment).await
    }

    async fn rollback_deployment(
        &self,
        space: &str,
        name: &str,
        revision: i64,
    ) -> ClusterResult<()> {
        let path = format!(
            "{}?labelSelector={}",
            replica_sets(space),
            labels::query(labels::APP, name)
        );
        let target = self
            .gateway
            .list::<ReplicaSet>(&path)
            .await?
            .into_iter()
            .find(|rs| revision_of(&rs.metadata) == Some(revision))
            .and_then(|rs| rs.spec.and_then(|s| s.template))
            .ok_or_else(|| ClusterError::NotFound(format!("{name} revision {revision}")))?;

        let mut deployment = self.deployment_object(space, name).await?;
        if let Some(spec) = deployment.spec.as_mut() {
            let mut template = target;
            // The replica set's template carries its hash label, which the deployment must not.
            if let Some(labels) = template
                .metadata
                .as_mut()
                .and_then(|m| m.labels.as_mut())
            {
                labels.remove("pod-template-hash");
            }
            spec.template = template;
        }
        debug!(%space, %name, revision, "Rolling back");
        self.gateway
            .put(&format!("{}/{name}", deployments(space)), &deployment)
            .await
    }

    async fn replica_sets(&self, space: &str, app: &str) -> ClusterResult<Vec<ReplicaSetInfo>> {
        let path = format!(
            "{}?labelSelector={}",
            replica_sets(space),
            labels::query(labels::APP, app)
        );
        let mut sets = self
            .gateway
            .list::<ReplicaSet>(&path)
            .await?
            .into_iter()
            .map(|rs| ReplicaSetInfo {
                revision: revision_of(&rs.metadata).unwrap_or_default(),
                image: rs
                    .spec
                    .as_ref()
                    .and_then(|s| s.template.as_ref())
                    .and_then(|t| t.spec.as_ref())
                    .and_then(|p| p.containers.first())
                    .and_then(|c| c.image.clone()),
                name: rs.metadata.name.unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        sets.sort_by_key(|rs| rs.revision);
        Ok(sets)
    }

    async fn delete_replica_set(&self, space: &str, name: &str) -> ClusterResult<()> {
        self.gateway
            .delete(&format!("{}/{name}", replica_sets(space)))
            .await
    }

    async fn service_exists(&self, space: &str, name: &str) -> ClusterResult<bool> {
        let svc = self
            .gateway
            .get::<Service>(&format!("{}/{name}", services(space)))
            .await?;
        Ok(svc.is_some())
    }

    async fn create_service(&self, service: &ServiceSpec) -> ClusterResult<()> {
        self.gateway
            .post(&services(&service.space), &self.shaper.service(service))
            .await
    }

    async fn update_service(&self, service: &ServiceSpec) -> ClusterResult<()> {
        let path = format!("{}/{}", services(&service.space), service.name);
        let mut existing = self
            .gateway
            .get::<Service>(&path)
            .await?
            .ok_or_else(|| ClusterError::NotFound(path.clone()))?;

        let desired = self.shaper.service_spec(service);
        let spec = existing.spec.get_or_insert_with(Default::default);
        spec.ports = desired.ports;
        spec.selector = desired.selector;
        existing.metadata.labels = Some(service.labels.clone());
        self.gateway.put(&path, &existing).await
    }

    async fn delete_service(&self, space: &str, name: &str) -> ClusterResult<()> {
        self.gateway
            .delete(&format!("{}/{name}", services(space)))
            .await
    }

    async fn pods(&self, space: &str, app: Option<&str>) -> ClusterResult<Vec<PodInfo>> {
        let path = match app {
            Some(app) => format!(
                "{}?labelSelector={}",
                pods(space),
                labels::query(labels::NAME, app)
            ),
            None => pods(space),
        };
        let items = self.gateway.list::<Pod>(&path).await?;
        Ok(items
            .into_iter()
            .map(|pod| PodInfo {
                phase: pod.status.and_then(|s| s.phase),
                app: pod
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(labels::NAME).cloned()),
                name: pod.metadata.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_pod(&self, workload: &Workload) -> ClusterResult<()> {
        self.gateway
            .post(&pods(&workload.space), &self.shaper.pod(workload))
            .await
    }

    async fn delete_pod(&self, space: &str, name: &str) -> ClusterResult<()> {
        self.gateway.delete(&format!("{}/{name}", pods(space))).await
    }

    async fn job(&self, space: &str, name: &str) -> ClusterResult<Option<LiveJob>> {
        let job = self
            .gateway
            .get::<Job>(&format!("{}/{name}", jobs(space)))
            .await?;
        Ok(job.map(|job| {
            let status = job.status.unwrap_or_default();
            LiveJob {
                name: job.metadata.name.unwrap_or_default(),
                active: status.active.unwrap_or_default(),
                succeeded: status.succeeded.unwrap_or_default(),
                failed: status.failed.unwrap_or_default(),
                parallelism: job.spec.and_then(|s| s.parallelism),
            }
        }))
    }

    async fn create_job(&self, job: &JobWorkload) -> ClusterResult<()> {
        self.gateway
            .post(&jobs(&job.workload.space), &self.shaper.job(job))
            .await
    }

    async fn delete_job(&self, space: &str, name: &str) -> ClusterResult<()> {
        self.gateway
            .delete(&format!("{}/{name}{BACKGROUND}", jobs(space)))
            .await
    }

    async fn scale_job(
        &self,
        space: &str,
        name: &str,
        parallelism: i32,
        active_deadline_seconds: i64,
    ) -> ClusterResult<()> {
        let patch = json!({
            "spec": {
                "parallelism": parallelism,
                "activeDeadlineSeconds": active_deadline_seconds,
            }
        });
        self.gateway
            .merge_patch(&format!("{}/{name}", jobs(space)), &patch)
            .await
    }

    async fn cron_job(&self, space: &str, name: &str) -> ClusterResult<Option<LiveCronJob>> {
        let cron = self
            .gateway
            .get::<CronJob>(&format!("{}/{name}", cron_jobs(space)))
            .await?;
        Ok(cron.map(|cron| {
            let spec = cron.spec.unwrap_or_default();
            LiveCronJob {
                name: cron.metadata.name.unwrap_or_default(),
                schedule: spec.schedule,
                suspended: spec.suspend.unwrap_or(false),
                last_schedule: cron
                    .status
                    .and_then(|s| s.last_schedule_time)
                    .map(|t| t.0),
            }
        }))
    }

    async fn create_cron_job(&self, cron: &CronWorkload) -> ClusterResult<()> {
        self.gateway
            .post(&cron_jobs(&cron.workload.space), &self.shaper.cron_job(cron))
            .await
    }

    async fn update_cron_job(&self, cron: &CronWorkload) -> ClusterResult<()> {
        let path = format!("{}/{}", cron_jobs(&cron.workload.space), cron.workload.name);
        self.gateway.put(&path, &self.shaper.cron_job(cron)).await
    }

    async fn delete_cron_job(&self, space: &str, name: &str) -> ClusterResult<()> {
        self.gateway
            .delete(&format!("{}/{name}{BACKGROUND}", cron_jobs(space)))
            .await
    }
}

fn live_deployment(d: Deployment) -> LiveDeployment {
    let revision = revision_of(&d.metadata);
    let image = d
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.clone());
    let status = d.status.unwrap_or_default();
    LiveDeployment {
        name: d.metadata.name.unwrap_or_default(),
        image,
        replicas: status.replicas.unwrap_or_default(),
        ready_replicas: status.ready_replicas.unwrap_or_default(),
        revision,
    }
}

fn revision_of(meta: &ObjectMeta) -> Option<i64> {
    meta.annotations
        .as_ref()?
        .get(labels::REVISION)?
        .parse()
        .ok()
}
