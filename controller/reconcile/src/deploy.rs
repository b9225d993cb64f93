use crate::{compose::PORT, resolve_port, Engine};
use chrono::{SecondsFormat, Utc};
use region_controller_core::{
    cluster::ignore_not_found,
    deployment::{
        validate_instances, validate_port, ApplyOutcome, DeployOutcome, DeploySpec, Deployment,
        DeploymentStatus, HealthCheck, ServiceSpec, Workload,
    },
    ingress::app_fqdn,
    job::command_args,
    space::Space,
    store::Plan,
    Cluster, ClusterError, Error, Failure, Result,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Labels the reconciler derives from stored state. They replace caller labels of the same
/// name.
const PLAN_LABEL: &str = "plan";
const PLAN_TYPE_LABEL: &str = "plan-type";
const INTERNAL_LABEL: &str = "internal";
const HTTP2_LABEL: &str = "http2";

const SERVICE_MESH_FEATURE: &str = "service-mesh";
const HTTP2_FEATURE: &str = "http2";

// === impl Engine ===

impl Engine {
    /// Creates the stored record for a deployment. Nothing is written to the cluster.
    pub async fn create_deployment_record(&self, mut record: Deployment) -> Result<Deployment> {
        record.validate()?;
        self.space(&record.space).await?;
        self.plan(&record.plan).await?;
        if let Some(port) = record.port {
            validate_port(port)?;
        }
        record.image = None;
        self.store.create_deployment(&record).await?;
        info!(space = %record.space, name = %record.name, "Created deployment record");
        Ok(record)
    }

    pub async fn deployment_record(&self, name: &str, space: &str) -> Result<Deployment> {
        self.store
            .deployment(name, space)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("deployment {name} does not exist in {space}"))
            })
    }

    pub async fn set_healthcheck(
        &self,
        name: &str,
        space: &str,
        healthcheck: HealthCheck,
    ) -> Result<Deployment> {
        let _guard = self.locks.lock(space, name).await;
        let mut record = self.deployment_record(name, space).await?;
        record.healthcheck = healthcheck;
        self.store.update_deployment(&record).await?;
        Ok(record)
    }

    pub async fn set_plan(&self, name: &str, space: &str, plan: &str) -> Result<Deployment> {
        let _guard = self.locks.lock(space, name).await;
        self.plan(plan).await?;
        let mut record = self.deployment_record(name, space).await?;
        record.plan = plan.to_string();
        self.store.update_deployment(&record).await?;
        Ok(record)
    }

    /// Records the new instance count, then asks the cluster for it.
    #[instrument(skip(self))]
    pub async fn scale(&self, name: &str, space: &str, instances: i32) -> Result<Deployment> {
        validate_instances(instances)?;
        let _guard = self.locks.lock(space, name).await;
        let mut record = self.deployment_record(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;

        record.instances = instances;
        self.store.update_deployment(&record).await?;
        match cluster.scale_deployment(space, name, instances).await {
            Ok(()) => info!(instances, "Scaled deployment"),
            // Not yet deployed; the count applies on the first deploy.
            Err(ClusterError::NotFound(_)) => debug!("Deployment is not on the cluster"),
            Err(error) => return Err(error.into()),
        }
        Ok(record)
    }

    /// Applies a deployment to its cluster.
    #[instrument(skip(self, spec), fields(space = %spec.space, name = %spec.name))]
    pub async fn deploy(&self, spec: DeploySpec) -> Result<DeployOutcome> {
        let image = spec.validate()?;
        let _guard = self.locks.lock(&spec.space, &spec.name).await;

        let space = self.space(&spec.space).await?;
        let cluster = self.registry.cluster_for_space(&space.name).await?;
        let mut record = self.deployment_record(&spec.name, &space.name).await?;
        let host = app_fqdn(&spec.name, &space.name, self.settings.domain(&space));
        let mut env = self.composer.compose(&spec.name, &space.name, &host).await?;
        let plan = self.plan(&record.plan).await?;
        let features = self.store.features(&spec.name, &space.name).await?;
        let feature = |name: &str| features.get(name).copied().unwrap_or(false);

        if spec.one_off {
            let workload = Workload {
                name: spec.name.clone(),
                space: space.name.clone(),
                image,
                command: command_args(spec.command.as_deref()),
                env: env.into_vars(),
                labels: spec.labels.clone(),
                instances: 1,
                port: None,
                health_check: HealthCheck::Tcp,
                memory: plan.memory.clone(),
                sidecar: false,
            };
            ignore_not_found(cluster.delete_pod(&space.name, &spec.name).await)?;
            cluster.create_pod(&workload).await?;
            self.metrics.applied("pod", ApplyOutcome::Created);
            info!("Started one-off pod");
            return Ok(DeployOutcome {
                service: ApplyOutcome::NotRequired,
                deployment: ApplyOutcome::Created,
            });
        }

        let http2 = spec.features.http2 || feature(HTTP2_FEATURE);
        let sidecar =
            spec.features.service_mesh || feature(SERVICE_MESH_FEATURE) || !spec.filters.is_empty();
        let labels = derived_labels(spec.labels.clone(), &plan, &space, http2);

        let port = resolve_port(spec.port, &env, record.port, self.settings.default_port);
        let port = if port < 0 {
            env.remove(PORT);
            None
        } else {
            env.set(PORT, port.to_string());
            let port = u16::try_from(port)
                .map_err(|_| Error::invalid(format!("invalid port: {port}")))?;
            Some(port)
        };

        let workload = Workload {
            name: spec.name.clone(),
            space: space.name.clone(),
            image: image.clone(),
            command: command_args(spec.command.as_deref()),
            env: env.into_vars(),
            labels: labels.clone(),
            instances: record.instances,
            port,
            health_check: record.healthcheck.clone(),
            memory: plan.memory.clone(),
            sidecar,
        };

        let deployment = if cluster.deployment(&space.name, &spec.name).await?.is_some() {
            cluster.update_deployment(&workload).await?;
            ApplyOutcome::Updated
        } else {
            cluster.create_deployment(&workload).await?;
            ApplyOutcome::Created
        };
        self.metrics.applied("deployment", deployment);

        let service = match port {
            Some(port) => {
                let svc = ServiceSpec {
                    name: spec.name.clone(),
                    space: space.name.clone(),
                    port,
                    labels,
                    http2,
                };
                if cluster.service_exists(&space.name, &spec.name).await? {
                    cluster.update_service(&svc).await?;
                    ApplyOutcome::Updated
                } else {
                    cluster.create_service(&svc).await?;
                    ApplyOutcome::Created
                }
            }
            None => ApplyOutcome::NotRequired,
        };
        self.metrics.applied("service", service);

        record.image = Some(image.to_string());
        if let Err(error) = self.store.update_deployment(&record).await {
            warn!(%error, "Failed to record the applied image");
        }

        self.reconcile_filters(&spec.name, &space, &spec.filters).await;

        info!(%deployment, %service, "Deployed");
        Ok(DeployOutcome {
            service,
            deployment,
        })
    }

    /// Removes a deployment from its cluster and from the store.
    ///
    /// The service and deployment must be gone before the record is removed. Replica sets and
    /// pods left behind are cleaned up on a best-effort basis.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        self.deployment_record(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;

        ignore_not_found(cluster.delete_service(space, name).await)?;
        ignore_not_found(cluster.delete_deployment(space, name).await)?;
        self.clean_up(&*cluster, space, name).await;

        self.store.delete_deployment(name, space).await?;
        self.store.delete_bindings(name, space).await?;
        info!("Deleted deployment");
        Ok(())
    }

    /// Deletes every deployment recorded under an app id.
    pub async fn delete_app(&self, app_id: Uuid) -> Result<Vec<String>> {
        let deployments = self.store.deployments_by_app_id(app_id).await?;
        if deployments.is_empty() {
            return Err(Error::not_found(format!("app {app_id} has no deployments")));
        }

        let mut succeeded = Vec::with_capacity(deployments.len());
        let mut failures = Vec::new();
        for d in deployments {
            let id = format!("{}-{}", d.name, d.space);
            match self.delete(&d.name, &d.space).await {
                Ok(()) => succeeded.push(id),
                Err(error) => {
                    warn!(%error, deployment = %id, "Failed to delete deployment");
                    failures.push(Failure {
                        name: id,
                        error: error.to_string(),
                    });
                }
            }
        }
        if failures.is_empty() {
            Ok(succeeded)
        } else {
            Err(Error::PartialFailure {
                succeeded,
                failures,
            })
        }
    }

    #[instrument(skip(self))]
    pub async fn rollback(&self, name: &str, space: &str, revision: i64) -> Result<()> {
        if revision <= 0 {
            return Err(Error::invalid("revision must be a positive integer"));
        }
        let _guard = self.locks.lock(space, name).await;
        self.deployment_record(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;

        let history = cluster.replica_sets(space, name).await?;
        if !history.iter().any(|rs| rs.revision == revision) {
            return Err(Error::not_found(format!(
                "revision {revision} of {name} does not exist"
            )));
        }
        cluster.rollback_deployment(space, name, revision).await?;
        info!("Rolled back deployment");
        Ok(())
    }

    /// Forces a new rollout. A deployment that is not on the cluster is left alone.
    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        let cluster = self.registry.cluster_for_space(space).await?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        match cluster.restart_deployment(space, name, &stamp).await {
            Ok(()) => info!(%stamp, "Restarted deployment"),
            Err(ClusterError::NotFound(_)) => debug!("Deployment is not on the cluster"),
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }

    pub async fn describe(&self, name: &str, space: &str) -> Result<DeploymentStatus> {
        let mut record = self.deployment_record(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        let live = cluster.deployment(space, name).await?.unwrap_or_default();
        if live.image.is_some() {
            record.image = live.image;
        }
        Ok(DeploymentStatus {
            record,
            replicas: live.replicas,
            ready_replicas: live.ready_replicas,
            revision: live.revision,
        })
    }

    /// Lists a space's deployments with the images the cluster is running.
    pub async fn list(&self, space: &str) -> Result<Vec<Deployment>> {
        let mut records = self.store.deployments(space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        let images = cluster
            .deployments(space)
            .await?
            .into_iter()
            .filter_map(|d| Some((d.name, d.image?)))
            .collect::<BTreeMap<_, _>>();
        for record in &mut records {
            if let Some(image) = images.get(&record.name) {
                record.image = Some(image.clone());
            }
        }
        Ok(records)
    }

    pub async fn set_maintenance(&self, name: &str, space: &str, enabled: bool) -> Result<()> {
        self.deployment_record(name, space).await?;
        let space = self.space(space).await?;
        self.ingresses
            .for_space(&space)
            .set_maintenance_page(name, &space.name, enabled)
            .await?;
        info!(app = %name, space = %space.name, enabled, "Set maintenance page");
        Ok(())
    }

    pub(crate) async fn plan(&self, name: &str) -> Result<Plan> {
        self.store
            .plan(name)
            .await?
            .ok_or_else(|| Error::invalid(format!("plan {name} does not exist")))
    }

    /// Deletes replica sets and pods owned by the app. Failures are logged and skipped.
    async fn clean_up(&self, cluster: &dyn Cluster, space: &str, app: &str) {
        match cluster.replica_sets(space, app).await {
            Ok(sets) => {
                for rs in sets {
                    let res = cluster.delete_replica_set(space, &rs.name).await;
                    if let Err(error) = ignore_not_found(res) {
                        self.metrics.cleanup_failed();
                        warn!(%error, replica_set = %rs.name, "Failed to delete replica set");
                    }
                }
            }
            Err(error) => warn!(%error, "Failed to list replica sets"),
        }
        self.delete_pods(cluster, space, app).await;
    }

    pub(crate) async fn delete_pods(&self, cluster: &dyn Cluster, space: &str, app: &str) {
        match cluster.pods(space, Some(app)).await {
            Ok(pods) => {
                for pod in pods {
                    let res = cluster.delete_pod(space, &pod.name).await;
                    if let Err(error) = ignore_not_found(res) {
                        self.metrics.cleanup_failed();
                        warn!(%error, pod = %pod.name, "Failed to delete pod");
                    }
                }
            }
            Err(error) => warn!(%error, "Failed to list pods"),
        }
    }
}

/// Caller labels with the derived labels laid over them.
fn derived_labels(
    mut labels: BTreeMap<String, String>,
    plan: &Plan,
    space: &Space,
    http2: bool,
) -> BTreeMap<String, String> {
    labels.insert(PLAN_LABEL.to_string(), plan.name.clone());
    labels.insert(PLAN_TYPE_LABEL.to_string(), plan.plan_type.clone());
    labels.insert(INTERNAL_LABEL.to_string(), space.internal.to_string());
    labels.insert(HTTP2_LABEL.to_string(), http2.to_string());
    labels
}

