use crate::Engine;
use region_controller_core::{
    cluster::{ignore_not_found, LiveCronJob, LiveJob},
    deployment::{ApplyOutcome, HealthCheck, Workload},
    ingress::app_fqdn,
    job::{command_args, CronJob, CronWorkload, Job, JobDeploy, JobScale, JobWorkload},
    Error, Result,
};
use serde::Serialize;
use tracing::{info, instrument};

/// A cron job definition with what the cluster reports for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CronJobStatus {
    #[serde(flatten)]
    pub record: CronJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveCronJob>,
}

// === impl Engine ===

impl Engine {
    pub async fn create_job(&self, job: Job) -> Result<Job> {
        job.validate()?;
        self.space(&job.space).await?;
        self.plan(&job.plan).await?;
        if self.store.job(&job.name, &job.space).await?.is_some() {
            return Err(Error::conflict(format!(
                "job {} already exists in {}",
                job.name, job.space
            )));
        }
        self.store.put_job(&job).await?;
        info!(space = %job.space, name = %job.name, "Created job");
        Ok(job)
    }

    pub async fn update_job(&self, job: Job) -> Result<Job> {
        job.validate()?;
        self.job(&job.name, &job.space).await?;
        self.plan(&job.plan).await?;
        self.store.put_job(&job).await?;
        Ok(job)
    }

    pub async fn job(&self, name: &str, space: &str) -> Result<Job> {
        self.store
            .job(name, space)
            .await?
            .ok_or_else(|| Error::not_found(format!("job {name} does not exist in {space}")))
    }

    pub async fn jobs(&self, space: &str) -> Result<Vec<Job>> {
        self.store.jobs(space).await
    }

    pub async fn job_status(&self, name: &str, space: &str) -> Result<LiveJob> {
        let cluster = self.registry.cluster_for_space(space).await?;
        cluster
            .job(space, name)
            .await?
            .ok_or_else(|| Error::not_found(format!("job {name} is not running in {space}")))
    }

    /// Runs a job's image. An existing run is replaced only when the request asks for it.
    #[instrument(skip(self, req), fields(image = %req.image))]
    pub async fn run_job(&self, name: &str, space: &str, req: JobDeploy) -> Result<()> {
        let image = req.validate()?;
        let _guard = self.locks.lock(space, name).await;

        let job = self.job(name, space).await?;
        let space_row = self.space(space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        let host = app_fqdn(name, space, self.settings.domain(&space_row));
        let env = self.composer.compose(name, space, &host).await?;
        let plan = self.plan(&job.plan).await?;

        if cluster.job(space, name).await?.is_some() {
            if !req.delete_before_create {
                return Err(Error::conflict(format!("job {name} is already running")));
            }
            ignore_not_found(cluster.delete_job(space, name).await)?;
            self.delete_pods(&*cluster, space, name).await;
        }

        let workload = JobWorkload {
            workload: Workload {
                name: name.to_string(),
                space: space.to_string(),
                image,
                command: command_args(job.command.as_deref()),
                env: env.into_vars(),
                labels: req.labels,
                instances: 1,
                port: None,
                health_check: HealthCheck::Tcp,
                memory: plan.memory,
                sidecar: false,
            },
            parallelism: req.parallelism,
            active_deadline_seconds: req.active_deadline_seconds,
        };
        cluster.create_job(&workload).await?;
        self.metrics.applied("job", ApplyOutcome::Created);
        info!("Started job");
        Ok(())
    }

    pub async fn scale_job(&self, name: &str, space: &str, scale: JobScale) -> Result<()> {
        scale.validate()?;
        let _guard = self.locks.lock(space, name).await;
        self.job(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        cluster
            .scale_job(
                space,
                name,
                scale.parallelism,
                scale.active_deadline_seconds,
            )
            .await?;
        info!(%space, %name, parallelism = scale.parallelism, "Scaled job");
        Ok(())
    }

    /// Removes the running job and keeps its definition.
    pub async fn stop_job(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        self.job(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        ignore_not_found(cluster.delete_job(space, name).await)?;
        Ok(())
    }

    /// Removes the running job and every pod it left behind.
    pub async fn clean_job(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        let cluster = self.registry.cluster_for_space(space).await?;
        ignore_not_found(cluster.delete_job(space, name).await)?;
        self.delete_pods(&*cluster, space, name).await;
        Ok(())
    }

    pub async fn delete_job(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        self.job(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        ignore_not_found(cluster.delete_job(space, name).await)?;
        self.delete_pods(&*cluster, space, name).await;
        self.store.delete_job(name, space).await?;
        info!(%space, %name, "Deleted job");
        Ok(())
    }

    pub async fn create_cron_job(&self, cron: CronJob) -> Result<CronJob> {
        cron.validate()?;
        self.space(&cron.space).await?;
        self.plan(&cron.plan).await?;
        if self.store.cron_job(&cron.name, &cron.space).await?.is_some() {
            return Err(Error::conflict(format!(
                "cron job {} already exists in {}",
                cron.name, cron.space
            )));
        }
        self.store.put_cron_job(&cron).await?;
        info!(space = %cron.space, name = %cron.name, schedule = %cron.schedule, "Created cron job");
        Ok(cron)
    }

    pub async fn update_cron_job(&self, cron: CronJob) -> Result<CronJob> {
        cron.validate()?;
        self.cron_job(&cron.name, &cron.space).await?;
        self.plan(&cron.plan).await?;
        self.store.put_cron_job(&cron).await?;
        Ok(cron)
    }

    pub async fn cron_job(&self, name: &str, space: &str) -> Result<CronJob> {
        self.store
            .cron_job(name, space)
            .await?
            .ok_or_else(|| Error::not_found(format!("cron job {name} does not exist in {space}")))
    }

    /// Lists a space's cron jobs with their last scheduled run.
    pub async fn cron_jobs(&self, space: &str) -> Result<Vec<CronJobStatus>> {
        let records = self.store.cron_jobs(space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            let live = cluster.cron_job(space, &record.name).await?;
            statuses.push(CronJobStatus { record, live });
        }
        Ok(statuses)
    }

    /// Applies a cron job's definition to the cluster.
    ///
    /// Cron jobs receive only the variables of the app's primary config set.
    #[instrument(skip(self, req), fields(image = %req.image))]
    pub async fn deploy_cron_job(
        &self,
        name: &str,
        space: &str,
        req: JobDeploy,
    ) -> Result<ApplyOutcome> {
        let image = req.validate()?;
        let _guard = self.locks.lock(space, name).await;

        let cron = self.cron_job(name, space).await?;
        let schedule = cron.validate()?;
        let cluster = self.registry.cluster_for_space(space).await?;
        let env = self.composer.compose_user(name, space).await?;
        let plan = self.plan(&cron.plan).await?;

        let workload = CronWorkload {
            workload: Workload {
                name: name.to_string(),
                space: space.to_string(),
                image,
                command: command_args(cron.command.as_deref()),
                env: env.into_vars(),
                labels: req.labels,
                instances: 1,
                port: None,
                health_check: HealthCheck::Tcp,
                memory: plan.memory,
                sidecar: false,
            },
            schedule,
        };
        let outcome = if cluster.cron_job(space, name).await?.is_some() {
            cluster.update_cron_job(&workload).await?;
            ApplyOutcome::Updated
        } else {
            cluster.create_cron_job(&workload).await?;
            ApplyOutcome::Created
        };
        self.metrics.applied("cronjob", outcome);
        info!(%outcome, "Deployed cron job");
        Ok(outcome)
    }

    /// Removes the cron job from the cluster, which stops future runs. The definition stays.
    pub async fn stop_cron_job(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        self.cron_job(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        ignore_not_found(cluster.delete_cron_job(space, name).await)?;
        Ok(())
    }

    pub async fn delete_cron_job(&self, name: &str, space: &str) -> Result<()> {
        let _guard = self.locks.lock(space, name).await;
        self.cron_job(name, space).await?;
        let cluster = self.registry.cluster_for_space(space).await?;
        ignore_not_found(cluster.delete_cron_job(space, name).await)?;
        self.store.delete_cron_job(name, space).await?;
        info!(%space, %name, "Deleted cron job");
        Ok(())
    }
}
