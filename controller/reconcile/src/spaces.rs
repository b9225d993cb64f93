use crate::Engine;
use region_controller_core::{space::Space, ClusterError, Error, Result};
use tracing::{info, instrument};

// === impl Engine ===

impl Engine {
    pub async fn space(&self, name: &str) -> Result<Space> {
        self.store
            .space(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("space {name} does not exist")))
    }

    pub async fn spaces(&self) -> Result<Vec<Space>> {
        self.store.spaces().await
    }

    /// Creates the space's namespace on its cluster, then records the space. A namespace that
    /// already exists is adopted, so a failed attempt can be retried.
    #[instrument(skip(self, space), fields(space = %space.name, cluster = %space.cluster))]
    pub async fn create_space(&self, space: Space) -> Result<Space> {
        space.validate()?;
        if space.cluster.is_empty() {
            return Err(Error::invalid("stack is required"));
        }
        if self.store.space(&space.name).await?.is_some() {
            return Err(Error::conflict(format!("space {} already exists", space.name)));
        }
        let cluster = self.registry.cluster(&space.cluster).await?;

        match cluster.create_namespace(&space).await {
            Ok(()) | Err(ClusterError::Conflict(_)) => {}
            Err(error) => return Err(error.into()),
        }
        self.store.create_space(&space).await?;
        info!("Created space");
        Ok(space)
    }

    /// Removes an empty space. Any workload left in it, recorded or running, is a conflict.
    #[instrument(skip(self))]
    pub async fn delete_space(&self, name: &str) -> Result<()> {
        self.space(name).await?;
        let deployments = self.store.deployments(name).await?;
        if !deployments.is_empty() {
            return Err(Error::conflict(format!(
                "space {name} still has {} deployments",
                deployments.len()
            )));
        }
        let jobs = self.store.jobs(name).await?;
        if !jobs.is_empty() {
            return Err(Error::conflict(format!(
                "space {name} still has {} jobs",
                jobs.len()
            )));
        }
        let crons = self.store.cron_jobs(name).await?;
        if !crons.is_empty() {
            return Err(Error::conflict(format!(
                "space {name} still has {} cron jobs",
                crons.len()
            )));
        }
        let cluster = self.registry.cluster_for_space(name).await?;
        let pods = cluster.pods(name, None).await?;
        if !pods.is_empty() {
            return Err(Error::conflict(format!(
                "space {name} still has {} pods",
                pods.len()
            )));
        }

        match cluster.delete_namespace(name).await {
            Ok(()) | Err(ClusterError::NotFound(_)) => {}
            Err(error) => return Err(error.into()),
        }
        self.store.delete_space(name).await?;
        self.registry.forget_space(name);
        info!("Deleted space");
        Ok(())
    }
}
