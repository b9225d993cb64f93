use region_controller_core::{store::ClusterRecord, Cluster, Error, Result, SecretStore};
use region_controller_k8s_api::{Gateway, KubeCluster, Shaper};
use region_controller_reconcile::ClusterFactory;
use std::sync::Arc;

/// Connects registered clusters with credentials from the secret store.
pub struct KubeFactory {
    secrets: Arc<dyn SecretStore>,
    shaper: Shaper,
    concurrency: usize,
}

// === impl KubeFactory ===

impl KubeFactory {
    pub fn new(secrets: Arc<dyn SecretStore>, shaper: Shaper, concurrency: usize) -> Self {
        Self {
            secrets,
            shaper,
            concurrency,
        }
    }

    pub async fn gateway(&self, record: &ClusterRecord) -> Result<Gateway> {
        Gateway::connect(record, &*self.secrets, self.concurrency)
            .await
            .map_err(|error| Error::upstream(error.to_string()))
    }
}

#[async_trait::async_trait]
impl ClusterFactory for KubeFactory {
    async fn connect(&self, record: &ClusterRecord) -> Result<Arc<dyn Cluster>> {
        let gateway = self.gateway(record).await?;
        Ok(Arc::new(KubeCluster::new(gateway, self.shaper.clone())))
    }
}
