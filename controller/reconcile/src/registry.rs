use crate::ReconcileMetrics;
use ahash::AHashMap;
use parking_lot::RwLock;
use region_controller_core::{store::ClusterRecord, Cluster, Error, Result, Store};
use std::sync::Arc;
use tracing::{debug, info};

/// Opens a connection to a registered cluster.
#[async_trait::async_trait]
pub trait ClusterFactory: Send + Sync {
    async fn connect(&self, record: &ClusterRecord) -> Result<Arc<dyn Cluster>>;
}

/// Resolves spaces to the cluster their workloads run on.
///
/// Both the space-to-cluster mapping and the connections are cached for the life of the
/// process. Concurrent misses may each connect; the first to insert wins and the others drop
/// their connection.
pub struct ClusterRegistry {
    store: Arc<dyn Store>,
    factory: Arc<dyn ClusterFactory>,
    spaces: RwLock<AHashMap<String, String>>,
    clusters: RwLock<AHashMap<String, Arc<dyn Cluster>>>,
    metrics: ReconcileMetrics,
}

// === impl ClusterRegistry ===

impl ClusterRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn ClusterFactory>,
        metrics: ReconcileMetrics,
    ) -> Self {
        Self {
            store,
            factory,
            spaces: Default::default(),
            clusters: Default::default(),
            metrics,
        }
    }

    pub async fn cluster_for_space(&self, space: &str) -> Result<Arc<dyn Cluster>> {
        let cached = self.spaces.read().get(space).cloned();
        let name = match cached {
            Some(name) => name,
            None => {
                let row = self
                    .store
                    .space(space)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("space {space} does not exist")))?;
                self.spaces
                    .write()
                    .entry(space.to_string())
                    .or_insert(row.cluster)
                    .clone()
            }
        };
        self.cluster(&name).await
    }

    pub async fn cluster(&self, name: &str) -> Result<Arc<dyn Cluster>> {
        let cached = self.clusters.read().get(name).cloned();
        if let Some(cluster) = cached {
            return Ok(cluster);
        }

        let record = self
            .store
            .clusters()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::upstream(format!("cluster {name} is not registered")))?;
        self.connect(record).await
    }

    pub async fn all_clusters(&self) -> Result<Vec<Arc<dyn Cluster>>> {
        let records = self.store.clusters().await?;
        let mut clusters = Vec::with_capacity(records.len());
        for record in records {
            let cached = self.clusters.read().get(&record.name).cloned();
            let cluster = match cached {
                Some(cluster) => cluster,
                None => self.connect(record).await?,
            };
            clusters.push(cluster);
        }
        Ok(clusters)
    }

    /// Drops a deleted space's mapping so a space recreated under the same name resolves again.
    pub(crate) fn forget_space(&self, space: &str) {
        self.spaces.write().remove(space);
    }

    async fn connect(&self, record: ClusterRecord) -> Result<Arc<dyn Cluster>> {
        debug!(cluster = %record.name, api_server = %record.api_server, "Connecting");
        let cluster = self.factory.connect(&record).await?;
        let mut clusters = self.clusters.write();
        let cluster = clusters
            .entry(record.name.clone())
            .or_insert_with(|| {
                info!(cluster = %record.name, "Registered cluster");
                cluster
            })
            .clone();
        self.metrics.set_clusters(clusters.len());
        Ok(cluster)
    }
}
