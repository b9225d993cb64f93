//! Region controller reconcilers
//!
//! The [`Engine`] owns every write the controller makes. A deploy flows through it in a fixed
//! order:
//!
//! ```text
//! validate -> resolve cluster -> compose env -> shape -> deployment -> service -> filters
//! ```
//!
//! Every lookup and validation happens before the first cluster write, so a rejected request
//! leaves the cluster untouched. Writes to the same (space, name) are serialized; writes to
//! different targets proceed concurrently, bounded only by each cluster gateway.
//!
//! The engine knows nothing about the orchestrator, the ingress controller, or the certificate
//! issuer. It reaches them through the capability traits in `region-controller-core`.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod certs;
mod compose;
mod config;
mod deploy;
mod filters;
mod jobs;
mod locks;
mod metrics;
mod registry;
mod spaces;

#[cfg(test)]
mod tests;

pub use self::{
    compose::{resolve_port, Composer, Environment},
    jobs::CronJobStatus,
    metrics::ReconcileMetrics,
    registry::{ClusterFactory, ClusterRegistry},
};
use self::locks::KeyedLocks;
use region_controller_core::{
    config::EnvVar, space::Space, Ingress, Issuer, ServiceCatalog, Store, DEFAULT_PORT,
};
use std::sync::Arc;

/// Region-wide settings every reconciler consults.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Appended to app host names in internal spaces.
    pub internal_domain: String,
    pub external_domain: String,
    pub default_port: i32,
    /// The issuer used when an order names none.
    pub default_issuer: String,
    /// Extra variables injected into every workload ahead of user configuration.
    pub platform_env: Vec<EnvVar>,
}

/// The ingress controllers fronting the region.
#[derive(Clone)]
pub struct Ingresses {
    pub private: Arc<dyn Ingress>,
    pub public: Arc<dyn Ingress>,
}

pub struct Engine {
    store: Arc<dyn Store>,
    registry: ClusterRegistry,
    composer: Composer,
    ingresses: Ingresses,
    issuers: Vec<Arc<dyn Issuer>>,
    settings: Settings,
    locks: KeyedLocks,
    metrics: ReconcileMetrics,
}

// === impl Settings ===

impl Default for Settings {
    fn default() -> Self {
        Self {
            internal_domain: String::new(),
            external_domain: String::new(),
            default_port: DEFAULT_PORT,
            default_issuer: "letsencrypt".to_string(),
            platform_env: Vec::new(),
        }
    }
}

impl Settings {
    pub fn domain(&self, space: &Space) -> &str {
        if space.internal {
            &self.internal_domain
        } else {
            &self.external_domain
        }
    }
}

// === impl Ingresses ===

impl Ingresses {
    pub fn for_space(&self, space: &Space) -> &Arc<dyn Ingress> {
        self.select(space.internal)
    }

    pub fn select(&self, internal: bool) -> &Arc<dyn Ingress> {
        if internal {
            &self.private
        } else {
            &self.public
        }
    }
}

// === impl Engine ===

impl Engine {
    pub fn new(
        settings: Settings,
        store: Arc<dyn Store>,
        clusters: Arc<dyn ClusterFactory>,
        services: Arc<dyn ServiceCatalog>,
        ingresses: Ingresses,
        issuers: Vec<Arc<dyn Issuer>>,
        metrics: ReconcileMetrics,
    ) -> Self {
        let registry = ClusterRegistry::new(store.clone(), clusters, metrics.clone());
        let composer = Composer::new(store.clone(), services, settings.platform_env.clone());
        Self {
            store,
            registry,
            composer,
            ingresses,
            issuers,
            settings,
            locks: KeyedLocks::default(),
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
