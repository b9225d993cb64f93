use ahash::{AHashMap, AHashSet};
use region_controller_core::{
    config::{BindKind, Binding, ConfigVar, EnvVar},
    Result, ServiceCatalog, Store,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PORT: &str = "PORT";

/// Assembles the environment handed to a workload.
///
/// Sources are layered in order, later ones replacing earlier values of the same name:
///
/// 1. platform variables;
/// 2. variables of sets the app's primary set includes;
/// 3. the primary set's own variables;
/// 4. variables contributed by service bindings, in binding order.
///
/// A variable set directly in the primary set is never replaced by a service variable.
#[derive(Clone)]
pub struct Composer {
    store: Arc<dyn Store>,
    services: Arc<dyn ServiceCatalog>,
    platform: Vec<EnvVar>,
}

/// An ordered environment. Replacing a variable keeps its original position.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: Vec<EnvVar>,
    index: AHashMap<String, usize>,
}

// === impl Composer ===

impl Composer {
    pub fn new(
        store: Arc<dyn Store>,
        services: Arc<dyn ServiceCatalog>,
        platform: Vec<EnvVar>,
    ) -> Self {
        Self {
            store,
            services,
            platform,
        }
    }

    /// The full environment for a deployment or job served at `host`.
    pub async fn compose(&self, app: &str, space: &str, host: &str) -> Result<Environment> {
        let mut env = Environment::default();
        for var in self.platform_vars(app, space, host) {
            env.set(var.name, var.value);
        }

        let bindings = self.store.bindings(app, space).await?;
        let pinned = self.layer_primary_set(&bindings, &mut env).await?;

        for binding in &bindings {
            if let BindKind::Service(kind) = binding.kind() {
                let vars = self.services.service_vars(binding).await?;
                debug!(%binding, %kind, vars = vars.len(), "Resolved service binding");
                for var in vars {
                    if pinned.contains(&var.name) {
                        continue;
                    }
                    env.set(var.name, var.value);
                }
            }
        }
        Ok(env)
    }

    /// Only the app's primary set, as cron jobs receive it.
    pub async fn compose_user(&self, app: &str, space: &str) -> Result<Environment> {
        let mut env = Environment::default();
        let bindings = self.store.bindings(app, space).await?;
        self.layer_primary_set(&bindings, &mut env).await?;
        Ok(env)
    }

    /// A set's variables with its includes expanded one level. Direct variables shadow
    /// included ones.
    pub async fn set_vars(&self, set: &str) -> Result<Vec<ConfigVar>> {
        let included = self.store.included_config_vars(set).await?;
        let direct = self.store.config_vars(set).await?;
        let direct_names = direct.iter().map(|v| v.name.as_str()).collect::<AHashSet<_>>();

        let mut vars = Vec::with_capacity(included.len() + direct.len());
        let mut seen = AHashSet::new();
        for var in included {
            if direct_names.contains(var.name.as_str()) || !seen.insert(var.name.clone()) {
                continue;
            }
            vars.push(var);
        }
        vars.extend(direct);
        Ok(vars)
    }

    fn platform_vars(&self, app: &str, space: &str, host: &str) -> Vec<EnvVar> {
        let mut vars = vec![
            EnvVar::new("APP_NAME", app),
            EnvVar::new("SPACE_NAME", space),
            EnvVar::new("APP_HOST", host),
        ];
        vars.extend(self.platform.iter().cloned());
        vars
    }

    /// Returns the names set directly in the primary set.
    async fn layer_primary_set(
        &self,
        bindings: &[Binding],
        env: &mut Environment,
    ) -> Result<AHashSet<String>> {
        let mut primary = bindings.iter().filter(|b| b.kind() == BindKind::Config);
        let Some(binding) = primary.next() else {
            return Ok(AHashSet::new());
        };
        if let Some(extra) = primary.next() {
            warn!(%binding, %extra, "Multiple config bindings; using the first");
        }
        let set = &binding.bind_name;
        if self.store.config_set(set).await?.is_none() {
            warn!(%binding, "Config binding refers to a missing set");
            return Ok(AHashSet::new());
        }

        for var in self.store.included_config_vars(set).await? {
            env.set(var.name, var.value);
        }
        let mut pinned = AHashSet::new();
        for var in self.store.config_vars(set).await? {
            pinned.insert(var.name.clone());
            env.set(var.name, var.value);
        }
        Ok(pinned)
    }
}

/// Picks the port a workload listens on.
///
/// The request wins, then a `PORT` variable from configuration, then the stored port, then the
/// region default. A configured or stored port of zero is treated as absent.
pub fn resolve_port(
    request: Option<i32>,
    env: &Environment,
    stored: Option<i32>,
    default: i32,
) -> i32 {
    request
        .or_else(|| {
            env.get(PORT)
                .and_then(|p| p.trim().parse().ok())
                .filter(|p| *p > 0)
        })
        .or(stored.filter(|p| *p != 0))
        .unwrap_or(default)
}

// === impl Environment ===

impl Environment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|i| self.vars[*i].value.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.index.get(&name) {
            Some(i) => self.vars[*i].value = value,
            None => {
                self.index.insert(name.clone(), self.vars.len());
                self.vars.push(EnvVar { name, value });
            }
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(i) = self.index.remove(name) {
            self.vars.remove(i);
            for idx in self.index.values_mut() {
                if *idx > i {
                    *idx -= 1;
                }
            }
        }
    }

    pub fn vars(&self) -> &[EnvVar] {
        &self.vars
    }

    pub fn into_vars(self) -> Vec<EnvVar> {
        self.vars
    }
}
