use crate::Engine;
use ahash::AHashSet;
use region_controller_core::{
    config::{BindKind, Binding, ConfigSet, ConfigVar, EnvVar},
    ingress::app_fqdn,
    Error, Result,
};
use tracing::{info, warn};

// === impl Engine ===

impl Engine {
    pub async fn create_config_set(&self, set: ConfigSet) -> Result<ConfigSet> {
        set.validate()?;
        self.store.create_config_set(&set).await?;
        info!(set = %set.name, "Created config set");
        Ok(set)
    }

    pub async fn config_sets(&self) -> Result<Vec<ConfigSet>> {
        self.store.config_sets().await
    }

    /// A set's variables, including those of the sets it includes.
    pub async fn config_set_vars(&self, name: &str) -> Result<Vec<ConfigVar>> {
        self.config_set(name).await?;
        self.composer.set_vars(name).await
    }

    /// Deletes a set along with its variables. Bindings to it are left in place.
    pub async fn delete_config_set(&self, name: &str) -> Result<()> {
        self.config_set(name).await?;
        for binding in self.store.bindings_to(Binding::CONFIG, name).await? {
            warn!(%binding, set = %name, "Deleting a set that is still bound");
        }
        self.store.delete_config_set(name).await?;
        info!(set = %name, "Deleted config set");
        Ok(())
    }

    pub async fn upsert_config_var(&self, var: ConfigVar) -> Result<ConfigVar> {
        var.validate()?;
        self.store.upsert_config_var(&var).await?;
        Ok(var)
    }

    /// Upserts each variable into its own set. Every set must exist before anything is written.
    pub async fn upsert_config_vars(&self, vars: Vec<ConfigVar>) -> Result<Vec<ConfigVar>> {
        let mut sets = AHashSet::new();
        for var in &vars {
            var.validate()?;
            if sets.insert(var.set.as_str()) {
                self.config_set(&var.set).await?;
            }
        }
        for var in &vars {
            self.store.upsert_config_var(var).await?;
        }
        Ok(vars)
    }

    pub async fn delete_config_var(&self, set: &str, name: &str) -> Result<()> {
        self.config_set(set).await?;
        self.store.delete_config_var(set, name).await
    }

    pub async fn includes(&self, set: &str) -> Result<Vec<String>> {
        self.config_set(set).await?;
        self.store.includes(set).await
    }

    pub async fn add_include(&self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(Error::invalid("a set cannot include itself"));
        }
        self.store.add_include(parent, child).await?;
        info!(%parent, %child, "Added include");
        Ok(())
    }

    pub async fn delete_include(&self, parent: &str, child: &str) -> Result<()> {
        self.store.delete_include(parent, child).await
    }

    /// Writes variables into the app's own set, creating the set and its config binding if
    /// needed. The whole update is applied atomically.
    pub async fn set_app_config_vars(
        &self,
        app: &str,
        space: &str,
        vars: Vec<EnvVar>,
    ) -> Result<Vec<ConfigVar>> {
        self.deployment_record(app, space).await?;
        let set = ConfigSet::for_app(app, space);
        let binding = Binding::new(app, space, Binding::CONFIG, set.name.clone());
        self.ensure_single_config_binding(&binding).await?;

        let vars = vars
            .into_iter()
            .map(|v| ConfigVar::new(set.name.clone(), v.name, v.value))
            .collect::<Vec<_>>();
        for var in &vars {
            var.validate()?;
        }
        self.store.add_config_vars(&set, &binding, &vars).await?;
        info!(%app, %space, vars = vars.len(), "Set app config vars");
        Ok(vars)
    }

    /// The environment the app would be deployed with, before port resolution.
    pub async fn app_config_vars(&self, app: &str, space: &str) -> Result<Vec<EnvVar>> {
        self.deployment_record(app, space).await?;
        let space = self.space(space).await?;
        let host = app_fqdn(app, &space.name, self.settings.domain(&space));
        let env = self.composer.compose(app, &space.name, &host).await?;
        Ok(env.into_vars())
    }

    pub async fn bindings(&self, app: &str, space: &str) -> Result<Vec<Binding>> {
        self.store.bindings(app, space).await
    }

    pub async fn add_binding(&self, binding: Binding) -> Result<Binding> {
        binding.validate()?;
        self.deployment_record(&binding.app, &binding.space).await?;
        self.ensure_single_config_binding(&binding).await?;
        self.store.add_binding(&binding).await?;
        info!(%binding, "Added binding");
        Ok(binding)
    }

    pub async fn delete_binding(&self, binding: Binding) -> Result<()> {
        binding.validate()?;
        self.store.delete_binding(&binding).await?;
        info!(%binding, "Deleted binding");
        Ok(())
    }

    async fn config_set(&self, name: &str) -> Result<ConfigSet> {
        self.store
            .config_set(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("config set {name} does not exist")))
    }

    /// A deployment has at most one config binding.
    async fn ensure_single_config_binding(&self, binding: &Binding) -> Result<()> {
        if binding.kind() != BindKind::Config {
            return Ok(());
        }
        let existing = self.store.bindings(&binding.app, &binding.space).await?;
        if let Some(other) = existing
            .iter()
            .find(|b| b.kind() == BindKind::Config && b.bind_name != binding.bind_name)
        {
            return Err(Error::conflict(format!(
                "{}-{} is already bound to config set {}",
                binding.app, binding.space, other.bind_name
            )));
        }
        Ok(())
    }
}
