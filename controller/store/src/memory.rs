use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use region_controller_core::{
    config::{Binding, ConfigSet, ConfigVar},
    deployment::Deployment,
    job::{CronJob, Job},
    space::Space,
    store::{ClusterRecord, Plan, Route},
    Error, Result, Store,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A store held entirely in process memory.
///
/// Every operation takes a single lock, so compound updates are atomic.
#[derive(Debug, Default)]
pub struct MemStore {
    state: RwLock<State>,
}

type Key = (String, String);

#[derive(Debug, Default)]
struct State {
    spaces: HashMap<String, Space>,
    deployments: HashMap<Key, Deployment>,
    bindings: Vec<Binding>,
    sets: HashMap<String, ConfigSet>,
    vars: HashMap<String, Vec<ConfigVar>>,
    includes: Vec<(String, String)>,
    plans: HashMap<String, Plan>,
    features: HashMap<Key, BTreeMap<String, bool>>,
    routes: HashMap<Key, Vec<Route>>,
    jobs: HashMap<Key, Job>,
    cron_jobs: HashMap<Key, CronJob>,
    clusters: Vec<ClusterRecord>,
}

fn key(name: &str, space: &str) -> Key {
    (space.to_string(), name.to_string())
}

fn sorted<T: Clone>(items: impl Iterator<Item = T>, by: impl Fn(&T) -> String) -> Vec<T> {
    let mut items = items.collect::<Vec<_>>();
    items.sort_by_key(by);
    items
}

// === impl MemStore ===

impl MemStore {
    pub fn insert_plan(&self, plan: Plan) {
        self.state.write().plans.insert(plan.name.clone(), plan);
    }

    pub fn insert_route(&self, app: &str, space: &str, route: Route) {
        self.state
            .write()
            .routes
            .entry(key(app, space))
            .or_default()
            .push(route);
    }

    pub fn set_feature(&self, app: &str, space: &str, feature: &str, enabled: bool) {
        self.state
            .write()
            .features
            .entry(key(app, space))
            .or_default()
            .insert(feature.to_string(), enabled);
    }

    pub fn insert_cluster(&self, cluster: ClusterRecord) {
        let mut state = self.state.write();
        state.clusters.retain(|c| c.name != cluster.name);
        state.clusters.push(cluster);
    }
}

impl State {
    fn upsert_var(&mut self, var: &ConfigVar) {
        let vars = self.vars.entry(var.set.clone()).or_default();
        match vars.iter_mut().find(|v| v.name == var.name) {
            Some(existing) => existing.value = var.value.clone(),
            None => vars.push(var.clone()),
        }
    }

    fn add_binding(&mut self, binding: &Binding) {
        if !self.bindings.contains(binding) {
            self.bindings.push(binding.clone());
        }
    }
}

#[async_trait::async_trait]
impl Store for MemStore {
    async fn space(&self, name: &str) -> Result<Option<Space>> {
        Ok(self.state.read().spaces.get(name).cloned())
    }

    async fn spaces(&self) -> Result<Vec<Space>> {
        let state = self.state.read();
        Ok(sorted(state.spaces.values().cloned(), |s| s.name.clone()))
    }

    async fn create_space(&self, space: &Space) -> Result<()> {
        let mut state = self.state.write();
        if state.spaces.contains_key(&space.name) {
            return Err(Error::conflict(format!(
                "space {} already exists",
                space.name
            )));
        }
        state.spaces.insert(space.name.clone(), space.clone());
        Ok(())
    }

    async fn delete_space(&self, name: &str) -> Result<()> {
        self.state.write().spaces.remove(name);
        Ok(())
    }

    async fn deployment(&self, name: &str, space: &str) -> Result<Option<Deployment>> {
        Ok(self.state.read().deployments.get(&key(name, space)).cloned())
    }

    async fn deployments(&self, space: &str) -> Result<Vec<Deployment>> {
        let state = self.state.read();
        let items = state
            .deployments
            .values()
            .filter(|d| d.space == space)
            .cloned();
        Ok(sorted(items, |d| d.name.clone()))
    }

    async fn deployments_by_app_id(&self, app_id: Uuid) -> Result<Vec<Deployment>> {
        let state = self.state.read();
        let items = state
            .deployments
            .values()
            .filter(|d| d.app_id == Some(app_id))
            .cloned();
        Ok(sorted(items, |d| format!("{}/{}", d.space, d.name)))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut state = self.state.write();
        let k = key(&deployment.name, &deployment.space);
        if state.deployments.contains_key(&k) {
            return Err(Error::conflict(format!(
                "deployment {} already exists in {}",
                deployment.name, deployment.space
            )));
        }
        state.deployments.insert(k, deployment.clone());
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut state = self.state.write();
        match state
            .deployments
            .get_mut(&key(&deployment.name, &deployment.space))
        {
            Some(d) => {
                *d = deployment.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "deployment {} does not exist in {}",
                deployment.name, deployment.space
            ))),
        }
    }

    async fn delete_deployment(&self, name: &str, space: &str) -> Result<()> {
        self.state.write().deployments.remove(&key(name, space));
        Ok(())
    }

    async fn bindings(&self, app: &str, space: &str) -> Result<Vec<Binding>> {
        let state = self.state.read();
        Ok(state
            .bindings
            .iter()
            .filter(|b| b.app == app && b.space == space)
            .cloned()
            .collect())
    }

    async fn bindings_to(&self, bind_type: &str, bind_name: &str) -> Result<Vec<Binding>> {
        let state = self.state.read();
        Ok(state
            .bindings
            .iter()
            .filter(|b| b.bind_type == bind_type && b.bind_name == bind_name)
            .cloned()
            .collect())
    }

    async fn add_binding(&self, binding: &Binding) -> Result<()> {
        self.state.write().add_binding(binding);
        Ok(())
    }

    async fn delete_binding(&self, binding: &Binding) -> Result<()> {
        self.state.write().bindings.retain(|b| b != binding);
        Ok(())
    }

    async fn delete_bindings(&self, app: &str, space: &str) -> Result<()> {
        self.state
            .write()
            .bindings
            .retain(|b| !(b.app == app && b.space == space));
        Ok(())
    }

    async fn config_set(&self, name: &str) -> Result<Option<ConfigSet>> {
        Ok(self.state.read().sets.get(name).cloned())
    }

    async fn config_sets(&self) -> Result<Vec<ConfigSet>> {
        let state = self.state.read();
        Ok(sorted(state.sets.values().cloned(), |s| s.name.clone()))
    }

    async fn create_config_set(&self, set: &ConfigSet) -> Result<()> {
        let mut state = self.state.write();
        if state.sets.contains_key(&set.name) {
            return Err(Error::conflict(format!(
                "config set {} already exists",
                set.name
            )));
        }
        state.sets.insert(set.name.clone(), set.clone());
        Ok(())
    }

    async fn delete_config_set(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        state.sets.remove(name);
        state.vars.remove(name);
        state.includes.retain(|(p, c)| p != name && c != name);
        Ok(())
    }

    async fn config_vars(&self, set: &str) -> Result<Vec<ConfigVar>> {
        Ok(self
            .state
            .read()
            .vars
            .get(set)
            .cloned()
            .unwrap_or_default())
    }

    async fn included_config_vars(&self, set: &str) -> Result<Vec<ConfigVar>> {
        let state = self.state.read();
        Ok(state
            .includes
            .iter()
            .filter(|(parent, _)| parent == set)
            .flat_map(|(_, child)| state.vars.get(child).into_iter().flatten())
            .cloned()
            .collect())
    }

    async fn includes(&self, set: &str) -> Result<Vec<String>> {
        let state = self.state.read();
        Ok(state
            .includes
            .iter()
            .filter(|(parent, _)| parent == set)
            .map(|(_, child)| child.clone())
            .collect())
    }

    async fn add_include(&self, parent: &str, child: &str) -> Result<()> {
        let mut state = self.state.write();
        for set in [parent, child] {
            if !state.sets.contains_key(set) {
                return Err(Error::not_found(format!("config set {set} does not exist")));
            }
        }
        let include = (parent.to_string(), child.to_string());
        if !state.includes.contains(&include) {
            state.includes.push(include);
        }
        Ok(())
    }

    async fn delete_include(&self, parent: &str, child: &str) -> Result<()> {
        self.state
            .write()
            .includes
            .retain(|(p, c)| !(p == parent && c == child));
        Ok(())
    }

    async fn upsert_config_var(&self, var: &ConfigVar) -> Result<()> {
        let mut state = self.state.write();
        if !state.sets.contains_key(&var.set) {
            return Err(Error::not_found(format!(
                "config set {} does not exist",
                var.set
            )));
        }
        state.upsert_var(var);
        Ok(())
    }

    async fn delete_config_var(&self, set: &str, name: &str) -> Result<()> {
        if let Some(vars) = self.state.write().vars.get_mut(set) {
            vars.retain(|v| v.name != name);
        }
        Ok(())
    }

    async fn add_config_vars(
        &self,
        set: &ConfigSet,
        binding: &Binding,
        vars: &[ConfigVar],
    ) -> Result<()> {
        let mut state = self.state.write();
        state
            .sets
            .entry(set.name.clone())
            .or_insert_with(|| set.clone());
        state.add_binding(binding);
        for var in vars {
            state.upsert_var(var);
        }
        Ok(())
    }

    async fn plan(&self, name: &str) -> Result<Option<Plan>> {
        Ok(self.state.read().plans.get(name).cloned())
    }

    async fn features(&self, app: &str, space: &str) -> Result<BTreeMap<String, bool>> {
        Ok(self
            .state
            .read()
            .features
            .get(&key(app, space))
            .cloned()
            .unwrap_or_default())
    }

    async fn routes(&self, app: &str, space: &str) -> Result<Vec<Route>> {
        Ok(self
            .state
            .read()
            .routes
            .get(&key(app, space))
            .cloned()
            .unwrap_or_default())
    }

    async fn job(&self, name: &str, space: &str) -> Result<Option<Job>> {
        Ok(self.state.read().jobs.get(&key(name, space)).cloned())
    }

    async fn jobs(&self, space: &str) -> Result<Vec<Job>> {
        let state = self.state.read();
        let items = state.jobs.values().filter(|j| j.space == space).cloned();
        Ok(sorted(items, |j| j.name.clone()))
    }

    async fn put_job(&self, job: &Job) -> Result<()> {
        self.state
            .write()
            .jobs
            .insert(key(&job.name, &job.space), job.clone());
        Ok(())
    }

    async fn delete_job(&self, name: &str, space: &str) -> Result<()> {
        self.state.write().jobs.remove(&key(name, space));
        Ok(())
    }

    async fn cron_job(&self, name: &str, space: &str) -> Result<Option<CronJob>> {
        Ok(self.state.read().cron_jobs.get(&key(name, space)).cloned())
    }

    async fn cron_jobs(&self, space: &str) -> Result<Vec<CronJob>> {
        let state = self.state.read();
        let items = state
            .cron_jobs
            .values()
            .filter(|j| j.space == space)
            .cloned();
        Ok(sorted(items, |j| j.name.clone()))
    }

    async fn put_cron_job(&self, cron: &CronJob) -> Result<()> {
        self.state
            .write()
            .cron_jobs
            .insert(key(&cron.name, &cron.space), cron.clone());
        Ok(())
    }

    async fn delete_cron_job(&self, name: &str, space: &str) -> Result<()> {
        self.state.write().cron_jobs.remove(&key(name, space));
        Ok(())
    }

    async fn clusters(&self) -> Result<Vec<ClusterRecord>> {
        Ok(self.state.read().clusters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn deployments_are_unique_per_space() {
        let store = MemStore::default();
        let mut d = Deployment::new("gotest", "gotest");
        d.plan = "scout".into();
        store.create_deployment(&d).await.unwrap();
        assert!(matches!(
            store.create_deployment(&d).await,
            Err(Error::Conflict(_))
        ));

        store
            .create_deployment(&Deployment::new("gotest", "other"))
            .await
            .unwrap();
        assert_eq!(store.deployments("gotest").await.unwrap(), vec![d]);
    }

    #[tokio::test]
    async fn update_requires_an_existing_row() {
        let store = MemStore::default();
        let err = store
            .update_deployment(&Deployment::new("web", "prod"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn includes_resolve_one_level() {
        let store = MemStore::default();
        for name in ["parentset", "childset", "grandchild"] {
            store
                .create_config_set(&ConfigSet::new(name, "app"))
                .await
                .unwrap();
        }
        store
            .upsert_config_var(&ConfigVar::new("childset", "CHILD", "1"))
            .await
            .unwrap();
        store
            .upsert_config_var(&ConfigVar::new("grandchild", "GRANDCHILD", "1"))
            .await
            .unwrap();
        store.add_include("parentset", "childset").await.unwrap();
        store.add_include("childset", "grandchild").await.unwrap();

        assert_eq!(
            store.included_config_vars("parentset").await.unwrap(),
            vec![ConfigVar::new("childset", "CHILD", "1")]
        );

        store.delete_include("parentset", "childset").await.unwrap();
        assert!(store
            .included_config_vars("parentset")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let store = MemStore::default();
        store
            .create_config_set(&ConfigSet::new("web-prod", "app"))
            .await
            .unwrap();
        for (name, value) in [("A", "1"), ("B", "2"), ("A", "3")] {
            store
                .upsert_config_var(&ConfigVar::new("web-prod", name, value))
                .await
                .unwrap();
        }
        assert_eq!(
            store.config_vars("web-prod").await.unwrap(),
            vec![
                ConfigVar::new("web-prod", "A", "3"),
                ConfigVar::new("web-prod", "B", "2"),
            ]
        );
    }

    #[tokio::test]
    async fn batch_add_creates_set_and_binding() {
        let store = MemStore::default();
        let set = ConfigSet::for_app("web", "prod");
        let binding = Binding::new("web", "prod", Binding::CONFIG, &set.name);
        let vars = [ConfigVar::new(&set.name, "A", "1")];
        store.add_config_vars(&set, &binding, &vars).await.unwrap();
        store.add_config_vars(&set, &binding, &vars).await.unwrap();

        assert_eq!(store.config_set("web-prod").await.unwrap(), Some(set));
        assert_eq!(store.bindings("web", "prod").await.unwrap(), vec![binding]);
        assert_eq!(store.config_vars("web-prod").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_set_leaves_bindings() {
        let store = MemStore::default();
        let set = ConfigSet::new("shared", "shared");
        store.create_config_set(&set).await.unwrap();
        let binding = Binding::new("web", "prod", Binding::CONFIG, "shared");
        store.add_binding(&binding).await.unwrap();
        store.delete_config_set("shared").await.unwrap();

        assert_eq!(store.config_set("shared").await.unwrap(), None);
        assert_eq!(
            store.bindings_to(Binding::CONFIG, "shared").await.unwrap(),
            vec![binding]
        );
    }
}
