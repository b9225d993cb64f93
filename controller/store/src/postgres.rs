use region_controller_core::{
    config::{Binding, ConfigSet, ConfigVar},
    deployment::{Deployment, Memory},
    job::{CronJob, Job},
    space::Space,
    store::{ClusterAuth, ClusterRecord, Plan, Route},
    Error, Result, Store,
};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    FromRow, PgPool,
};
use std::{collections::BTreeMap, str::FromStr, time::Duration};
use tracing::debug;
use uuid::Uuid;

/// Tables the store reads and writes. Applying it is idempotent.
pub const SCHEMA: &str = include_str!("../schema.sql");

/// A store backed by a Postgres connection pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct SpaceRow {
    name: String,
    internal: bool,
    compliance: String,
    stack: String,
}

#[derive(Debug, FromRow)]
struct DeploymentRow {
    appid: Option<Uuid>,
    name: String,
    space: String,
    instances: i32,
    plan: String,
    healthcheck: String,
    port: Option<i32>,
    image: Option<String>,
}

#[derive(Debug, FromRow)]
struct BindingRow {
    appname: String,
    space: String,
    bindtype: String,
    bindname: String,
}

#[derive(Debug, FromRow)]
struct SetRow {
    name: String,
    #[sqlx(rename = "type")]
    set_type: String,
}

#[derive(Debug, FromRow)]
struct VarRow {
    setname: String,
    varname: String,
    varvalue: String,
}

#[derive(Debug, FromRow)]
struct PlanRow {
    name: String,
    #[sqlx(rename = "type")]
    plan_type: String,
    memrequest: String,
    memlimit: String,
}

#[derive(Debug, FromRow)]
struct RouteRow {
    domain: String,
    path: String,
    internal: bool,
}

#[derive(Debug, FromRow)]
struct JobRow {
    name: String,
    space: String,
    cmd: Option<String>,
    plan: String,
}

#[derive(Debug, FromRow)]
struct CronJobRow {
    name: String,
    space: String,
    cmd: Option<String>,
    plan: String,
    schedule: String,
}

#[derive(Debug, FromRow)]
struct ClusterRow {
    name: String,
    apiserver: String,
    auth: String,
    secretpath: String,
}

const DEPLOYMENT_COLUMNS: &str =
    "appid, name, space, instances, plan, healthcheck, port, image FROM deployments";

// === impl PgStore ===

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn apply_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("Applied schema");
        Ok(())
    }

    async fn deployments_where(&self, filter: &str, arg: &str) -> Result<Vec<Deployment>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} WHERE {filter} ORDER BY space, name"
        ))
        .bind(arg)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(Deployment::try_from).collect()
    }
}

fn db(error: sqlx::Error) -> Error {
    if let sqlx::Error::Database(e) = &error {
        if e.is_unique_violation() {
            return Error::conflict(e.message().to_string());
        }
    }
    Error::upstream(format!("database query failed: {error}"))
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = Error;

    fn try_from(row: DeploymentRow) -> Result<Self> {
        let healthcheck = row.healthcheck.parse().map_err(|_| {
            Error::upstream(format!(
                "deployment {} has a malformed healthcheck: {:?}",
                row.name, row.healthcheck
            ))
        })?;
        Ok(Self {
            app_id: row.appid,
            name: row.name,
            space: row.space,
            instances: row.instances,
            plan: row.plan,
            healthcheck,
            port: row.port,
            image: row.image,
        })
    }
}

impl From<SpaceRow> for Space {
    fn from(row: SpaceRow) -> Self {
        Self {
            name: row.name,
            internal: row.internal,
            compliance: row.compliance,
            cluster: row.stack,
        }
    }
}

impl From<BindingRow> for Binding {
    fn from(row: BindingRow) -> Self {
        Binding::new(row.appname, row.space, row.bindtype, row.bindname)
    }
}

impl From<VarRow> for ConfigVar {
    fn from(row: VarRow) -> Self {
        ConfigVar::new(row.setname, row.varname, row.varvalue)
    }
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            name: row.name,
            space: row.space,
            command: row.cmd,
            plan: row.plan,
        }
    }
}

impl From<CronJobRow> for CronJob {
    fn from(row: CronJobRow) -> Self {
        Self {
            name: row.name,
            space: row.space,
            command: row.cmd,
            plan: row.plan,
            schedule: row.schedule,
        }
    }
}

fn cluster_auth(auth: &str) -> Option<ClusterAuth> {
    match auth {
        "certificate" => Some(ClusterAuth::Certificate),
        "token" => Some(ClusterAuth::Token),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn space(&self, name: &str) -> Result<Option<Space>> {
        let row = sqlx::query_as::<_, SpaceRow>(
            "SELECT name, internal, compliance, stack FROM spaces WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(Into::into))
    }

    async fn spaces(&self) -> Result<Vec<Space>> {
        let rows = sqlx::query_as::<_, SpaceRow>(
            "SELECT name, internal, compliance, stack FROM spaces ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_space(&self, space: &Space) -> Result<()> {
        sqlx::query("INSERT INTO spaces (name, internal, compliance, stack) VALUES ($1, $2, $3, $4)")
            .bind(&space.name)
            .bind(space.internal)
            .bind(&space.compliance)
            .bind(&space.cluster)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn delete_space(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM spaces WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn deployment(&self, name: &str, space: &str) -> Result<Option<Deployment>> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} WHERE name = $1 AND space = $2"
        ))
        .bind(name)
        .bind(space)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.map(Deployment::try_from).transpose()
    }

    async fn deployments(&self, space: &str) -> Result<Vec<Deployment>> {
        self.deployments_where("space = $1", space).await
    }

    async fn deployments_by_app_id(&self, app_id: Uuid) -> Result<Vec<Deployment>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} WHERE appid = $1 ORDER BY space, name"
        ))
        .bind(app_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(Deployment::try_from).collect()
    }

    async fn create_deployment(&self, d: &Deployment) -> Result<()> {
        sqlx::query(
            "INSERT INTO deployments (appid, name, space, instances, plan, healthcheck, port, image) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(d.app_id)
        .bind(&d.name)
        .bind(&d.space)
        .bind(d.instances)
        .bind(&d.plan)
        .bind(d.healthcheck.to_string())
        .bind(d.port)
        .bind(&d.image)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_deployment(&self, d: &Deployment) -> Result<()> {
        let res = sqlx::query(
            "UPDATE deployments SET appid = $1, instances = $2, plan = $3, healthcheck = $4, \
             port = $5, image = $6 WHERE name = $7 AND space = $8",
        )
        .bind(d.app_id)
        .bind(d.instances)
        .bind(&d.plan)
        .bind(d.healthcheck.to_string())
        .bind(d.port)
        .bind(&d.image)
        .bind(&d.name)
        .bind(&d.space)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if res.rows_affected() == 0 {
            return Err(Error::not_found(format!(
                "deployment {} does not exist in {}",
                d.name, d.space
            )));
        }
        Ok(())
    }

    async fn delete_deployment(&self, name: &str, space: &str) -> Result<()> {
        sqlx::query("DELETE FROM deployments WHERE name = $1 AND space = $2")
            .bind(name)
            .bind(space)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn bindings(&self, app: &str, space: &str) -> Result<Vec<Binding>> {
        let rows = sqlx::query_as::<_, BindingRow>(
            "SELECT appname, space, bindtype, bindname FROM bindings \
             WHERE appname = $1 AND space = $2 ORDER BY id",
        )
        .bind(app)
        .bind(space)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn bindings_to(&self, bind_type: &str, bind_name: &str) -> Result<Vec<Binding>> {
        let rows = sqlx::query_as::<_, BindingRow>(
            "SELECT appname, space, bindtype, bindname FROM bindings \
             WHERE bindtype = $1 AND bindname = $2 ORDER BY id",
        )
        .bind(bind_type)
        .bind(bind_name)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_binding(&self, b: &Binding) -> Result<()> {
        sqlx::query(
            "INSERT INTO bindings (appname, space, bindtype, bindname) VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&b.app)
        .bind(&b.space)
        .bind(&b.bind_type)
        .bind(&b.bind_name)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_binding(&self, b: &Binding) -> Result<()> {
        sqlx::query(
            "DELETE FROM bindings WHERE appname = $1 AND space = $2 AND bindtype = $3 \
             AND bindname = $4",
        )
        .bind(&b.app)
        .bind(&b.space)
        .bind(&b.bind_type)
        .bind(&b.bind_name)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_bindings(&self, app: &str, space: &str) -> Result<()> {
        sqlx::query("DELETE FROM bindings WHERE appname = $1 AND space = $2")
            .bind(app)
            .bind(space)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn config_set(&self, name: &str) -> Result<Option<ConfigSet>> {
        let row = sqlx::query_as::<_, SetRow>("SELECT name, type FROM sets WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.map(|r| ConfigSet::new(r.name, r.set_type)))
    }

    async fn config_sets(&self) -> Result<Vec<ConfigSet>> {
        let rows = sqlx::query_as::<_, SetRow>("SELECT name, type FROM sets ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        Ok(rows
            .into_iter()
            .map(|r| ConfigSet::new(r.name, r.set_type))
            .collect())
    }

    async fn create_config_set(&self, set: &ConfigSet) -> Result<()> {
        sqlx::query("INSERT INTO sets (name, type) VALUES ($1, $2)")
            .bind(&set.name)
            .bind(&set.set_type)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn delete_config_set(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        for sql in [
            "DELETE FROM configvars WHERE setname = $1",
            "DELETE FROM includes WHERE parent = $1 OR child = $1",
            "DELETE FROM sets WHERE name = $1",
        ] {
            sqlx::query(sql)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }
        tx.commit().await.map_err(db)
    }

    async fn config_vars(&self, set: &str) -> Result<Vec<ConfigVar>> {
        let rows = sqlx::query_as::<_, VarRow>(
            "SELECT setname, varname, varvalue FROM configvars WHERE setname = $1 ORDER BY id",
        )
        .bind(set)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn included_config_vars(&self, set: &str) -> Result<Vec<ConfigVar>> {
        let rows = sqlx::query_as::<_, VarRow>(
            "SELECT v.setname, v.varname, v.varvalue FROM configvars v \
             JOIN includes i ON i.child = v.setname \
             WHERE i.parent = $1 ORDER BY i.id, v.id",
        )
        .bind(set)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn includes(&self, set: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT child FROM includes WHERE parent = $1 ORDER BY id")
                .bind(set)
                .fetch_all(&self.pool)
                .await
                .map_err(db)?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    async fn add_include(&self, parent: &str, child: &str) -> Result<()> {
        let found: Vec<(String,)> = sqlx::query_as("SELECT name FROM sets WHERE name IN ($1, $2)")
            .bind(parent)
            .bind(child)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        for set in [parent, child] {
            if !found.iter().any(|(n,)| n == set) {
                return Err(Error::not_found(format!("config set {set} does not exist")));
            }
        }
        sqlx::query("INSERT INTO includes (parent, child) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(parent)
            .bind(child)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn delete_include(&self, parent: &str, child: &str) -> Result<()> {
        sqlx::query("DELETE FROM includes WHERE parent = $1 AND child = $2")
            .bind(parent)
            .bind(child)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn upsert_config_var(&self, var: &ConfigVar) -> Result<()> {
        if self.config_set(&var.set).await?.is_none() {
            return Err(Error::not_found(format!(
                "config set {} does not exist",
                var.set
            )));
        }
        sqlx::query(
            "INSERT INTO configvars (setname, varname, varvalue) VALUES ($1, $2, $3) \
             ON CONFLICT (setname, varname) DO UPDATE SET varvalue = EXCLUDED.varvalue",
        )
        .bind(&var.set)
        .bind(&var.name)
        .bind(&var.value)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_config_var(&self, set: &str, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM configvars WHERE setname = $1 AND varname = $2")
            .bind(set)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn add_config_vars(
        &self,
        set: &ConfigSet,
        binding: &Binding,
        vars: &[ConfigVar],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query("INSERT INTO sets (name, type) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(&set.name)
            .bind(&set.set_type)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        sqlx::query(
            "INSERT INTO bindings (appname, space, bindtype, bindname) VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&binding.app)
        .bind(&binding.space)
        .bind(&binding.bind_type)
        .bind(&binding.bind_name)
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        for var in vars {
            sqlx::query(
                "INSERT INTO configvars (setname, varname, varvalue) VALUES ($1, $2, $3) \
                 ON CONFLICT (setname, varname) DO UPDATE SET varvalue = EXCLUDED.varvalue",
            )
            .bind(&var.set)
            .bind(&var.name)
            .bind(&var.value)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }
        tx.commit().await.map_err(db)
    }

    async fn plan(&self, name: &str) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT name, type, memrequest, memlimit FROM plans WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(|r| Plan {
            name: r.name,
            plan_type: r.plan_type,
            memory: Memory {
                request: r.memrequest,
                limit: r.memlimit,
            },
        }))
    }

    async fn features(&self, app: &str, space: &str) -> Result<BTreeMap<String, bool>> {
        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT optionkey, optionvalue FROM appfeature WHERE app = $1 AND space = $2",
        )
        .bind(app)
        .bind(space)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().collect())
    }

    async fn routes(&self, app: &str, space: &str) -> Result<Vec<Route>> {
        let rows = sqlx::query_as::<_, RouteRow>(
            "SELECT domain, path, internal FROM routerpaths WHERE app = $1 AND space = $2 \
             ORDER BY id",
        )
        .bind(app)
        .bind(space)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows
            .into_iter()
            .map(|r| Route {
                domain: r.domain,
                path: r.path,
                internal: r.internal,
            })
            .collect())
    }

    async fn job(&self, name: &str, space: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT name, space, cmd, plan FROM jobs WHERE name = $1 AND space = $2",
        )
        .bind(name)
        .bind(space)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(Into::into))
    }

    async fn jobs(&self, space: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT name, space, cmd, plan FROM jobs WHERE space = $1 ORDER BY name",
        )
        .bind(space)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn put_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (name, space, cmd, plan) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (space, name) DO UPDATE SET cmd = EXCLUDED.cmd, plan = EXCLUDED.plan",
        )
        .bind(&job.name)
        .bind(&job.space)
        .bind(&job.command)
        .bind(&job.plan)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_job(&self, name: &str, space: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE name = $1 AND space = $2")
            .bind(name)
            .bind(space)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn cron_job(&self, name: &str, space: &str) -> Result<Option<CronJob>> {
        let row = sqlx::query_as::<_, CronJobRow>(
            "SELECT name, space, cmd, plan, schedule FROM cronjobs WHERE name = $1 AND space = $2",
        )
        .bind(name)
        .bind(space)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(Into::into))
    }

    async fn cron_jobs(&self, space: &str) -> Result<Vec<CronJob>> {
        let rows = sqlx::query_as::<_, CronJobRow>(
            "SELECT name, space, cmd, plan, schedule FROM cronjobs WHERE space = $1 ORDER BY name",
        )
        .bind(space)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn put_cron_job(&self, cron: &CronJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO cronjobs (name, space, cmd, plan, schedule) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (space, name) DO UPDATE SET cmd = EXCLUDED.cmd, plan = EXCLUDED.plan, \
             schedule = EXCLUDED.schedule",
        )
        .bind(&cron.name)
        .bind(&cron.space)
        .bind(&cron.command)
        .bind(&cron.plan)
        .bind(&cron.schedule)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_cron_job(&self, name: &str, space: &str) -> Result<()> {
        sqlx::query("DELETE FROM cronjobs WHERE name = $1 AND space = $2")
            .bind(name)
            .bind(space)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn clusters(&self) -> Result<Vec<ClusterRecord>> {
        let rows = sqlx::query_as::<_, ClusterRow>(
            "SELECT name, apiserver, auth, secretpath FROM clusters ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter()
            .map(|r| {
                let auth = cluster_auth(&r.auth).ok_or_else(|| {
                    Error::upstream(format!("cluster {} has unknown auth {:?}", r.name, r.auth))
                })?;
                Ok(ClusterRecord {
                    name: r.name,
                    api_server: r.apiserver,
                    auth,
                    secret_path: r.secretpath,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use region_controller_core::deployment::HealthCheck;

    #[test]
    fn rows_convert_to_records() {
        let row = DeploymentRow {
            appid: None,
            name: "gotest".into(),
            space: "gotest".into(),
            instances: 1,
            plan: "scout".into(),
            healthcheck: "tcp".into(),
            port: Some(8080),
            image: None,
        };
        let d = Deployment::try_from(row).unwrap();
        assert_eq!(d.healthcheck, HealthCheck::Tcp);
        assert_eq!(d.port, Some(8080));

        let bad = DeploymentRow {
            appid: None,
            name: "gotest".into(),
            space: "gotest".into(),
            instances: 1,
            plan: "scout".into(),
            healthcheck: "ping".into(),
            port: None,
            image: None,
        };
        assert!(matches!(
            Deployment::try_from(bad),
            Err(Error::Upstream(_))
        ));
    }

    #[test]
    fn auth_modes() {
        assert_eq!(cluster_auth("certificate"), Some(ClusterAuth::Certificate));
        assert_eq!(cluster_auth("token"), Some(ClusterAuth::Token));
        assert_eq!(cluster_auth("basic"), None);
    }

    #[test]
    fn schema_defines_every_table() {
        for table in [
            "spaces",
            "deployments",
            "bindings",
            "sets",
            "configvars",
            "includes",
            "plans",
            "appfeature",
            "routerpaths",
            "jobs",
            "cronjobs",
            "clusters",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "{table}"
            );
        }
    }
}
