use crate::{
    admin::Admin,
    api::{Api, ApiMetrics},
    factory::KubeFactory,
    secrets::{FileSecrets, VaultSecrets},
    serve::serve,
    services::{HttpServiceCatalog, NoServices},
};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use region_controller_core::{
    config::EnvVar, Ingress, Issuer, SecretStore, ServiceCatalog, Store, DEFAULT_PORT,
};
use region_controller_k8s_api::{
    CertManagerConfig, CertManagerIssuer, Gateway, IstioConfig, IstioIngress, Shaper,
};
use region_controller_reconcile::{Engine, Ingresses, ReconcileMetrics, Settings};
use region_controller_store::{MemStore, PgStore};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, info_span, warn, Instrument};

const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[clap(name = "region-controller", about = "A region-scoped application control plane")]
pub struct Args {
    #[clap(
        long,
        default_value = "region=info,warn",
        env = "REGION_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(long, default_value = "0.0.0.0:5000", env = "API_ADDR")]
    api_addr: SocketAddr,

    #[clap(long, default_value = "0.0.0.0:9990", env = "ADMIN_ADDR")]
    admin_addr: SocketAddr,

    /// Postgres connection string. Without one, state is kept in memory and lost on exit.
    #[clap(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[clap(long, default_value = "10")]
    database_max_connections: u32,

    /// Appended to app host names in internal spaces.
    #[clap(long, env = "INTERNAL_DOMAIN", default_value = "internal.local")]
    internal_domain: String,

    #[clap(long, env = "EXTERNAL_DOMAIN", default_value = "apps.local")]
    external_domain: String,

    #[clap(long, env = "DEFAULT_PORT", default_value_t = DEFAULT_PORT)]
    default_port: i32,

    #[clap(long, env = "REVISION_HISTORY_LIMIT", default_value = "10")]
    revision_history_limit: i32,

    /// Pull secret attached to every shaped pod.
    #[clap(long, env = "IMAGE_PULL_SECRET")]
    image_pull_secret: Option<String>,

    /// Maximum in-flight requests to any one cluster's API server.
    #[clap(long, env = "CLUSTER_CONCURRENCY", default_value = "8")]
    cluster_concurrency: usize,

    /// The registered cluster running the ingress gateways and cert-manager. When unset, the
    /// controller's own cluster is used.
    #[clap(long, env = "INGRESS_CLUSTER")]
    ingress_cluster: Option<String>,

    #[clap(long, default_value = "istio-system")]
    ingress_namespace: String,

    #[clap(long, env = "PRIVATE_INGRESS_GATEWAY", default_value = "private-gateway")]
    private_ingress_gateway: String,

    #[clap(long, env = "PUBLIC_INGRESS_GATEWAY", default_value = "public-gateway")]
    public_ingress_gateway: String,

    /// Whether the private gateway reads issued certificates directly. When false, each
    /// issued certificate is copied into the gateway's namespace.
    #[clap(
        long,
        env = "PRIVATE_INGRESS_MESH",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    private_ingress_mesh: bool,

    #[clap(
        long,
        env = "PUBLIC_INGRESS_MESH",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    public_ingress_mesh: bool,

    #[clap(long, default_value = "sites-system")]
    sites_namespace: String,

    #[clap(long, default_value = "maintenance.sites-system.svc.cluster.local")]
    maintenance_host: String,

    /// Namespace certificate orders and their secrets are written to.
    #[clap(long, env = "CERT_NAMESPACE", default_value = "istio-system")]
    cert_namespace: String,

    /// Comma-separated cert-manager issuers orders may name.
    #[clap(long, env = "ISSUERS", default_value = "letsencrypt")]
    issuers: Issuers,

    #[clap(long, default_value = "letsencrypt", env = "DEFAULT_ISSUER")]
    default_issuer: String,

    #[clap(long, default_value = "ClusterIssuer")]
    issuer_kind: String,

    #[clap(long, env = "VAULT_ADDR")]
    vault_addr: Option<String>,

    #[clap(long, env = "VAULT_TOKEN", hide_env_values = true)]
    vault_token: Option<String>,

    /// Directory of JSON secrets, used when no Vault address is configured.
    #[clap(long, env = "SECRETS_DIR", default_value = "/etc/region-controller/secrets")]
    secrets_dir: PathBuf,

    /// Base URL of the service broker answering binding credentials.
    #[clap(long, env = "SERVICES_URL")]
    services_url: Option<String>,

    /// Comma-separated `KEY=VALUE` pairs injected into every workload.
    #[clap(long, env = "PLATFORM_ENV", default_value = "")]
    platform_env: PlatformEnv,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            api_addr,
            admin_addr,
            database_url,
            database_max_connections,
            internal_domain,
            external_domain,
            default_port,
            revision_history_limit,
            image_pull_secret,
            cluster_concurrency,
            ingress_cluster,
            ingress_namespace,
            private_ingress_gateway,
            public_ingress_gateway,
            private_ingress_mesh,
            public_ingress_mesh,
            sites_namespace,
            maintenance_host,
            cert_namespace,
            issuers: Issuers(issuers),
            default_issuer,
            issuer_kind,
            vault_addr,
            vault_token,
            secrets_dir,
            services_url,
            platform_env: PlatformEnv(platform_env),
        } = self;

        log_format.try_init(log_level)?;

        if !issuers.contains(&default_issuer) {
            bail!("default issuer {default_issuer} is not one of the configured issuers");
        }

        let mut prom = <Registry>::default();
        let reconcile_metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let api_metrics = ApiMetrics::register(prom.sub_registry_with_prefix("api"));

        let store: Arc<dyn Store> = match database_url {
            Some(url) => {
                let store = PgStore::connect(&url, database_max_connections)
                    .await
                    .context("failed to connect to the database")?;
                store
                    .apply_schema()
                    .await
                    .context("failed to apply the database schema")?;
                Arc::new(store)
            }
            None => {
                warn!("No database configured; state is kept in memory");
                Arc::new(MemStore::default())
            }
        };

        let http = reqwest::Client::builder()
            .timeout(HTTP_CLIENT_TIMEOUT)
            .build()?;

        let secrets: Arc<dyn SecretStore> = match (vault_addr, vault_token) {
            (Some(addr), Some(token)) => Arc::new(VaultSecrets::new(http.clone(), addr, token)),
            (Some(_), None) => bail!("VAULT_ADDR requires VAULT_TOKEN"),
            (None, _) => Arc::new(FileSecrets::new(secrets_dir)),
        };

        let services: Arc<dyn ServiceCatalog> = match services_url {
            Some(base) => Arc::new(HttpServiceCatalog::new(http, base)),
            None => Arc::new(NoServices::default()),
        };

        let shaper = Shaper {
            revision_history_limit,
            image_pull_secret,
        };
        let factory = Arc::new(KubeFactory::new(secrets, shaper, cluster_concurrency));

        let ingress_gateway = match ingress_cluster {
            Some(name) => {
                let record = store
                    .clusters()
                    .await?
                    .into_iter()
                    .find(|c| c.name == name)
                    .with_context(|| format!("ingress cluster {name} is not registered"))?;
                factory.gateway(&record).await?
            }
            None => {
                let client = kube::Client::try_default()
                    .await
                    .context("failed to build an in-cluster client")?;
                Gateway::new("local", client, cluster_concurrency)
            }
        };

        let ingress = |name: &str, selector: String, service_mesh: bool| -> Arc<dyn Ingress> {
            Arc::new(IstioIngress::new(
                ingress_gateway.clone(),
                IstioConfig {
                    name: name.to_string(),
                    namespace: ingress_namespace.clone(),
                    selector,
                    sites_namespace: sites_namespace.clone(),
                    maintenance_host: maintenance_host.clone(),
                    service_mesh,
                },
            ))
        };
        let ingresses = Ingresses {
            private: ingress("private", private_ingress_gateway, private_ingress_mesh),
            public: ingress("public", public_ingress_gateway, public_ingress_mesh),
        };

        let issuers = issuers
            .into_iter()
            .map(|issuer| {
                Arc::new(CertManagerIssuer::new(
                    ingress_gateway.clone(),
                    CertManagerConfig {
                        issuer,
                        issuer_kind: issuer_kind.clone(),
                        namespace: cert_namespace.clone(),
                    },
                )) as Arc<dyn Issuer>
            })
            .collect();

        let settings = Settings {
            internal_domain,
            external_domain,
            default_port,
            default_issuer,
            platform_env,
        };
        let engine = Engine::new(
            settings,
            store,
            factory,
            services,
            ingresses,
            issuers,
            reconcile_metrics,
        );

        let (ready_tx, ready_rx) = watch::channel(false);
        let (signal, drain) = drain::channel();

        let admin = TcpListener::bind(admin_addr).await?;
        tokio::spawn(
            serve(
                "admin",
                admin,
                Admin::new(ready_rx, Arc::new(prom)),
                drain.clone(),
            )
            .instrument(info_span!("admin")),
        );

        let api = TcpListener::bind(api_addr).await?;
        tokio::spawn(
            serve("api", api, Api::new(Arc::new(engine), api_metrics), drain)
                .instrument(info_span!("api")),
        );

        let _ = ready_tx.send(true);
        info!("Ready");

        shutdown().await?;
        info!("Shutting down");
        signal.drain().await;
        Ok(())
    }
}

/// Completes on the first SIGINT or SIGTERM.
async fn shutdown() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[derive(Clone, Debug)]
struct Issuers(Vec<String>);

impl std::str::FromStr for Issuers {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        let issuers = s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        if issuers.is_empty() {
            bail!("at least one issuer is required");
        }
        Ok(Self(issuers))
    }
}

#[derive(Clone, Debug, Default)]
struct PlatformEnv(Vec<EnvVar>);

impl std::str::FromStr for PlatformEnv {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) if !name.is_empty() => Ok(EnvVar::new(name, value)),
                _ => Err(anyhow!("invalid platform variable {pair:?}; expected KEY=VALUE")),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}
