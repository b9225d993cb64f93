//! The controller's REST surface.
//!
//! Requests are parsed into a [`Route`] before anything runs, so the metrics label is the route
//! name rather than the raw path. Every error is rendered here and nowhere else: a JSON object
//! carrying the error kind and message, with the status from [`Error::status`]. Partial
//! failures of bulk operations also carry `succeeded` and `failures` arrays.

use crate::Body;
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    body::{Body as HttpBody, Incoming},
    header::{self, HeaderValue},
    Method, Request, Response, StatusCode,
};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use region_controller_core::{config::Binding, deployment::HealthCheck, Error, Result};
use region_controller_reconcile::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc, task};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;


/// Request bodies larger than this are refused with `413 Payload Too Large`.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct Api {
    engine: Arc<Engine>,
    metrics: ApiMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ApiMetrics {
    requests: Family<RequestLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    route: &'static str,
    status: String,
}

/// A deployment or job addressed by space and name.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Target {
    space: String,
    name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Route {
    Spaces,
    CreateSpace,
    Space(String),
    DeleteSpace(String),

    Deployments(String),
    CreateRecord(Target),
    Describe(Target),
    Deploy(Target),
    Delete(Target),
    SetHealthcheck(Target),
    SetPlan(Target),
    Scale(Target),
    Rollback(Target),
    Restart(Target),
    DeleteApp(String),

    ConfigSets,
    CreateConfigSet,
    ConfigSet(String),
    DeleteConfigSet(String),
    UpsertConfigVars,
    UpsertConfigVar(String),
    DeleteConfigVar { set: String, var: String },
    Includes(String),
    AddInclude { parent: String, child: String },
    DeleteInclude { parent: String, child: String },

    AppConfigVars(Target),
    SetAppConfigVars(Target),
    Bindings(Target),
    AddBinding(Target),
    DeleteBinding {
        app: Target,
        bind_type: String,
        bind_name: String,
    },
    Maintenance { app: Target, enabled: bool },

    Jobs(String),
    CreateJob(String),
    Job(Target),
    UpdateJob(Target),
    DeleteJob(Target),
    JobStatus(Target),
    RunJob(Target),
    ScaleJob(Target),
    StopJob(Target),
    CleanJob(Target),

    CronJobs(String),
    CreateCronJob(String),
    CronJob(Target),
    UpdateCronJob(Target),
    DeleteCronJob(Target),
    DeployCronJob(Target),
    StopCronJob(Target),

    Orders,
    CreateOrder,
    Order(String),
    InstallCertificate(String),
}

/// A rendered result before it becomes a response.
#[derive(Debug, PartialEq)]
struct Reply {
    status: StatusCode,
    body: Value,
}

#[derive(Deserialize)]
struct HealthcheckBody {
    #[serde(default)]
    healthcheck: HealthCheck,
}

#[derive(Deserialize)]
struct PlanBody {
    plan: String,
}

#[derive(Deserialize)]
struct ScaleBody {
    instances: i32,
}

#[derive(Deserialize)]
struct RollbackBody {
    revision: i64,
}

#[derive(Serialize)]
struct OrderCreated {
    id: String,
}

// === impl Api ===

impl Api {
    pub fn new(engine: Arc<Engine>, metrics: ApiMetrics) -> Self {
        Self { engine, metrics }
    }

    pub async fn handle(&self, method: &Method, path: &str, body: Bytes) -> Response<Body> {
        let Some(route) = Route::parse(method, path) else {
            let error = Error::not_found(format!("no route for {method} {path}"));
            self.metrics.request("unknown", StatusCode::NOT_FOUND);
            return Reply::error(&error).into_response();
        };

        let name = route.name();
        let reply = match execute(&self.engine, route, &body).await {
            Ok(reply) => reply,
            Err(error) => {
                if error.status().is_server_error() {
                    warn!(%error, kind = error.kind(), route = name, "Request failed");
                } else {
                    debug!(%error, kind = error.kind(), route = name, "Request rejected");
                }
                Reply::error(&error)
            }
        };
        self.metrics.request(name, reply.status);
        reply.into_response()
    }

    /// Buffers a request body, refusing it as soon as it grows past [`MAX_BODY_BYTES`].
    async fn read_body<B>(
        &self,
        method: &Method,
        path: &str,
        body: B,
    ) -> std::result::Result<Bytes, Response<Body>>
    where
        B: HttpBody,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let error = match Limited::new(body, MAX_BODY_BYTES).collect().await {
            Ok(body) => return Ok(body.to_bytes()),
            Err(error) => error,
        };
        let route = Route::parse(method, path).map_or("unknown", |r| r.name());
        let reply = if error.is::<LengthLimitError>() {
            Reply {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                body: json!({
                    "error": "payload_too_large",
                    "message": format!("request body exceeds {MAX_BODY_BYTES} bytes"),
                }),
            }
        } else {
            debug!(%error, route, "Failed to read request body");
            Reply::error(&Error::invalid(format!("failed to read request body: {error}")))
        };
        self.metrics.request(route, reply.status);
        Err(reply.into_response())
    }
}

impl tower::Service<Request<Incoming>> for Api {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Response<Body>, Infallible>>;

    fn poll_ready(
        &mut self,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Infallible>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let api = self.clone();
        let span = info_span!("api", method = %req.method(), path = %req.uri().path());
        Box::pin(
            async move {
                let (parts, body) = req.into_parts();
                let path = parts.uri.path();
                let rsp = match api.read_body(&parts.method, path, body).await {
                    Ok(body) => api.handle(&parts.method, path, body).await,
                    Err(rsp) => rsp,
                };
                Ok(rsp)
            }
            .instrument(span),
        )
    }
}

// === impl ApiMetrics ===

impl ApiMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "requests",
            "Count of API requests by route and response status",
            metrics.requests.clone(),
        );
        metrics
    }

    fn request(&self, route: &'static str, status: StatusCode) {
        self.requests
            .get_or_create(&RequestLabels {
                route,
                status: status.as_u16().to_string(),
            })
            .inc();
    }
}

// === impl Route ===

fn target(space: &str, name: &str) -> Target {
    Target {
        space: space.to_string(),
        name: name.to_string(),
    }
}

impl Route {
    fn parse(method: &Method, path: &str) -> Option<Self> {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        let route = match (method.as_str(), segments.as_slice()) {
            ("GET", ["v1", "spaces"]) => Self::Spaces,
            ("POST", ["v1", "space"]) => Self::CreateSpace,
            ("GET", ["v1", "space", s]) => Self::Space(s.to_string()),
            ("DELETE", ["v1", "space", s]) => Self::DeleteSpace(s.to_string()),

            ("GET", ["v2beta1", "space", s, "deployments"]) => Self::Deployments(s.to_string()),
            ("POST", ["v2beta1", "space", s, "deployment", d]) => Self::CreateRecord(target(s, d)),
            ("GET", ["v2beta1", "space", s, "deployment", d]) => Self::Describe(target(s, d)),
            ("DELETE", ["v2beta1", "space", s, "deployment", d]) => Self::Delete(target(s, d)),
            ("PUT", ["v2beta1", "space", s, "deployment", d, "deploy"]) => {
                Self::Deploy(target(s, d))
            }
            ("PATCH", ["v2beta1", "space", s, "deployment", d, "healthcheck"]) => {
                Self::SetHealthcheck(target(s, d))
            }
            ("PATCH", ["v2beta1", "space", s, "deployment", d, "plan"]) => {
                Self::SetPlan(target(s, d))
            }
            ("PATCH", ["v2beta1", "space", s, "deployment", d, "scale"]) => {
                Self::Scale(target(s, d))
            }
            ("POST", ["v2beta1", "space", s, "deployment", d, "rollback"]) => {
                Self::Rollback(target(s, d))
            }
            ("POST", ["v2beta1", "space", s, "deployment", d, "restart"]) => {
                Self::Restart(target(s, d))
            }
            ("DELETE", ["v1", "app", id]) => Self::DeleteApp(id.to_string()),

            ("GET", ["v1", "config", "sets"]) => Self::ConfigSets,
            ("POST", ["v1", "config", "set"]) => Self::CreateConfigSet,
            ("POST", ["v1", "config", "set", "configvar"]) => Self::UpsertConfigVars,
            ("GET", ["v1", "config", "set", set]) => Self::ConfigSet(set.to_string()),
            ("DELETE", ["v1", "config", "set", set]) => Self::DeleteConfigSet(set.to_string()),
            ("PUT", ["v1", "config", "set", set, "configvar"]) => {
                Self::UpsertConfigVar(set.to_string())
            }
            ("DELETE", ["v1", "config", "set", set, "configvar", var]) => Self::DeleteConfigVar {
                set: set.to_string(),
                var: var.to_string(),
            },
            ("GET", ["v1", "config", "set", set, "includes"]) => Self::Includes(set.to_string()),
            ("POST", ["v1", "config", "set", parent, "include", child]) => Self::AddInclude {
                parent: parent.to_string(),
                child: child.to_string(),
            },
            ("DELETE", ["v1", "config", "set", parent, "include", child]) => Self::DeleteInclude {
                parent: parent.to_string(),
                child: child.to_string(),
            },

            ("GET", ["v1", "space", s, "app", a, "configvars"]) => {
                Self::AppConfigVars(target(s, a))
            }
            ("POST", ["v1", "space", s, "app", a, "configvars"]) => {
                Self::SetAppConfigVars(target(s, a))
            }
            ("GET", ["v1", "space", s, "app", a, "bindings"]) => Self::Bindings(target(s, a)),
            ("POST", ["v1", "space", s, "app", a, "bind"]) => Self::AddBinding(target(s, a)),
            ("DELETE", ["v1", "space", s, "app", a, "bind", bind_type, bind_name]) => {
                Self::DeleteBinding {
                    app: target(s, a),
                    bind_type: bind_type.to_string(),
                    bind_name: bind_name.to_string(),
                }
            }
            ("POST", ["v1", "space", s, "app", a, "maintenance"]) => Self::Maintenance {
                app: target(s, a),
                enabled: true,
            },
            ("DELETE", ["v1", "space", s, "app", a, "maintenance"]) => Self::Maintenance {
                app: target(s, a),
                enabled: false,
            },

            ("GET", ["v1beta1", "space", s, "jobs"]) => Self::Jobs(s.to_string()),
            ("POST", ["v1beta1", "space", s, "jobs"]) => Self::CreateJob(s.to_string()),
            ("GET", ["v1beta1", "space", s, "jobs", j]) => Self::Job(target(s, j)),
            ("PUT", ["v1beta1", "space", s, "jobs", j]) => Self::UpdateJob(target(s, j)),
            ("DELETE", ["v1beta1", "space", s, "jobs", j]) => Self::DeleteJob(target(s, j)),
            ("GET", ["v1beta1", "space", s, "jobs", j, "status"]) => Self::JobStatus(target(s, j)),
            ("POST", ["v1beta1", "space", s, "jobs", j, "run"]) => Self::RunJob(target(s, j)),
            ("PUT", ["v1beta1", "space", s, "jobs", j, "scale"]) => Self::ScaleJob(target(s, j)),
            ("POST", ["v1beta1", "space", s, "jobs", j, "stop"]) => Self::StopJob(target(s, j)),
            ("POST", ["v1beta1", "space", s, "jobs", j, "clean"]) => Self::CleanJob(target(s, j)),

            ("GET", ["v1beta1", "space", s, "cronjobs"]) => Self::CronJobs(s.to_string()),
            ("POST", ["v1beta1", "space", s, "cronjobs"]) => Self::CreateCronJob(s.to_string()),
            ("GET", ["v1beta1", "space", s, "cronjobs", c]) => Self::CronJob(target(s, c)),
            ("PUT", ["v1beta1", "space", s, "cronjobs", c]) => Self::UpdateCronJob(target(s, c)),
            ("DELETE", ["v1beta1", "space", s, "cronjobs", c]) => {
                Self::DeleteCronJob(target(s, c))
            }
            ("POST", ["v1beta1", "space", s, "cronjobs", c, "deploy"]) => {
                Self::DeployCronJob(target(s, c))
            }
            ("POST", ["v1beta1", "space", s, "cronjobs", c, "stop"]) => {
                Self::StopCronJob(target(s, c))
            }

            ("GET", ["v1", "certs"]) => Self::Orders,
            ("POST", ["v1", "certs"]) => Self::CreateOrder,
            ("GET", ["v1", "certs", id]) => Self::Order(id.to_string()),
            ("POST", ["v1", "certs", id, "install"]) => Self::InstallCertificate(id.to_string()),

            _ => return None,
        };
        Some(route)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Spaces => "spaces",
            Self::CreateSpace => "create_space",
            Self::Space(_) => "space",
            Self::DeleteSpace(_) => "delete_space",
            Self::Deployments(_) => "deployments",
            Self::CreateRecord(_) => "create_deployment",
            Self::Describe(_) => "deployment",
            Self::Deploy(_) => "deploy",
            Self::Delete(_) => "delete_deployment",
            Self::SetHealthcheck(_) => "set_healthcheck",
            Self::SetPlan(_) => "set_plan",
            Self::Scale(_) => "scale",
            Self::Rollback(_) => "rollback",
            Self::Restart(_) => "restart",
            Self::DeleteApp(_) => "delete_app",
            Self::ConfigSets => "config_sets",
            Self::CreateConfigSet => "create_config_set",
            Self::ConfigSet(_) => "config_set",
            Self::DeleteConfigSet(_) => "delete_config_set",
            Self::UpsertConfigVars => "upsert_config_vars",
            Self::UpsertConfigVar(_) => "upsert_config_var",
            Self::DeleteConfigVar { .. } => "delete_config_var",
            Self::Includes(_) => "includes",
            Self::AddInclude { .. } => "add_include",
            Self::DeleteInclude { .. } => "delete_include",
            Self::AppConfigVars(_) => "app_config_vars",
            Self::SetAppConfigVars(_) => "set_app_config_vars",
            Self::Bindings(_) => "bindings",
            Self::AddBinding(_) => "add_binding",
            Self::DeleteBinding { .. } => "delete_binding",
            Self::Maintenance { .. } => "maintenance",
            Self::Jobs(_) => "jobs",
            Self::CreateJob(_) => "create_job",
            Self::Job(_) => "job",
            Self::UpdateJob(_) => "update_job",
            Self::DeleteJob(_) => "delete_job",
            Self::JobStatus(_) => "job_status",
            Self::RunJob(_) => "run_job",
            Self::ScaleJob(_) => "scale_job",
            Self::StopJob(_) => "stop_job",
            Self::CleanJob(_) => "clean_job",
            Self::CronJobs(_) => "cron_jobs",
            Self::CreateCronJob(_) => "create_cron_job",
            Self::CronJob(_) => "cron_job",
            Self::UpdateCronJob(_) => "update_cron_job",
            Self::DeleteCronJob(_) => "delete_cron_job",
            Self::DeployCronJob(_) => "deploy_cron_job",
            Self::StopCronJob(_) => "stop_cron_job",
            Self::Orders => "orders",
            Self::CreateOrder => "create_order",
            Self::Order(_) => "order",
            Self::InstallCertificate(_) => "install_certificate",
        }
    }
}

async fn execute(engine: &Engine, route: Route, body: &[u8]) -> Result<Reply> {
    match route {
        Route::Spaces => Reply::ok(engine.spaces().await?),
        Route::CreateSpace => Reply::created(engine.create_space(json(body)?).await?),
        Route::Space(name) => Reply::ok(engine.space(&name).await?),
        Route::DeleteSpace(name) => {
            engine.delete_space(&name).await?;
            Ok(Reply::message(format!("space {name} deleted")))
        }

        Route::Deployments(space) => Reply::ok(engine.list(&space).await?),
        Route::CreateRecord(t) => {
            let record = json_with(body, &[("name", &t.name), ("space", &t.space)])?;
            Reply::created(engine.create_deployment_record(record).await?)
        }
        Route::Describe(t) => Reply::ok(engine.describe(&t.name, &t.space).await?),
        Route::Deploy(t) => {
            let spec = json_with(body, &[("name", &t.name), ("space", &t.space)])?;
            Reply::created(engine.deploy(spec).await?)
        }
        Route::Delete(t) => {
            engine.delete(&t.name, &t.space).await?;
            Ok(Reply::message(format!("deployment {} deleted", t.name)))
        }
        Route::SetHealthcheck(t) => {
            let HealthcheckBody { healthcheck } = json(body)?;
            Reply::ok(engine.set_healthcheck(&t.name, &t.space, healthcheck).await?)
        }
        Route::SetPlan(t) => {
            let PlanBody { plan } = json(body)?;
            Reply::ok(engine.set_plan(&t.name, &t.space, &plan).await?)
        }
        Route::Scale(t) => {
            let ScaleBody { instances } = json(body)?;
            let record = engine.scale(&t.name, &t.space, instances).await?;
            Ok(Reply {
                status: StatusCode::ACCEPTED,
                body: serde_json::to_value(record)?,
            })
        }
        Route::Rollback(t) => {
            let RollbackBody { revision } = json(body)?;
            engine.rollback(&t.name, &t.space, revision).await?;
            Ok(Reply::message(format!(
                "deployment {} rolled back to revision {revision}",
                t.name
            )))
        }
        Route::Restart(t) => {
            engine.restart(&t.name, &t.space).await?;
            Ok(Reply::message(format!("deployment {} restarted", t.name)))
        }
        Route::DeleteApp(id) => {
            let app_id = Uuid::parse_str(&id)
                .map_err(|_| Error::invalid(format!("invalid app id: {id}")))?;
            Reply::ok(json!({ "succeeded": engine.delete_app(app_id).await? }))
        }

        Route::ConfigSets => Reply::ok(engine.config_sets().await?),
        Route::CreateConfigSet => Reply::created(engine.create_config_set(json(body)?).await?),
        Route::ConfigSet(set) => Reply::ok(engine.config_set_vars(&set).await?),
        Route::DeleteConfigSet(set) => {
            engine.delete_config_set(&set).await?;
            Ok(Reply::message(format!("config set {set} deleted")))
        }
        Route::UpsertConfigVars => Reply::ok(engine.upsert_config_vars(json(body)?).await?),
        Route::UpsertConfigVar(set) => {
            let var = json_with(body, &[("setname", &set)])?;
            Reply::ok(engine.upsert_config_var(var).await?)
        }
        Route::DeleteConfigVar { set, var } => {
            engine.delete_config_var(&set, &var).await?;
            Ok(Reply::message(format!("config var {var} deleted from {set}")))
        }
        Route::Includes(set) => Reply::ok(engine.includes(&set).await?),
        Route::AddInclude { parent, child } => {
            engine.add_include(&parent, &child).await?;
            Ok(Reply::message(format!("{parent} now includes {child}")))
        }
        Route::DeleteInclude { parent, child } => {
            engine.delete_include(&parent, &child).await?;
            Ok(Reply::message(format!("{parent} no longer includes {child}")))
        }

        Route::AppConfigVars(t) => Reply::ok(engine.app_config_vars(&t.name, &t.space).await?),
        Route::SetAppConfigVars(t) => {
            let vars = json(body)?;
            Reply::ok(engine.set_app_config_vars(&t.name, &t.space, vars).await?)
        }
        Route::Bindings(t) => Reply::ok(engine.bindings(&t.name, &t.space).await?),
        Route::AddBinding(t) => {
            let binding = json_with(body, &[("appname", &t.name), ("space", &t.space)])?;
            Reply::created(engine.add_binding(binding).await?)
        }
        Route::DeleteBinding {
            app,
            bind_type,
            bind_name,
        } => {
            let binding = Binding::new(app.name, app.space, bind_type, bind_name);
            let msg = format!("binding {binding} deleted");
            engine.delete_binding(binding).await?;
            Ok(Reply::message(msg))
        }
        Route::Maintenance { app, enabled } => {
            engine.set_maintenance(&app.name, &app.space, enabled).await?;
            let state = if enabled { "on" } else { "off" };
            Ok(Reply::message(format!("maintenance page {state} for {}", app.name)))
        }

        Route::Jobs(space) => Reply::ok(engine.jobs(&space).await?),
        Route::CreateJob(space) => {
            let job = json_with(body, &[("space", &space)])?;
            Reply::created(engine.create_job(job).await?)
        }
        Route::Job(t) => Reply::ok(engine.job(&t.name, &t.space).await?),
        Route::UpdateJob(t) => {
            let job = json_with(body, &[("name", &t.name), ("space", &t.space)])?;
            Reply::ok(engine.update_job(job).await?)
        }
        Route::DeleteJob(t) => {
            engine.delete_job(&t.name, &t.space).await?;
            Ok(Reply::message(format!("job {} deleted", t.name)))
        }
        Route::JobStatus(t) => Reply::ok(engine.job_status(&t.name, &t.space).await?),
        Route::RunJob(t) => {
            engine.run_job(&t.name, &t.space, json(body)?).await?;
            Ok(Reply {
                status: StatusCode::CREATED,
                body: json!({ "message": format!("job {} started", t.name) }),
            })
        }
        Route::ScaleJob(t) => {
            engine.scale_job(&t.name, &t.space, json(body)?).await?;
            Ok(Reply::message(format!("job {} scaled", t.name)))
        }
        Route::StopJob(t) => {
            engine.stop_job(&t.name, &t.space).await?;
            Ok(Reply::message(format!("job {} stopped", t.name)))
        }
        Route::CleanJob(t) => {
            engine.clean_job(&t.name, &t.space).await?;
            Ok(Reply::message(format!("job {} cleaned", t.name)))
        }

        Route::CronJobs(space) => Reply::ok(engine.cron_jobs(&space).await?),
        Route::CreateCronJob(space) => {
            let cron = json_with(body, &[("space", &space)])?;
            Reply::created(engine.create_cron_job(cron).await?)
        }
        Route::CronJob(t) => Reply::ok(engine.cron_job(&t.name, &t.space).await?),
        Route::UpdateCronJob(t) => {
            let cron = json_with(body, &[("name", &t.name), ("space", &t.space)])?;
            Reply::ok(engine.update_cron_job(cron).await?)
        }
        Route::DeleteCronJob(t) => {
            engine.delete_cron_job(&t.name, &t.space).await?;
            Ok(Reply::message(format!("cron job {} deleted", t.name)))
        }
        Route::DeployCronJob(t) => {
            let outcome = engine
                .deploy_cron_job(&t.name, &t.space, json(body)?)
                .await?;
            Ok(Reply {
                status: StatusCode::CREATED,
                body: json!({ "cronjob": outcome.to_string() }),
            })
        }
        Route::StopCronJob(t) => {
            engine.stop_cron_job(&t.name, &t.space).await?;
            Ok(Reply::message(format!("cron job {} stopped", t.name)))
        }

        Route::Orders => Reply::ok(engine.orders().await?),
        Route::CreateOrder => {
            let id = engine.create_order(json(body)?).await?;
            Reply::created(OrderCreated { id })
        }
        Route::Order(id) => Reply::ok(engine.order(&id).await?),
        Route::InstallCertificate(id) => {
            engine.install_certificate(&id).await?;
            Ok(Reply::message(format!("certificate {id} installed")))
        }
    }
}

// === impl Reply ===

impl Reply {
    fn ok<T: Serialize>(body: T) -> Result<Self> {
        Ok(Self {
            status: StatusCode::OK,
            body: serde_json::to_value(body)?,
        })
    }

    fn created<T: Serialize>(body: T) -> Result<Self> {
        Ok(Self {
            status: StatusCode::CREATED,
            body: serde_json::to_value(body)?,
        })
    }

    fn message(msg: String) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({ "message": msg }),
        }
    }

    fn error(error: &Error) -> Self {
        let mut body = json!({
            "error": error.kind(),
            "message": error.to_string(),
        });
        if let (
            Error::PartialFailure {
                succeeded,
                failures,
            },
            Value::Object(fields),
        ) = (error, &mut body)
        {
            fields.insert("succeeded".to_string(), Value::from(succeeded.clone()));
            let failures = failures
                .iter()
                .map(|f| json!({ "name": f.name, "error": f.error }))
                .collect::<Vec<_>>();
            fields.insert("failures".to_string(), Value::Array(failures));
        }
        Self {
            status: error.status(),
            body,
        }
    }

    fn into_response(self) -> Response<Body> {
        let mut rsp = Response::new(Body::from(self.body.to_string()));
        *rsp.status_mut() = self.status;
        rsp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        rsp
    }
}

fn json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    json_with(body, &[])
}

/// Decodes a request body with fields taken from the path laid over it.
fn json_with<T: DeserializeOwned>(body: &[u8], fields: &[(&str, &str)]) -> Result<T> {
    let invalid = |error: serde_json::Error| Error::invalid(format!("invalid request body: {error}"));
    let mut value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body).map_err(invalid)?
    };
    if let Value::Object(obj) = &mut value {
        for (key, val) in fields {
            obj.insert(key.to_string(), Value::String(val.to_string()));
        }
    }
    serde_json::from_value(value).map_err(invalid)
}
