//! An [`Ingress`] backed by an Istio ingress gateway.
//!
//! HTTP filters land in two places: JWT filters become a `RequestAuthentication` and a
//! denying `AuthorizationPolicy` selected onto the gateway's workloads; CORS and CSP filters
//! are written into the matching routes of the target's `VirtualService`.

use crate::gateway::Gateway;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use region_controller_core::{
    filter::{CorsFilter, CspFilter, JwtFilter},
    CertificateMaterial, Error, Ingress, IngressTarget, Result,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

const NETWORKING: &str = "/apis/networking.istio.io/v1beta1";
const SECURITY: &str = "/apis/security.istio.io/v1beta1";

const CSP_HEADER: &str = "Content-Security-Policy";
const MAINTENANCE_ROUTE: &str = "maintenance";

#[derive(Clone, Debug)]
pub struct IstioConfig {
    /// How the reconcilers refer to this ingress, e.g. `public`.
    pub name: String,
    /// Namespace of the gateway workloads; filter policies and TLS secrets are written here.
    pub namespace: String,
    /// Value of the gateway workloads' `istio` label.
    pub selector: String,
    /// Namespace holding the site virtual services.
    pub sites_namespace: String,
    /// Host the maintenance route sends traffic to.
    pub maintenance_host: String,
    /// Whether the gateway serves certificates straight from the issuer's secrets. When it
    /// doesn't, issued material is copied in with [`Ingress::install_certificate`].
    pub service_mesh: bool,
}

#[derive(Clone, Debug)]
pub struct IstioIngress {
    gateway: Gateway,
    config: IstioConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Object<S> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    spec: S,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Metadata {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadSelector {
    match_labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestAuthenticationSpec {
    selector: WorkloadSelector,
    jwt_rules: Vec<JwtRule>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct JwtRule {
    #[serde(skip_serializing_if = "String::is_empty")]
    issuer: String,
    jwks_uri: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    audiences: Vec<String>,
    forward_original_token: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct AuthorizationPolicySpec {
    selector: WorkloadSelector,
    action: &'static str,
    rules: Vec<Rule>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Rule {
    from: Vec<Source>,
    to: Vec<Operation>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Source {
    source: SourceSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceSpec {
    not_request_principals: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Operation {
    operation: OperationSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationSpec {
    hosts: Vec<String>,
    paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    not_paths: Vec<String>,
}

// === impl IstioIngress ===

impl IstioIngress {
    pub fn new(gateway: Gateway, config: IstioConfig) -> Self {
        Self { gateway, config }
    }

    fn selector(&self) -> WorkloadSelector {
        WorkloadSelector {
            match_labels: Some(("istio".to_string(), self.config.selector.clone()))
                .into_iter()
                .collect(),
        }
    }

    fn metadata(&self, target: &IngressTarget, suffix: &str) -> Metadata {
        Metadata {
            name: format!("{}-{suffix}", policy_key(target)),
            namespace: self.config.namespace.clone(),
            labels: Some(("ingress".to_string(), self.config.name.clone()))
                .into_iter()
                .collect(),
        }
    }

    fn request_authentication(&self, target: &IngressTarget, jwt: &JwtFilter) -> Result<Value> {
        let obj = Object {
            api_version: "security.istio.io/v1beta1",
            kind: "RequestAuthentication",
            metadata: self.metadata(target, "jwt"),
            spec: RequestAuthenticationSpec {
                selector: self.selector(),
                jwt_rules: vec![JwtRule {
                    issuer: jwt.issuer.clone(),
                    jwks_uri: jwt.jwks_uri.clone(),
                    audiences: jwt.audiences.clone(),
                    forward_original_token: true,
                }],
            },
        };
        Ok(serde_json::to_value(obj)?)
    }

    /// Denies requests to the target that carry no valid token.
    fn authorization_policy(&self, target: &IngressTarget, jwt: &JwtFilter) -> Result<Value> {
        let paths = if jwt.includes.is_empty() {
            vec![format!("{}*", target.path())]
        } else {
            jwt.includes.clone()
        };
        let obj = Object {
            api_version: "security.istio.io/v1beta1",
            kind: "AuthorizationPolicy",
            metadata: self.metadata(target, "jwt"),
            spec: AuthorizationPolicySpec {
                selector: self.selector(),
                action: "DENY",
                rules: vec![Rule {
                    from: vec![Source {
                        source: SourceSpec {
                            not_request_principals: vec!["*".to_string()],
                        },
                    }],
                    to: vec![Operation {
                        operation: OperationSpec {
                            hosts: vec![target.host().to_string()],
                            paths,
                            not_paths: jwt.excludes.clone(),
                        },
                    }],
                }],
            },
        };
        Ok(serde_json::to_value(obj)?)
    }

    /// Creates the object or replaces the existing one, carrying its resource version.
    async fn apply(&self, collection: &str, name: &str, mut obj: Value) -> Result<()> {
        let path = format!("{collection}/{name}");
        match self.gateway.get::<Value>(&path).await? {
            Some(existing) => {
                obj["metadata"]["resourceVersion"] = existing["metadata"]["resourceVersion"].clone();
                self.gateway.put(&path, &obj).await?;
            }
            None => self.gateway.post(collection, &obj).await?,
        }
        Ok(())
    }

    async fn remove(&self, collection: &str, name: &str) -> Result<()> {
        match self.gateway.delete(&format!("{collection}/{name}")).await {
            Err(e) if e.is_not_found() => Ok(()),
            res => res.map_err(Into::into),
        }
    }

    fn virtual_service_path(&self, target: &IngressTarget) -> String {
        match target {
            IngressTarget::App { name, space, .. } => {
                format!("{NETWORKING}/namespaces/{space}/virtualservices/{name}")
            }
            IngressTarget::Site { domain, .. } => format!(
                "{NETWORKING}/namespaces/{}/virtualservices/{domain}",
                self.config.sites_namespace
            ),
        }
    }

    /// Applies `edit` to every route of the target's virtual service that serves its path.
    async fn edit_routes(
        &self,
        target: &IngressTarget,
        edit: impl Fn(&mut serde_json::Map<String, Value>),
    ) -> Result<()> {
        let path = self.virtual_service_path(target);
        let mut vs = self
            .gateway
            .get::<Value>(&path)
            .await?
            .ok_or_else(|| Error::not_found(format!("virtual service for {target}")))?;

        let mut touched = 0;
        if let Some(routes) = vs["spec"]["http"].as_array_mut() {
            for route in routes.iter_mut().filter_map(Value::as_object_mut) {
                if route_serves(route, target) {
                    edit(route);
                    touched += 1;
                }
            }
        }
        if touched == 0 {
            return Err(Error::not_found(format!("no route serves {target}")));
        }
        debug!(ingress = %self.config.name, %target, routes = touched, "Updating routes");
        self.gateway.put(&path, &vs).await?;
        Ok(())
    }

    fn jwt_collections(&self) -> [String; 2] {
        let ns = &self.config.namespace;
        [
            format!("{SECURITY}/namespaces/{ns}/requestauthentications"),
            format!("{SECURITY}/namespaces/{ns}/authorizationpolicies"),
        ]
    }
}

#[async_trait::async_trait]
impl Ingress for IstioIngress {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_service_mesh(&self) -> bool {
        self.config.service_mesh
    }

    async fn install_or_update_jwt(&self, target: &IngressTarget, jwt: &JwtFilter) -> Result<()> {
        let name = format!("{}-jwt", policy_key(target));
        let [authn, authz] = self.jwt_collections();
        self.apply(&authn, &name, self.request_authentication(target, jwt)?)
            .await?;
        self.apply(&authz, &name, self.authorization_policy(target, jwt)?)
            .await
    }

    async fn install_or_update_cors(
        &self,
        target: &IngressTarget,
        cors: &CorsFilter,
    ) -> Result<()> {
        let policy = json!({
            "allowOrigins": cors.allow_origin.iter().map(|o| json!({ "exact": o })).collect::<Vec<_>>(),
            "allowMethods": cors.allow_methods,
            "allowHeaders": cors.allow_headers,
            "exposeHeaders": cors.expose_headers,
            "maxAge": format!("{}s", cors.max_age),
            "allowCredentials": cors.allow_credentials,
        });
        self.edit_routes(target, |route| {
            route.insert("corsPolicy".to_string(), policy.clone());
        })
        .await
    }

    async fn install_or_update_csp(&self, target: &IngressTarget, csp: &CspFilter) -> Result<()> {
        let value = Value::String(csp.policy.clone());
        self.edit_routes(target, |route| {
            let set = route
                .entry("headers")
                .or_insert_with(|| json!({}))
                .as_object_mut()
                .and_then(|h| {
                    h.entry("response")
                        .or_insert_with(|| json!({}))
                        .as_object_mut()
                })
                .and_then(|r| r.entry("set").or_insert_with(|| json!({})).as_object_mut());
            if let Some(set) = set {
                set.insert(CSP_HEADER.to_string(), value.clone());
            }
        })
        .await
    }

    async fn delete_jwt(&self, target: &IngressTarget) -> Result<()> {
        let name = format!("{}-jwt", policy_key(target));
        let [authn, authz] = self.jwt_collections();
        self.remove(&authz, &name).await?;
        self.remove(&authn, &name).await
    }

    async fn delete_cors(&self, target: &IngressTarget) -> Result<()> {
        match self
            .edit_routes(target, |route| {
                route.remove("corsPolicy");
            })
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            res => res,
        }
    }

    async fn delete_csp(&self, target: &IngressTarget) -> Result<()> {
        let res = self
            .edit_routes(target, |route| {
                if let Some(set) = route
                    .get_mut("headers")
                    .and_then(|h| h.get_mut("response"))
                    .and_then(|r| r.get_mut("set"))
                    .and_then(Value::as_object_mut)
                {
                    set.remove(CSP_HEADER);
                }
            })
            .await;
        match res {
            Err(e) if e.is_not_found() => Ok(()),
            res => res,
        }
    }

    async fn set_maintenance_page(&self, name: &str, space: &str, enabled: bool) -> Result<()> {
        let path = format!("{NETWORKING}/namespaces/{space}/virtualservices/{name}");
        let mut vs = self
            .gateway
            .get::<Value>(&path)
            .await?
            .ok_or_else(|| Error::not_found(format!("virtual service for {name}-{space}")))?;

        let Some(routes) = vs["spec"]["http"].as_array_mut() else {
            return Err(Error::upstream(format!(
                "virtual service for {name}-{space} has no http routes"
            )));
        };
        let present = routes
            .first()
            .is_some_and(|r| r["name"] == MAINTENANCE_ROUTE);
        match (enabled, present) {
            (true, false) => routes.insert(
                0,
                json!({
                    "name": MAINTENANCE_ROUTE,
                    "route": [{ "destination": { "host": self.config.maintenance_host } }],
                }),
            ),
            (false, true) => {
                routes.remove(0);
            }
            _ => return Ok(()),
        }
        info!(ingress = %self.config.name, %name, %space, enabled, "Toggling maintenance page");
        self.gateway.put(&path, &vs).await?;
        Ok(())
    }

    async fn install_certificate(&self, name: &str, material: &CertificateMaterial) -> Result<()> {
        let ns = &self.config.namespace;
        let secret = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "type": "kubernetes.io/tls",
            "metadata": { "name": name, "namespace": ns },
            "data": {
                "tls.crt": STANDARD.encode(&material.cert_chain),
                "tls.key": STANDARD.encode(&material.private_key),
            },
        });
        self.apply(&format!("/api/v1/namespaces/{ns}/secrets"), name, secret)
            .await
    }
}

/// A DNS-safe name unique to the target.
fn policy_key(target: &IngressTarget) -> String {
    let raw = match target {
        IngressTarget::App { name, space, .. } => format!("{name}-{space}"),
        IngressTarget::Site { domain, path } => format!("{domain}{path}"),
    };
    let mut key = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if !(c == '-' && key.ends_with('-')) {
            key.push(c);
        }
    }
    key.trim_matches('-').to_string()
}

/// App routes all serve the app. Site routes serve a path when they match its prefix.
fn route_serves(route: &serde_json::Map<String, Value>, target: &IngressTarget) -> bool {
    if route.get("name").and_then(Value::as_str) == Some(MAINTENANCE_ROUTE) {
        return false;
    }
    match target {
        IngressTarget::App { .. } => true,
        IngressTarget::Site { path, .. } => route
            .get("match")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .any(|m| m["uri"]["prefix"].as_str() == Some(path.as_str())),
    }
}
