//! An [`Issuer`] that orders certificates from cert-manager.

use crate::{gateway::Gateway, labels};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use region_controller_core::{
    CertificateMaterial, CertificateOrder, Error, Ingress, Issuer, NewOrder, OrderStatus, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const ORDER_ID: &str = "region-controller.io/order-id";
pub const COMMENT: &str = "region-controller.io/comment";
pub const REQUESTOR: &str = "region-controller.io/requestor";

#[derive(Clone, Debug)]
pub struct CertManagerConfig {
    /// The issuer resource orders are signed by; also this issuer's name.
    pub issuer: String,
    pub issuer_kind: String,
    /// Namespace certificate resources and their secrets are written to.
    pub namespace: String,
}

#[derive(Clone, Debug)]
pub struct CertManagerIssuer {
    gateway: Gateway,
    config: CertManagerConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Certificate {
    #[serde(default = "api_version")]
    api_version: String,
    #[serde(default = "kind")]
    kind: String,
    metadata: Metadata,
    spec: CertificateSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<CertificateStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    name: String,
    namespace: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateSpec {
    secret_name: String,
    #[serde(default)]
    common_name: String,
    #[serde(default)]
    dns_names: Vec<String>,
    issuer_ref: IssuerRef,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct IssuerRef {
    name: String,
    kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateStatus {
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default)]
    not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    not_after: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    type_: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct Secret {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

fn api_version() -> String {
    "cert-manager.io/v1".to_string()
}

fn kind() -> String {
    "Certificate".to_string()
}

// === impl CertManagerConfig ===

impl CertManagerConfig {
    /// Several issuers share one namespace, so each keeps to the certificates it signs.
    fn signs(&self, cert: &Certificate) -> bool {
        let issuer = &cert.spec.issuer_ref;
        issuer.name == self.issuer && issuer.kind == self.issuer_kind
    }

    fn owned(&self, certs: Vec<Certificate>) -> Vec<Certificate> {
        certs.into_iter().filter(|c| self.signs(c)).collect()
    }
}

// === impl CertManagerIssuer ===

impl CertManagerIssuer {
    pub fn new(gateway: Gateway, config: CertManagerConfig) -> Self {
        Self { gateway, config }
    }

    fn certificates(&self) -> String {
        format!(
            "/apis/cert-manager.io/v1/namespaces/{}/certificates",
            self.config.namespace
        )
    }

    fn certificate(&self, id: &str, order: &NewOrder) -> Certificate {
        let name = resource_name(&order.common_name, id);
        let secret_name = format!("{name}-tls");
        let mut annotations = BTreeMap::new();
        annotations.insert(COMMENT.to_string(), order.comment.clone());
        annotations.insert(REQUESTOR.to_string(), order.requestor.clone());
        Certificate {
            api_version: api_version(),
            kind: kind(),
            metadata: Metadata {
                labels: Some((ORDER_ID.to_string(), id.to_string()))
                    .into_iter()
                    .collect(),
                annotations,
                namespace: self.config.namespace.clone(),
                name,
                creation_timestamp: None,
            },
            spec: CertificateSpec {
                secret_name,
                common_name: order.common_name.clone(),
                dns_names: order.dns_names(),
                issuer_ref: IssuerRef {
                    name: self.config.issuer.clone(),
                    kind: self.config.issuer_kind.clone(),
                },
            },
            status: None,
        }
    }

    async fn find(&self, id: &str) -> Result<Option<Certificate>> {
        let path = format!(
            "{}?labelSelector={}",
            self.certificates(),
            labels::query(&ORDER_ID.replace('/', "%2F"), id)
        );
        let found = self.gateway.list::<Certificate>(&path).await?;
        Ok(self.config.owned(found).pop())
    }

    fn order_from(cert: Certificate) -> CertificateOrder {
        let status = cert.status.unwrap_or_default();
        let state = order_status(&status);
        let dns_names = cert.spec.dns_names;
        let common_name = if cert.spec.common_name.is_empty() {
            dns_names.first().cloned().unwrap_or_default()
        } else {
            cert.spec.common_name
        };
        let mut meta = cert.metadata;
        CertificateOrder {
            id: meta.labels.remove(ORDER_ID).unwrap_or_default(),
            subject_alternative_names: dns_names
                .into_iter()
                .filter(|n| *n != common_name)
                .collect(),
            common_name,
            status: state,
            issued: (state == OrderStatus::Issued)
                .then(|| status.not_before.or(meta.creation_timestamp))
                .flatten(),
            expires: status.not_after,
            issuer: cert.spec.issuer_ref.name,
            comment: meta.annotations.remove(COMMENT).unwrap_or_default(),
            requestor: meta.annotations.remove(REQUESTOR).unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl Issuer for CertManagerIssuer {
    fn name(&self) -> &str {
        &self.config.issuer
    }

    async fn create_order(&self, id: &str, order: &NewOrder) -> Result<()> {
        let cert = self.certificate(id, order);
        info!(%id, name = %cert.metadata.name, cn = %order.common_name, "Ordering certificate");
        self.gateway.post(&self.certificates(), &cert).await?;
        Ok(())
    }

    async fn get_order(&self, id: &str) -> Result<Option<CertificateOrder>> {
        Ok(self.find(id).await?.map(Self::order_from))
    }

    async fn list_orders(&self) -> Result<Vec<CertificateOrder>> {
        let path = format!(
            "{}?labelSelector={}",
            self.certificates(),
            ORDER_ID.replace('/', "%2F")
        );
        let certs = self.gateway.list::<Certificate>(&path).await?;
        Ok(self
            .config
            .owned(certs)
            .into_iter()
            .map(Self::order_from)
            .collect())
    }

    async fn is_ready(&self, id: &str) -> Result<bool> {
        let cert = self
            .find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate order {id}")))?;
        Ok(order_status(&cert.status.unwrap_or_default()) == OrderStatus::Issued)
    }

    async fn material(&self, id: &str, common_name: &str) -> Result<CertificateMaterial> {
        let cert = self
            .find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate order {id}")))?;
        let path = format!(
            "/api/v1/namespaces/{}/secrets/{}",
            self.config.namespace, cert.spec.secret_name
        );
        let secret = self
            .gateway
            .get::<Secret>(&path)
            .await?
            .ok_or_else(|| Error::upstream(format!("no material issued for {common_name}")))?;

        let field = |key: &str| -> Result<Vec<u8>> {
            let bytes = secret
                .data
                .get(key)
                .map(|v| STANDARD.decode(v))
                .transpose()
                .map_err(|e| Error::upstream(format!("{key} for {common_name}: {e}")))?
                .unwrap_or_default();
            if bytes.is_empty() {
                return Err(Error::upstream(format!(
                    "{key} for {common_name} is empty"
                )));
            }
            Ok(bytes)
        };
        debug!(%id, secret = %cert.spec.secret_name, "Read certificate material");
        Ok(CertificateMaterial {
            cert_chain: field("tls.crt")?,
            private_key: field("tls.key")?,
        })
    }

    fn is_auto_installed(&self, ingress: &dyn Ingress) -> bool {
        ingress.is_service_mesh()
    }
}

/// Once the certificate has been issued it stays issued, even while a renewal is pending.
fn order_status(status: &CertificateStatus) -> OrderStatus {
    let ready = status
        .conditions
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True");
    if ready || status.not_after.is_some() {
        return OrderStatus::Issued;
    }
    let rejected = status
        .conditions
        .iter()
        .any(|c| matches!(c.reason.as_deref(), Some("Denied" | "Failed")));
    if rejected {
        OrderStatus::Rejected
    } else {
        OrderStatus::Pending
    }
}

/// A resource name derived from the common name, made unique by the order id.
fn resource_name(common_name: &str, id: &str) -> String {
    let cn = common_name
        .trim_start_matches("*.")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>();
    let cn = cn.trim_matches('-');
    let id = id.chars().take(8).collect::<String>();
    let max = 63 - id.len() - 1;
    let cn = cn.get(..cn.len().min(max)).unwrap_or(cn).trim_end_matches('-');
    format!("{cn}-{id}")
}
