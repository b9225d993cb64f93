use crate::Engine;
use region_controller_core::{
    CertificateMaterial, CertificateOrder, Error, Issuer, NewOrder, OrderStatus, Result,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// === impl Engine ===

impl Engine {
    /// Submits a certificate order and returns the id it can be looked up by.
    #[instrument(skip(self, order), fields(common_name = %order.common_name))]
    pub async fn create_order(&self, order: NewOrder) -> Result<String> {
        let order = order.normalize()?;
        let issuer_name = order
            .issuer
            .as_deref()
            .filter(|i| !i.is_empty())
            .unwrap_or(&self.settings.default_issuer);
        let issuer = self
            .issuers
            .iter()
            .find(|i| i.name() == issuer_name)
            .ok_or_else(|| Error::invalid(format!("unknown issuer: {issuer_name}")))?;

        let id = Uuid::new_v4().to_string();
        issuer.create_order(&id, &order).await?;
        info!(%id, issuer = %issuer.name(), "Created certificate order");
        Ok(id)
    }

    pub async fn order(&self, id: &str) -> Result<CertificateOrder> {
        self.find_order(id).await.map(|(_, order)| order)
    }

    pub async fn orders(&self) -> Result<Vec<CertificateOrder>> {
        let mut orders = Vec::new();
        for issuer in &self.issuers {
            orders.extend(issuer.list_orders().await?);
        }
        Ok(orders)
    }

    /// Hands an issued certificate to each ingress that does not pick it up on its own.
    #[instrument(skip(self))]
    pub async fn install_certificate(&self, id: &str) -> Result<()> {
        let (issuer, order) = self.find_order(id).await?;
        if order.status != OrderStatus::Issued || !issuer.is_ready(id).await? {
            return Err(Error::unprocessable(format!(
                "certificate {id} has not been issued"
            )));
        }

        let secret = tls_secret_name(&order.common_name);
        let mut material: Option<CertificateMaterial> = None;
        for ingress in [&self.ingresses.private, &self.ingresses.public] {
            if issuer.is_auto_installed(ingress.as_ref()) {
                debug!(ingress = %ingress.name(), "Issuer installs the certificate itself");
                continue;
            }
            if material.is_none() {
                material = Some(issuer.material(id, &order.common_name).await?);
            }
            if let Some(material) = &material {
                ingress.install_certificate(&secret, material).await?;
                info!(ingress = %ingress.name(), %secret, "Installed certificate");
            }
        }
        Ok(())
    }

    async fn find_order(&self, id: &str) -> Result<(&Arc<dyn Issuer>, CertificateOrder)> {
        for issuer in &self.issuers {
            if let Some(order) = issuer.get_order(id).await? {
                return Ok((issuer, order));
            }
        }
        Err(Error::not_found(format!("certificate {id} does not exist")))
    }
}

/// The secret an ingress stores the certificate under.
fn tls_secret_name(common_name: &str) -> String {
    let mut name = common_name
        .trim_start_matches("*.")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>();
    if common_name.starts_with("*.") {
        name.insert_str(0, "star-");
    }
    name.truncate(63 - "-tls".len());
    let mut name = name.trim_end_matches('-').to_ascii_lowercase();
    name.push_str("-tls");
    name
}
