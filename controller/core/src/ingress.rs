use crate::{
    certificate::CertificateMaterial,
    filter::{CorsFilter, CspFilter, JwtFilter},
    Result,
};
use std::fmt;

/// Where a filter is installed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IngressTarget {
    /// The per-deployment endpoint.
    App {
        name: String,
        space: String,
        fqdn: String,
    },
    /// One route of a site, matched by domain and path prefix.
    Site { domain: String, path: String },
}

/// An ingress controller that can terminate TLS and enforce HTTP filters.
#[async_trait::async_trait]
pub trait Ingress: Send + Sync {
    fn name(&self) -> &str;

    /// Mesh ingresses read certificate material straight from the issuer's namespace.
    fn is_service_mesh(&self) -> bool;

    async fn install_or_update_jwt(&self, target: &IngressTarget, jwt: &JwtFilter) -> Result<()>;

    async fn install_or_update_cors(&self, target: &IngressTarget, cors: &CorsFilter)
        -> Result<()>;

    async fn install_or_update_csp(&self, target: &IngressTarget, csp: &CspFilter) -> Result<()>;

    /// Removing a filter that is not installed succeeds.
    async fn delete_jwt(&self, target: &IngressTarget) -> Result<()>;

    async fn delete_cors(&self, target: &IngressTarget) -> Result<()>;

    async fn delete_csp(&self, target: &IngressTarget) -> Result<()>;

    async fn set_maintenance_page(&self, name: &str, space: &str, enabled: bool) -> Result<()>;

    async fn install_certificate(
        &self,
        name: &str,
        material: &CertificateMaterial,
    ) -> Result<()>;
}

impl IngressTarget {
    pub fn app(name: &str, space: &str, domain: &str) -> Self {
        Self::App {
            name: name.to_string(),
            space: space.to_string(),
            fqdn: app_fqdn(name, space, domain),
        }
    }

    pub fn site(domain: &str, path: &str) -> Self {
        Self::Site {
            domain: domain.to_string(),
            path: path.to_string(),
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Self::App { fqdn, .. } => fqdn,
            Self::Site { domain, .. } => domain,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::App { .. } => "/",
            Self::Site { path, .. } => path,
        }
    }
}

impl fmt::Display for IngressTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host(), self.path())
    }
}

/// The host an app answers on. Apps in the `default` space drop the space suffix.
pub fn app_fqdn(name: &str, space: &str, domain: &str) -> String {
    let domain = domain.trim_start_matches('.');
    if space == "default" {
        format!("{name}.{domain}")
    } else {
        format!("{name}-{space}.{domain}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_joins_name_space_and_domain() {
        assert_eq!(
            app_fqdn("web", "prod", "apps.example.com"),
            "web-prod.apps.example.com"
        );
        assert_eq!(
            app_fqdn("web", "default", ".apps.example.com"),
            "web.apps.example.com"
        );
    }

    #[test]
    fn app_targets_apply_at_root() {
        let target = IngressTarget::app("web", "prod", "apps.example.com");
        assert_eq!(target.path(), "/");
        assert_eq!(target.to_string(), "web-prod.apps.example.com/");
    }
}
