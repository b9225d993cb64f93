use crate::Engine;
use ahash::AHashSet;
use region_controller_core::{
    filter::{Filter, FilterKind, HttpFilter, Skipped},
    space::Space,
    Ingress, IngressTarget,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One place a filter is enforced.
struct Surface<'a> {
    ingress: &'a Arc<dyn Ingress>,
    target: IngressTarget,
}

// === impl Engine ===

impl Engine {
    /// Installs every declared filter on the app's endpoint and on each of its site routes, then
    /// removes the filter kinds that were not declared.
    ///
    /// Failures are logged and skipped; they never fail the deploy that triggered them.
    pub(crate) async fn reconcile_filters(&self, name: &str, space: &Space, filters: &[Filter]) {
        let domain = self.settings.domain(space);
        let mut surfaces = vec![Surface {
            ingress: self.ingresses.for_space(space),
            target: IngressTarget::app(name, &space.name, domain),
        }];
        match self.store.routes(name, &space.name).await {
            Ok(routes) => surfaces.extend(routes.into_iter().map(|r| Surface {
                ingress: self.ingresses.select(r.internal),
                target: IngressTarget::site(&r.domain, &r.path),
            })),
            Err(error) => {
                warn!(%error, app = %name, space = %space.name, "Failed to list site routes");
            }
        }

        let declared = declared_filters(filters);
        let present = declared
            .iter()
            .map(HttpFilter::kind)
            .collect::<AHashSet<_>>();

        for filter in &declared {
            for surface in &surfaces {
                let res = match filter {
                    HttpFilter::Jwt(jwt) => {
                        surface
                            .ingress
                            .install_or_update_jwt(&surface.target, jwt)
                            .await
                    }
                    HttpFilter::Cors(cors) => {
                        surface
                            .ingress
                            .install_or_update_cors(&surface.target, cors)
                            .await
                    }
                    HttpFilter::Csp(csp) => {
                        surface
                            .ingress
                            .install_or_update_csp(&surface.target, csp)
                            .await
                    }
                };
                let kind = filter.kind();
                match res {
                    Ok(()) => debug!(%kind, target = %surface.target, "Installed filter"),
                    Err(error) => {
                        self.metrics.filter_failed(kind.as_str());
                        warn!(%error, %kind, target = %surface.target, "Failed to install filter");
                    }
                }
            }
        }

        for kind in FilterKind::ALL {
            if present.contains(&kind) {
                continue;
            }
            for surface in &surfaces {
                let res = match kind {
                    FilterKind::Jwt => surface.ingress.delete_jwt(&surface.target).await,
                    FilterKind::Cors => surface.ingress.delete_cors(&surface.target).await,
                    FilterKind::Csp => surface.ingress.delete_csp(&surface.target).await,
                };
                if let Err(error) = res {
                    self.metrics.filter_failed(kind.as_str());
                    warn!(%error, %kind, target = %surface.target, "Failed to remove filter");
                }
            }
        }
    }
}

/// Parses the declared filters, keeping the last of each kind.
fn declared_filters(filters: &[Filter]) -> Vec<HttpFilter> {
    let mut declared: Vec<HttpFilter> = Vec::with_capacity(filters.len());
    for filter in filters {
        match filter.parse() {
            Ok(parsed) => {
                declared.retain(|f| f.kind() != parsed.kind());
                declared.push(parsed);
            }
            Err(Skipped::UnknownType(kind)) => info!(%kind, "Ignoring unknown filter type"),
            Err(Skipped::Empty(kind, reason)) => warn!(%kind, reason, "Skipping filter"),
        }
    }
    declared
}
