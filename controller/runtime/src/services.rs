use region_controller_core::{
    config::{Binding, EnvVar},
    Error, Result, ServiceCatalog,
};
use serde_json::Value;
use tracing::debug;

/// Asks the service broker for the variables a binding contributes.
///
/// `GET {base}/v1/service/{type}/{name}/credentials` answers either a list of
/// `{"name", "value"}` entries or a flat object.
#[derive(Clone, Debug)]
pub struct HttpServiceCatalog {
    client: reqwest::Client,
    base: String,
}

/// Used when no broker is configured. Service bindings contribute nothing.
#[derive(Clone, Debug, Default)]
pub struct NoServices(());

// === impl HttpServiceCatalog ===

impl HttpServiceCatalog {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ServiceCatalog for HttpServiceCatalog {
    async fn service_vars(&self, binding: &Binding) -> Result<Vec<EnvVar>> {
        let url = format!(
            "{}/v1/service/{}/{}/credentials",
            self.base, binding.bind_type, binding.bind_name
        );
        let rsp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| Error::upstream(format!("service broker request failed: {error}")))?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(Error::upstream(format!(
                "service broker returned {status} for {binding}"
            )));
        }
        let body = rsp
            .json::<Value>()
            .await
            .map_err(|error| Error::upstream(format!("invalid service broker response: {error}")))?;
        let vars = credentials(body)?;
        debug!(%binding, vars = vars.len(), "Fetched service credentials");
        Ok(vars)
    }
}

#[async_trait::async_trait]
impl ServiceCatalog for NoServices {
    async fn service_vars(&self, binding: &Binding) -> Result<Vec<EnvVar>> {
        debug!(%binding, "No service broker configured");
        Ok(Vec::new())
    }
}

fn credentials(body: Value) -> Result<Vec<EnvVar>> {
    match body {
        Value::Array(_) => Ok(serde_json::from_value(body)?),
        Value::Object(fields) => Ok(fields
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                EnvVar::new(name, value)
            })
            .collect()),
        other => Err(Error::upstream(format!(
            "unexpected service broker response: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn credentials_as_list_or_object() {
        let list = serde_json::json!([
            { "name": "DATABASE_URL", "value": "postgres://db-1" },
            { "name": "DATABASE_POOL", "value": "4" },
        ]);
        assert_eq!(
            credentials(list).unwrap(),
            vec![
                EnvVar::new("DATABASE_URL", "postgres://db-1"),
                EnvVar::new("DATABASE_POOL", "4"),
            ]
        );

        let object = serde_json::json!({ "REDIS_URL": "redis://cache", "REDIS_DB": 2 });
        assert_eq!(
            credentials(object).unwrap(),
            vec![
                EnvVar::new("REDIS_DB", "2"),
                EnvVar::new("REDIS_URL", "redis://cache"),
            ]
        );

        assert!(credentials(serde_json::json!("nope")).is_err());
    }
}
