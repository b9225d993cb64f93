//! An authenticated request channel to one cluster's API server.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use region_controller_core::{
    cluster::{ClusterError, ClusterResult},
    store::{ClusterAuth, ClusterRecord},
    SecretStore,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

pub const MERGE_PATCH: &str = "application/merge-patch+json";

#[derive(Clone)]
pub struct Gateway {
    name: Arc<str>,
    client: kube::Client,
    permits: Arc<Semaphore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("cluster {cluster} credentials are missing {key}")]
    MissingCredential { cluster: String, key: &'static str },

    #[error("invalid kubeconfig for cluster {cluster}: {error}")]
    Kubeconfig { cluster: String, error: String },

    #[error("failed to build client for cluster {cluster}: {error}")]
    Client { cluster: String, error: String },

    #[error(transparent)]
    Secrets(#[from] region_controller_core::Error),
}

// === impl Gateway ===

impl Gateway {
    /// Wraps a client, allowing at most `concurrency` requests in flight at once.
    pub fn new(name: impl Into<Arc<str>>, client: kube::Client, concurrency: usize) -> Self {
        Self {
            name: name.into(),
            client,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Builds a client for the cluster from credentials held in the secret store.
    ///
    /// Certificate clusters read `client-certificate`, `client-key`, and `ca`; token clusters
    /// read `token` and `ca`. All PEM values are stored unencoded.
    pub async fn connect(
        record: &ClusterRecord,
        secrets: &dyn SecretStore,
        concurrency: usize,
    ) -> Result<Self, ConnectError> {
        let creds = secrets.secret(&record.secret_path).await?;
        let get = |key: &'static str| {
            creds
                .get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConnectError::MissingCredential {
                    cluster: record.name.clone(),
                    key,
                })
        };

        let user = match record.auth {
            ClusterAuth::Certificate => serde_json::json!({
                "client-certificate-data": STANDARD.encode(get("client-certificate")?),
                "client-key-data": STANDARD.encode(get("client-key")?),
            }),
            ClusterAuth::Token => serde_json::json!({ "token": get("token")? }),
        };
        let name = &record.name;
        let kubeconfig = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{
                "name": name,
                "cluster": {
                    "server": record.api_server,
                    "certificate-authority-data": STANDARD.encode(get("ca")?),
                },
            }],
            "users": [{ "name": name, "user": user }],
            "contexts": [{ "name": name, "context": { "cluster": name, "user": name } }],
            "current-context": name,
        });

        let kubeconfig = serde_json::from_value::<kube::config::Kubeconfig>(kubeconfig)
            .map_err(|error| ConnectError::Kubeconfig {
                cluster: name.clone(),
                error: error.to_string(),
            })?;
        let config = kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &kube::config::KubeConfigOptions::default(),
        )
        .await
        .map_err(|error| ConnectError::Kubeconfig {
            cluster: name.clone(),
            error: error.to_string(),
        })?;
        let client = kube::Client::try_from(config).map_err(|error| ConnectError::Client {
            cluster: name.clone(),
            error: error.to_string(),
        })?;

        debug!(cluster = %name, server = %record.api_server, auth = ?record.auth, "Connected");
        Ok(Self::new(name.as_str(), client, concurrency))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends one request and returns the response status and body verbatim.
    ///
    /// Only transport failures are errors; every status the server answers with is returned
    /// to the caller. Nothing is retried.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<(&'static str, Vec<u8>)>,
    ) -> ClusterResult<(StatusCode, Bytes)> {
        let mut req = Request::builder().method(method.clone()).uri(path);
        let body = match body {
            Some((content_type, bytes)) => {
                trace!(cluster = %self.name, %method, path, body = %String::from_utf8_lossy(&bytes));
                req = req.header(header::CONTENT_TYPE, content_type);
                kube::client::Body::from(bytes)
            }
            None => kube::client::Body::empty(),
        };
        let req = req
            .header(header::ACCEPT, "application/json")
            .body(body)
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ClusterError::Transport("gateway closed".to_string()))?;
        let rsp = self
            .client
            .send(req)
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        let status = rsp.status();
        let body = rsp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?
            .to_bytes();

        debug!(cluster = %self.name, %method, path, status = status.as_u16());
        trace!(cluster = %self.name, body = %String::from_utf8_lossy(&body));
        Ok((status, body))
    }

    /// Fetches and decodes an object; a 404 is `None`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<Option<T>> {
        let (status, body) = self.request(Method::GET, path, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check(status, &body, path)?;
        decode(&body).map(Some)
    }

    /// Fetches a list and decodes its items.
    pub async fn list<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<Vec<T>> {
        #[derive(serde::Deserialize)]
        struct ObjectList<T> {
            #[serde(default = "Vec::new")]
            items: Vec<T>,
        }

        let (status, body) = self.request(Method::GET, path, None).await?;
        check(status, &body, path)?;
        decode::<ObjectList<T>>(&body).map(|l| l.items)
    }

    pub async fn post<T: Serialize>(&self, path: &str, obj: &T) -> ClusterResult<()> {
        self.send_json(Method::POST, path, "application/json", obj).await
    }

    pub async fn put<T: Serialize>(&self, path: &str, obj: &T) -> ClusterResult<()> {
        self.send_json(Method::PUT, path, "application/json", obj).await
    }

    pub async fn merge_patch<T: Serialize>(&self, path: &str, patch: &T) -> ClusterResult<()> {
        self.send_json(Method::PATCH, path, MERGE_PATCH, patch).await
    }

    pub async fn delete(&self, path: &str) -> ClusterResult<()> {
        let (status, body) = self.request(Method::DELETE, path, None).await?;
        check(status, &body, path)
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        content_type: &'static str,
        obj: &T,
    ) -> ClusterResult<()> {
        let bytes = serde_json::to_vec(obj).map_err(|e| ClusterError::Decode(e.to_string()))?;
        let (status, body) = self
            .request(method, path, Some((content_type, bytes)))
            .await?;
        check(status, &body, path)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.name)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

/// Maps a response status onto the cluster error taxonomy.
pub fn check(status: StatusCode, body: &[u8], what: &str) -> ClusterResult<()> {
    if status.is_success() || status.is_redirection() {
        return Ok(());
    }
    Err(match status {
        StatusCode::NOT_FOUND => ClusterError::NotFound(what.to_string()),
        StatusCode::CONFLICT => ClusterError::Conflict(what.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClusterError::Invalid(String::from_utf8_lossy(body).into_owned())
        }
        status => ClusterError::Status {
            code: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    })
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> ClusterResult<T> {
    serde_json::from_slice(body).map_err(|e| ClusterError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_kinds() {
        assert!(check(StatusCode::OK, b"", "x").is_ok());
        assert!(check(StatusCode::CREATED, b"", "x").is_ok());
        assert_eq!(
            check(StatusCode::NOT_FOUND, b"", "deployments/web"),
            Err(ClusterError::NotFound("deployments/web".into()))
        );
        assert!(matches!(
            check(StatusCode::CONFLICT, b"", "x"),
            Err(ClusterError::Conflict(_))
        ));
        assert!(matches!(
            check(StatusCode::UNPROCESSABLE_ENTITY, b"bad", "x"),
            Err(ClusterError::Invalid(body)) if body == "bad"
        ));
        let err = check(StatusCode::SERVICE_UNAVAILABLE, b"busy", "x").unwrap_err();
        assert_eq!(
            err,
            ClusterError::Status {
                code: 503,
                body: "busy".into()
            }
        );
        assert!(err.is_retryable());
    }
}
