use region_controller_core::{Error, Result, SecretStore};
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf};
use tracing::debug;

/// Reads secrets from a Vault KV mount over its HTTP API.
#[derive(Clone, Debug)]
pub struct VaultSecrets {
    client: reqwest::Client,
    addr: String,
    token: String,
}

/// Reads secrets from JSON files, one object of strings per path.
///
/// A secret at `clusters/c1` lives in `{dir}/clusters/c1.json`.
#[derive(Clone, Debug)]
pub struct FileSecrets {
    dir: PathBuf,
}

// === impl VaultSecrets ===

impl VaultSecrets {
    pub fn new(client: reqwest::Client, addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            addr: addr.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl SecretStore for VaultSecrets {
    async fn secret(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let url = format!("{}/v1/{}", self.addr, path.trim_start_matches('/'));
        debug!(%url, "Reading secret");
        let rsp = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|error| Error::upstream(format!("secret store request failed: {error}")))?;

        let status = rsp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("secret {path} does not exist")));
        }
        if !status.is_success() {
            return Err(Error::upstream(format!(
                "secret store returned {status} for {path}"
            )));
        }
        let body = rsp
            .json::<Value>()
            .await
            .map_err(|error| Error::upstream(format!("invalid secret store response: {error}")))?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        // KV version 2 nests the values one level deeper.
        let data = match data.get("data") {
            Some(inner @ Value::Object(_)) => inner.clone(),
            _ => data,
        };
        non_empty(path, string_map(data))
    }
}

// === impl FileSecrets ===

impl FileSecrets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl SecretStore for FileSecrets {
    async fn secret(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let rel = path.trim_matches('/');
        if rel.split('/').any(|part| part == "..") {
            return Err(Error::invalid(format!("invalid secret path: {path}")));
        }
        let file = self.dir.join(format!("{rel}.json"));
        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("secret {path} does not exist")));
            }
            Err(error) => {
                return Err(Error::upstream(format!(
                    "failed to read {}: {error}",
                    file.display()
                )))
            }
        };
        let value = serde_json::from_slice::<Value>(&bytes)?;
        non_empty(path, string_map(value))
    }
}

fn string_map(value: Value) -> BTreeMap<String, String> {
    let Value::Object(fields) = value else {
        return BTreeMap::new();
    };
    fields
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Null => None,
            other => Some((k, other.to_string())),
        })
        .collect()
}

fn non_empty(path: &str, map: BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
    if map.is_empty() {
        return Err(Error::upstream(format!("secret {path} is empty")));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("clusters")).unwrap();
        std::fs::write(
            dir.path().join("clusters/c1.json"),
            r#"{"token": "abc", "ca": "-----BEGIN CERTIFICATE-----", "port": 443}"#,
        )
        .unwrap();

        let secrets = FileSecrets::new(dir.path());
        assert_eq!(
            secrets.secret("clusters/c1").await.unwrap(),
            btreemap! {
                "ca".to_string() => "-----BEGIN CERTIFICATE-----".to_string(),
                "port".to_string() => "443".to_string(),
                "token".to_string() => "abc".to_string(),
            }
        );
        assert!(secrets
            .secret("clusters/c2")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            secrets.secret("../etc/passwd").await.unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn empty_secrets_are_upstream_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.json"), "{}").unwrap();
        let err = FileSecrets::new(dir.path())
            .secret("empty")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)), "{err}");
    }
}
