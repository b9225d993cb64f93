use crate::{config::EnvVar, filter::Filter, Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

/// The stored desired state of a replicated workload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(rename = "appid", default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<Uuid>,
    pub name: String,
    pub space: String,
    #[serde(default)]
    pub instances: i32,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub healthcheck: HealthCheck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// The image most recently observed on the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// How the platform decides a replica is ready.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum HealthCheck {
    Tcp,
    Http(String),
    #[default]
    Root,
}

/// A request to apply a deployment to its cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySpec {
    pub name: String,
    pub space: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, alias = "oneoff")]
    pub one_off: bool,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    #[serde(default)]
    pub service_mesh: bool,
    #[serde(default)]
    pub http2: bool,
}

/// An image reference split into repository and tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Image {
    pub repository: String,
    pub tag: String,
}

/// A workload shaped from a deployment record, ready to hand to a [`crate::Cluster`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub space: String,
    pub image: Image,
    pub command: Option<Vec<String>>,
    pub env: Vec<EnvVar>,
    pub labels: BTreeMap<String, String>,
    pub instances: i32,
    pub port: Option<u16>,
    pub health_check: HealthCheck,
    pub memory: Memory,
    pub sidecar: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub request: String,
    pub limit: String,
}

/// The network endpoint fronting a deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub space: String,
    pub port: u16,
    pub labels: BTreeMap<String, String>,
    pub http2: bool,
}

/// What a reconcile pass did to one cluster object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    NotRequired,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeployOutcome {
    pub service: ApplyOutcome,
    pub deployment: ApplyOutcome,
}

/// A deployment record merged with what the cluster reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    #[serde(flatten)]
    pub record: Deployment,
    pub replicas: i32,
    pub ready_replicas: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

// === impl Deployment ===

impl Deployment {
    pub fn new(name: impl Into<String>, space: impl Into<String>) -> Self {
        Self {
            app_id: None,
            name: name.into(),
            space: space.into(),
            instances: 1,
            plan: String::new(),
            healthcheck: HealthCheck::default(),
            port: None,
            image: None,
        }
    }

    /// Checks the fields every stored record must carry.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, "name")?;
        validate_name(&self.space, "space")?;
        validate_instances(self.instances)?;
        if self.plan.is_empty() {
            return Err(Error::invalid("plan is required"));
        }
        Ok(())
    }
}

// === impl HealthCheck ===

impl HealthCheck {
    pub fn http_path(&self) -> Option<&str> {
        match self {
            Self::Tcp => None,
            Self::Http(path) => Some(path),
            Self::Root => Some("/"),
        }
    }
}

impl FromStr for HealthCheck {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "/" => Ok(Self::Root),
            "tcp" => Ok(Self::Tcp),
            path if path.starts_with('/') => Ok(Self::Http(path.to_string())),
            _ => Err(Error::invalid(
                "healthcheck must be \"tcp\" or a path starting with \"/\"",
            )),
        }
    }
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Http(path) => f.write_str(path),
            Self::Root => f.write_str("/"),
        }
    }
}

impl Serialize for HealthCheck {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HealthCheck {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = Option::<String>::deserialize(d)?.unwrap_or_default();
        s.parse().map_err(serde::de::Error::custom)
    }
}

// === impl DeploySpec ===

impl DeploySpec {
    /// Checks the request before anything is looked up or written.
    pub fn validate(&self) -> Result<Image> {
        validate_name(&self.name, "name")?;
        validate_name(&self.space, "space")?;
        if let Some(port) = self.port {
            validate_port(port)?;
        }
        self.image.parse()
    }
}

// === impl Image ===

impl FromStr for Image {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::invalid("Image is required"));
        }
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(repository), Some(tag), None) if !repository.is_empty() && !tag.is_empty() => {
                Ok(Self {
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                })
            }
            _ => Err(Error::invalid("Image must contain tag")),
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

// === impl ApplyOutcome ===

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("Created"),
            Self::Updated => f.write_str("Updated"),
            Self::NotRequired => f.write_str("Not Required"),
        }
    }
}

impl Serialize for DeployOutcome {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut st = s.serialize_struct("DeployOutcome", 2)?;
        st.serialize_field("service", &format!("Service {}", self.service))?;
        st.serialize_field("deployment", &format!("Deployment {}", self.deployment))?;
        st.end()
    }
}

/// Names are used verbatim as cluster object names, so they must be DNS labels.
pub fn validate_name(name: &str, field: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(format!("{field} is required")));
    }
    let valid = name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(Error::invalid(format!(
            "{field} must be a lowercase DNS label: {name:?}"
        )));
    }
    Ok(())
}

pub fn validate_instances(instances: i32) -> Result<()> {
    if instances < 0 {
        return Err(Error::invalid("instances must be a non-negative integer"));
    }
    Ok(())
}

/// Ports are either a TCP port or a negative value marking a workload with no listener.
pub fn validate_port(port: i32) -> Result<()> {
    if port > 65535 || port == 0 {
        return Err(Error::invalid(format!("invalid port: {port}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_requires_exactly_one_tag_separator() {
        assert_eq!(
            "docker.io/akkeris/apachetest:latest".parse::<Image>().unwrap(),
            Image {
                repository: "docker.io/akkeris/apachetest".into(),
                tag: "latest".into(),
            }
        );
        for bad in ["docker.io/akkeris/apachetest", "repo:", ":tag", "a:b:c", ""] {
            assert!(bad.parse::<Image>().is_err(), "{bad}");
        }
        let err = "docker.io/akkeris/apachetest".parse::<Image>().unwrap_err();
        assert_eq!(err.to_string(), "Image must contain tag");
    }

    #[test]
    fn health_checks_parse() {
        assert_eq!("tcp".parse::<HealthCheck>().unwrap(), HealthCheck::Tcp);
        assert_eq!("/".parse::<HealthCheck>().unwrap(), HealthCheck::Root);
        assert_eq!(
            "/healthz".parse::<HealthCheck>().unwrap(),
            HealthCheck::Http("/healthz".into())
        );
        assert!("healthz".parse::<HealthCheck>().is_err());
    }

    #[test]
    fn record_defaults_healthcheck_to_root() {
        let d: Deployment = serde_json::from_value(serde_json::json!({
            "appid": "8a5b8d4c-3c2f-4a4d-9d39-1c2b3a4d5e6f",
            "name": "gotest",
            "space": "gotest",
            "instances": 1,
            "plan": "scout",
        }))
        .unwrap();
        assert_eq!(d.healthcheck, HealthCheck::Root);
        assert_eq!(
            serde_json::to_value(&d).unwrap()["healthcheck"],
            serde_json::json!("/")
        );
    }

    #[test]
    fn names_are_dns_labels() {
        assert!(validate_name("gotest", "name").is_ok());
        assert!(validate_name("go-test-2", "name").is_ok());
        for bad in ["", "GoTest", "1app", "app-", "app_name"] {
            assert!(validate_name(bad, "name").is_err(), "{bad}");
        }
    }

    #[test]
    fn outcome_messages() {
        let out = DeployOutcome {
            service: ApplyOutcome::NotRequired,
            deployment: ApplyOutcome::Created,
        };
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            serde_json::json!({
                "service": "Service Not Required",
                "deployment": "Deployment Created",
            })
        );
    }
}
