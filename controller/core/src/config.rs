use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named bag of variables that deployments bind to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSet {
    pub name: String,
    #[serde(rename = "type", default)]
    pub set_type: String,
}

/// One variable stored in a set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVar {
    #[serde(rename = "setname")]
    pub set: String,
    #[serde(rename = "varname")]
    pub name: String,
    #[serde(rename = "varvalue", default)]
    pub value: String,
}

/// A composed environment entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A link from a deployment to a config set or a backing service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(rename = "appname")]
    pub app: String,
    pub space: String,
    #[serde(rename = "bindtype")]
    pub bind_type: String,
    #[serde(rename = "bindname")]
    pub bind_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindKind<'a> {
    /// Names the deployment's primary config set.
    Config,
    /// Build-time bindings carry no runtime configuration.
    Build,
    Service(&'a str),
}

// === impl ConfigSet ===

impl ConfigSet {
    pub fn new(name: impl Into<String>, set_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set_type: set_type.into(),
        }
    }

    /// The set the app config-var endpoint writes into.
    pub fn for_app(app: &str, space: &str) -> Self {
        Self::new(format!("{app}-{space}"), "app")
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("set name is required"));
        }
        Ok(())
    }
}

// === impl ConfigVar ===

impl ConfigVar {
    pub fn new(set: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.set.is_empty() {
            return Err(Error::invalid("setname is required"));
        }
        if self.name.is_empty() {
            return Err(Error::invalid("varname is required"));
        }
        Ok(())
    }
}

// === impl EnvVar ===

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// === impl Binding ===

impl Binding {
    pub const CONFIG: &'static str = "config";
    pub const BUILD: &'static str = "build";

    pub fn new(
        app: impl Into<String>,
        space: impl Into<String>,
        bind_type: impl Into<String>,
        bind_name: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            space: space.into(),
            bind_type: bind_type.into(),
            bind_name: bind_name.into(),
        }
    }

    pub fn kind(&self) -> BindKind<'_> {
        match self.bind_type.as_str() {
            Self::CONFIG => BindKind::Config,
            Self::BUILD => BindKind::Build,
            other => BindKind::Service(other),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.is_empty() || self.space.is_empty() {
            return Err(Error::invalid("binding requires an app and a space"));
        }
        if self.bind_type.is_empty() || self.bind_name.is_empty() {
            return Err(Error::invalid("binding requires a bindtype and a bindname"));
        }
        Ok(())
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}/{}:{}",
            self.app, self.space, self.bind_type, self.bind_name
        )
    }
}
