use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared HTTP filter as it arrives on a deploy request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type")]
    pub filter_type: String,
    #[serde(default, alias = "data")]
    pub options: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    Jwt,
    Cors,
    Csp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpFilter {
    Jwt(JwtFilter),
    Cors(CorsFilter),
    Csp(CspFilter),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JwtFilter {
    pub issuer: String,
    pub jwks_uri: String,
    pub audiences: Vec<String>,
    pub excludes: Vec<String>,
    pub includes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsFilter {
    pub allow_origin: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age: u32,
    pub allow_credentials: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CspFilter {
    pub policy: String,
}

/// Why a declared filter was not turned into an installable one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Skipped {
    UnknownType(String),
    /// The filter is recognised but its payload leaves nothing to install.
    Empty(FilterKind, &'static str),
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Jwt, FilterKind::Cors, FilterKind::Csp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::Cors => "cors",
            Self::Csp => "csp",
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Filter ===

impl Filter {
    pub fn new<'a>(
        filter_type: &str,
        options: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            filter_type: filter_type.to_string(),
            options: options
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn parse(&self) -> Result<HttpFilter, Skipped> {
        match self.filter_type.to_ascii_lowercase().as_str() {
            "jwt" => {
                let jwks_uri = self.get("jwks_uri");
                if jwks_uri.is_empty() {
                    return Err(Skipped::Empty(FilterKind::Jwt, "jwks_uri is missing"));
                }
                Ok(HttpFilter::Jwt(JwtFilter {
                    issuer: self.get("issuer").to_string(),
                    jwks_uri: jwks_uri.to_string(),
                    audiences: self.list("audiences"),
                    excludes: self.list("excludes"),
                    includes: self.list("includes"),
                }))
            }
            "cors" => Ok(HttpFilter::Cors(CorsFilter {
                allow_origin: self.list("allow_origin"),
                allow_methods: self.list("allow_methods"),
                allow_headers: self.list("allow_headers"),
                expose_headers: self.list("expose_headers"),
                max_age: self
                    .get("max_age")
                    .trim()
                    .parse()
                    .unwrap_or(CorsFilter::DEFAULT_MAX_AGE),
                allow_credentials: self.get("allow_credentials").trim() == "true",
            })),
            "csp" => {
                let policy = self.get("policy");
                if policy.is_empty() {
                    return Err(Skipped::Empty(FilterKind::Csp, "policy is empty"));
                }
                Ok(HttpFilter::Csp(CspFilter {
                    policy: policy.to_string(),
                }))
            }
            other => Err(Skipped::UnknownType(other.to_string())),
        }
    }

    fn get(&self, key: &str) -> &str {
        self.options.get(key).map(String::as_str).unwrap_or_default()
    }

    fn list(&self, key: &str) -> Vec<String> {
        split_list(self.get(key))
    }
}

// === impl HttpFilter ===

impl HttpFilter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Jwt(_) => FilterKind::Jwt,
            Self::Cors(_) => FilterKind::Cors,
            Self::Csp(_) => FilterKind::Csp,
        }
    }
}

impl CorsFilter {
    pub const DEFAULT_MAX_AGE: u32 = 86400;
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
