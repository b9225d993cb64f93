#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod certificate;
pub mod cluster;
pub mod config;
pub mod deployment;
mod error;
pub mod filter;
pub mod ingress;
pub mod job;
pub mod schedule;
pub mod services;
pub mod space;
pub mod store;

pub use self::{
    certificate::{CertificateMaterial, CertificateOrder, Issuer, NewOrder, OrderStatus},
    cluster::{Cluster, ClusterError},
    error::{Error, Failure, Result},
    ingress::{Ingress, IngressTarget},
    services::{SecretStore, ServiceCatalog},
    store::Store,
};

pub const CONTROLLER_NAME: &str = "region-controller";

/// Port assumed for a web workload when neither the request, its config, nor the stored
/// record name one.
pub const DEFAULT_PORT: i32 = 4747;
