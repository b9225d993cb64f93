#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Kubernetes, Istio, and cert-manager implementations of the controller's capability traits.

pub mod cert_manager;
mod cluster;
pub mod gateway;
pub mod istio;
pub mod labels;
pub mod shape;

pub use self::{
    cert_manager::{CertManagerConfig, CertManagerIssuer},
    cluster::KubeCluster,
    gateway::{ConnectError, Gateway},
    istio::{IstioConfig, IstioIngress},
    shape::Shaper,
};
pub use k8s_openapi::api;
