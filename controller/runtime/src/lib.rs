#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Wires the region controller together: the store, the secret and service backends, cluster
//! connections, the ingress controllers, and the certificate issuers feed one
//! [`region_controller_reconcile::Engine`], which is served over HTTP next to an admin server.

mod admin;
mod api;
mod args;
mod factory;
mod secrets;
mod serve;
mod services;

pub use self::args::Args;

type Body = http_body_util::Full<bytes::Bytes>;
