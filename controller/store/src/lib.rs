#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Implementations of [`region_controller_core::Store`].
//!
//! [`PgStore`] is what the controller runs against. [`MemStore`] keeps the same relations in
//! process memory for tests and local development.

mod memory;
mod postgres;

pub use self::{
    memory::MemStore,
    postgres::{PgStore, SCHEMA},
};
