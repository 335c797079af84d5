//! Core primitives shared by the vault store, the manager and the DSL.
//!
//! Everything here is storage-agnostic except `db`, `schemas` and `broker`,
//! which own the SQLite file.

pub mod broker;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod model;
pub mod path;
pub mod schemas;
pub mod store;
pub mod time;
pub mod value;
