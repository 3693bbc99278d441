//! proctor-backend — Collaborator implementations.
//!
//! Three backends for the engine's collaborator traits: a fully in-process
//! `memory` backend with a built-in evaluation worker (tests, demos), a
//! JSON-file durable store, and a `remote` HTTP backend for a hosted
//! account/evaluation service.

pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod remote;

pub use config::{create_backend, load_config, load_config_from, BackendConfig, BackendHandles, ProctorConfig};
pub use error::BackendError;
