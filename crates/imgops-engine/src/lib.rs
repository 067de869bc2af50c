//! Container engine orchestration for imgops
//!
//! This crate drives an external container engine CLI (Docker or a
//! compatible one) to build, push, run and inspect workload images:
//! - Argument compilation for `build` and `run` with deterministic ordering
//! - Push with content digest resolution
//! - Daemon health and server platform inspection
//! - Credential helper detection from the engine's client config

mod build_args;
mod client;
pub mod credentials;
mod error;
mod inspect;
mod run_args;
mod runner;
mod types;

pub use client::*;
pub use credentials::{CredentialConfig, CredentialProbeError};
pub use error::*;
pub use inspect::{
    parse_engine_info, parse_platform, strip_quoting_artifact, INFO_FORMAT, VERSION_FORMAT,
};
pub use runner::*;
pub use types::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
