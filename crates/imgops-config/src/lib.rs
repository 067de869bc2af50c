//! Configuration for imgops
//!
//! This crate handles:
//! - The engine configuration file (`~/.config/imgops/config.toml`)
//! - The host environment (home directory, environment variables, `PATH`)
//!   injected into the engine client

mod engine;
mod error;
mod host;

pub use engine::*;
pub use error::*;
pub use host::*;
