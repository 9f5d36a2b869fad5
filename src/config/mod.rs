//! Configuration management for the cluster harness.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (highest priority)
//! - A pure per-instance builder with an injectable override hook

mod harness;
mod role;

pub use harness::*;
pub use role::*;
