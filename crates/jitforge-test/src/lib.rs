//! Shared test fixtures for jitforge crates.
//!
//! This crate builds IR modules and data layouts used across the test
//! suites. It does NOT depend on `jitforge` itself, so the engine crate can
//! take it as a dev-dependency.
//!
//! - [`modules`] - small arithmetic modules and cross-module callers
//! - [`host`] - modules that call back into host-provided helpers
//! - [`layouts`] - data layouts that do and do not match a 64-bit host
//!
//! # Usage
//!
//! Add as a dev-dependency in your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! jitforge-test = { workspace = true }
//! ```
//!
//! Then build the module you need against a fresh context:
//!
//! ```
//! use jitforge_ir::Context;
//! use jitforge_test::modules::add_one_module;
//!
//! let mut context = Context::new();
//! let module = add_one_module(&mut context);
//! assert_eq!(module.functions().len(), 1);
//! ```

pub mod host;
pub mod layouts;
pub mod modules;

pub use host::{allocate_block_module, integer_distances_module};
pub use modules::{add_one_module, add_two_module, ghost_module, sum_to_module};
