//! jitforge Core - shared types for the JIT pipeline
//!
//! This crate provides the pieces every other jitforge crate agrees on:
//! - Error kinds surfaced by submission and lookup
//! - Data layouts describing a target's pointer width, byte order and mangling
//! - The name mangler used by both the compiler and symbol lookups

pub mod error;
pub mod layout;
pub mod mangle;

pub use error::{JitError, Result};
pub use layout::{DataLayout, Endianness, LayoutParseError, ManglingMode};
pub use mangle::{demangle, is_valid_symbol_name, mangle};
