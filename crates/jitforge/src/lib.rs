//! jitforge - a compile-and-link JIT engine
//!
//! Submitted IR modules are compiled to native code with Cranelift, linked
//! into the running process and handed back as typed function pointers.
//!
//! The pipeline, leaf first:
//! - [`target`] - the native ISA and its data layout
//! - [`compile`] - IR modules to relocatable [`object`]s
//! - [`memory`] - memory managers for linked sections
//! - [`link`] - objects to executable memory
//! - [`resolver`] - host-process symbols
//! - [`session`] - namespaces and symbol states
//! - [`engine`] - the [`Jit`] facade and [`callable`] handles
//!
//! [`arena`] holds a caller-owned allocator compiled code can call back into.

pub mod arena;
pub mod callable;
pub mod compile;
pub mod engine;
pub mod link;
pub mod memory;
pub mod object;
pub mod resolver;
pub mod session;
pub mod target;

pub use arena::{int_arena_alloc, IntArena};
pub use callable::{Callable, NativeFunction};
pub use engine::Jit;
pub use resolver::{AbsoluteSymbols, DefinitionGenerator, HostProcessResolver, ProcessSymbols};
pub use session::{NamespaceId, Resolution, ResolvedSymbol, SymbolState};
pub use target::TargetDescriptor;

pub use jitforge_config::{JitConfig, OptLevel};
pub use jitforge_core::{DataLayout, Endianness, JitError, ManglingMode, Result};
pub use jitforge_ir as ir;
