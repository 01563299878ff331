//! Host-process symbol resolution.
//!
//! When a module references a name that neither it nor an earlier module
//! defines, the [`HostProcessResolver`] asks its [`DefinitionGenerator`]s in
//! the order they were added, then its fallback (usually the process image).
//! Generators see logical (unmangled) names.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;

use jitforge_config::HostConfig;
use jitforge_core::{demangle, DataLayout, Result};
use libloading::Library;

/// A source of host definitions.
pub trait DefinitionGenerator {
    /// Returns the address of `name`, if this generator defines it.
    fn lookup(&self, name: &str) -> Option<usize>;
}

/// Explicit name to address table.
///
/// # Examples
///
/// ```
/// use jitforge::resolver::{AbsoluteSymbols, DefinitionGenerator};
///
/// static ANSWER: i32 = 42;
///
/// let symbols = AbsoluteSymbols::new().with("answer", &ANSWER as *const i32 as usize);
/// assert!(symbols.lookup("answer").is_some());
/// assert!(symbols.lookup("question").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbsoluteSymbols {
    symbols: HashMap<String, usize>,
}

impl AbsoluteSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, address: usize) -> Self {
        self.insert(name, address);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: usize) {
        self.symbols.insert(name.into(), address);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for AbsoluteSymbols {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().map(|(name, addr)| (name.into(), addr)).collect(),
        }
    }
}

impl DefinitionGenerator for AbsoluteSymbols {
    fn lookup(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }
}

/// Symbols exported by the running process image and the libraries it has
/// loaded, filtered by a [`HostConfig`] policy.
pub struct ProcessSymbols {
    library: Library,
    policy: HostConfig,
}

impl ProcessSymbols {
    /// Opens the process image with every name visible.
    pub fn new() -> Result<Self> {
        Self::with_policy(HostConfig::default())
    }

    /// Opens the process image, exposing only the names `policy` allows.
    pub fn with_policy(policy: HostConfig) -> Result<Self> {
        Ok(Self {
            library: open_process()?,
            policy,
        })
    }

    /// Restricts lookups to the given names. An empty list allows every
    /// name.
    pub fn with_allow_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.allow = names.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(unix)]
fn open_process() -> Result<Library> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn open_process() -> Result<Library> {
    libloading::os::windows::Library::this()
        .map(Into::into)
        .map_err(|e| jitforge_core::JitError::UnsupportedTarget(format!("cannot open process image: {e}")))
}

impl DefinitionGenerator for ProcessSymbols {
    fn lookup(&self, name: &str) -> Option<usize> {
        if !self.policy.allows(name) {
            return None;
        }
        // SAFETY: the symbol is only read as an address, never called here.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        let address = *symbol as usize;
        (address != 0).then_some(address)
    }
}

impl fmt::Debug for ProcessSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSymbols")
            .field("policy", &self.policy)
            .finish()
    }
}

/// Ordered list of generators consulted for names no module defines,
/// followed by an optional fallback.
pub struct HostProcessResolver {
    layout: DataLayout,
    generators: Vec<Box<dyn DefinitionGenerator>>,
    fallback: Option<Box<dyn DefinitionGenerator>>,
}

impl HostProcessResolver {
    /// Creates a resolver with no generators; it resolves nothing until one
    /// is added.
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            generators: Vec::new(),
            fallback: None,
        }
    }

    /// Appends a generator. Earlier generators take precedence, and all of
    /// them take precedence over the fallback.
    pub fn add_generator(&mut self, generator: impl DefinitionGenerator + 'static) {
        self.generators.push(Box::new(generator));
    }

    /// Sets the generator consulted after every other one, replacing any
    /// previous fallback.
    pub fn set_fallback(&mut self, generator: impl DefinitionGenerator + 'static) {
        self.fallback = Some(Box::new(generator));
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Resolves a mangled name.
    ///
    /// Names lacking the layout's global prefix are not host symbols and
    /// resolve to `None`.
    pub fn resolve(&self, mangled: &str) -> Option<usize> {
        let name = demangle(mangled, &self.layout)?;
        self.generators
            .iter()
            .chain(&self.fallback)
            .find_map(|g| g.lookup(name))
    }

    /// Number of generators, the fallback included.
    pub fn len(&self) -> usize {
        self.generators.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HostProcessResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostProcessResolver")
            .field("layout", &self.layout.to_string())
            .field("generators", &self.generators.len())
            .field("fallback", &self.has_fallback())
            .finish()
    }
}
