//! The execution session: symbol namespaces and their states.
//!
//! Every submitted module gets its own namespace. A namespace records the
//! state of each symbol the module defines and, once linked, owns the
//! module, its context and the memory its code lives in. Namespaces are
//! never removed, so a resolved address stays valid for the session's
//! lifetime.

use std::collections::HashMap;
use std::fmt;

use jitforge_core::{mangle, JitError, Result};
use jitforge_ir::{Context, Linkage, Module};
use tracing::{info, warn};

use crate::compile::CompileLayer;
use crate::link::{LinkedObject, ObjectLinkingLayer};
use crate::object::SymbolKind;
use crate::resolver::HostProcessResolver;

/// Identity of a namespace within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(u32);

impl NamespaceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a symbol inside its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    /// Registered, not yet being compiled.
    Unresolved,
    /// Its module is being compiled and linked.
    Materializing,
    /// Linked at a final address.
    Resolved { address: usize, kind: SymbolKind },
    /// Its module failed to compile or link.
    Failed,
}

/// A symbol with its final address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// Mangled name.
    pub name: String,
    pub address: usize,
    /// `None` for host symbols, whose kind is not known.
    pub kind: Option<SymbolKind>,
    /// Namespace that defines it; `None` for host symbols.
    pub namespace: Option<NamespaceId>,
}

/// Outcome of [`ExecutionSession::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedSymbol),
    /// Defined by a module that is still materializing.
    Pending,
    /// Only defined by modules that failed.
    Failed,
    NotFound,
}

#[derive(Debug, Clone, Copy)]
struct SymbolEntry {
    state: SymbolState,
    exported: bool,
}

/// The symbols of one submitted module.
pub struct Namespace {
    id: NamespaceId,
    name: String,
    symbols: HashMap<String, SymbolEntry>,
    module: Option<Module>,
    context: Option<Context>,
    linked: Option<LinkedObject>,
}

impl Namespace {
    fn new(id: NamespaceId, name: String) -> Self {
        Self {
            id,
            name,
            symbols: HashMap::new(),
            module: None,
            context: None,
            linked: None,
        }
    }

    pub fn id(&self) -> NamespaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State of the symbol with the given mangled name.
    pub fn state(&self, mangled: &str) -> Option<SymbolState> {
        self.symbols.get(mangled).map(|entry| entry.state)
    }

    /// Mangled names of every symbol the namespace defines, sorted.
    pub fn symbol_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The submitted module, with its data layout as normalized.
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.linked.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.symbols
            .values()
            .any(|entry| entry.state == SymbolState::Failed)
    }

    /// Bytes of code and data memory held by the namespace.
    pub fn memory_bytes(&self) -> usize {
        self.linked.as_ref().map_or(0, LinkedObject::memory_bytes)
    }

    /// Address of an exported, resolved symbol.
    fn exported_address(&self, mangled: &str) -> Option<(usize, SymbolKind)> {
        match self.symbols.get(mangled) {
            Some(SymbolEntry {
                state: SymbolState::Resolved { address, kind },
                exported: true,
            }) => Some((*address, *kind)),
            _ => None,
        }
    }

    /// Marks every symbol failed and reports `error`, which is returned.
    fn fail(&mut self, error: JitError) -> JitError {
        self.set_all(SymbolState::Failed);
        warn!(
            event = "module_failed",
            namespace = %self.id,
            module = %self.name,
            error = %error,
        );
        error
    }

    fn set_all(&mut self, state: SymbolState) {
        for entry in self.symbols.values_mut() {
            entry.state = state;
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("symbols", &self.symbols.len())
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Owner of all namespaces and of the host resolver.
#[derive(Debug)]
pub struct ExecutionSession {
    namespaces: Vec<Namespace>,
    host: HostProcessResolver,
}

impl ExecutionSession {
    pub fn new(host: HostProcessResolver) -> Self {
        Self {
            namespaces: Vec::new(),
            host,
        }
    }

    pub fn host(&self) -> &HostProcessResolver {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut HostProcessResolver {
        &mut self.host
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn namespace(&self, id: NamespaceId) -> Option<&Namespace> {
        self.namespaces.get(id.index())
    }

    /// Registers an empty namespace after all existing ones.
    pub fn create_namespace(&mut self, name: impl Into<String>) -> NamespaceId {
        let id = NamespaceId(self.namespaces.len() as u32);
        let name = name.into();
        info!(event = "namespace_created", namespace = %id, name = %name);
        self.namespaces.push(Namespace::new(id, name));
        id
    }

    /// Compiles and links `module` into namespace `id`.
    ///
    /// External references resolve against the module itself, then against
    /// exported symbols of earlier namespaces in creation order, then against
    /// the host. On failure every symbol of the namespace is marked
    /// [`SymbolState::Failed`] and nothing it defines becomes resolvable.
    pub fn add_module(
        &mut self,
        id: NamespaceId,
        module: Module,
        context: Context,
        compiler: &CompileLayer,
        linker: &ObjectLinkingLayer,
    ) -> Result<()> {
        let layout = *compiler.target().data_layout();
        if id.index() >= self.namespaces.len() {
            return Err(JitError::LookupMiss(format!("namespace {id}")));
        }
        let (prior, rest) = self.namespaces.split_at_mut(id.index());
        let prior: &[Namespace] = prior;
        let namespace = &mut rest[0];
        let host = &self.host;

        for (symbol, linkage) in module.definitions() {
            // Names missing from the context are reported by the compiler.
            let Some(name) = context.name(symbol) else {
                continue;
            };
            let mangled = mangle(name, &layout);
            if namespace.symbols.contains_key(&mangled) {
                let error = JitError::DuplicateDefinition {
                    symbol: name.to_string(),
                    namespace: namespace.name.clone(),
                };
                return Err(namespace.fail(error));
            }
            namespace.symbols.insert(
                mangled,
                SymbolEntry {
                    state: SymbolState::Unresolved,
                    exported: linkage == Linkage::Export,
                },
            );
        }
        namespace.set_all(SymbolState::Materializing);

        let resolve = |name: &str| -> Option<usize> {
            prior
                .iter()
                .find_map(|ns| ns.exported_address(name).map(|(address, _)| address))
                .or_else(|| host.resolve(name))
        };
        let result = compiler
            .compile(&module, &context)
            .and_then(|object| linker.link(&object, &resolve));

        namespace.module = Some(module);
        namespace.context = Some(context);

        match result {
            Ok(linked) => {
                for (name, entry) in namespace.symbols.iter_mut() {
                    entry.state = match linked.symbol(name) {
                        Some(symbol) => SymbolState::Resolved {
                            address: symbol.address,
                            kind: symbol.kind,
                        },
                        None => SymbolState::Failed,
                    };
                }
                info!(
                    event = "module_linked",
                    namespace = %namespace.id,
                    module = %namespace.name,
                    symbols = linked.symbols().len(),
                    memory_bytes = linked.memory_bytes(),
                );
                namespace.linked = Some(linked);
                Ok(())
            }
            Err(error) => Err(namespace.fail(error)),
        }
    }

    /// Looks a mangled name up across all namespaces in creation order.
    ///
    /// Only exported symbols are visible. A resolved definition anywhere
    /// wins over pending or failed ones.
    pub fn resolve(&self, mangled: &str) -> Resolution {
        let mut fallback = Resolution::NotFound;
        for namespace in &self.namespaces {
            let Some(entry) = namespace.symbols.get(mangled).filter(|e| e.exported) else {
                continue;
            };
            match entry.state {
                SymbolState::Resolved { address, kind } => {
                    return Resolution::Resolved(ResolvedSymbol {
                        name: mangled.to_string(),
                        address,
                        kind: Some(kind),
                        namespace: Some(namespace.id),
                    })
                }
                SymbolState::Unresolved | SymbolState::Materializing => {
                    fallback = Resolution::Pending;
                }
                SymbolState::Failed => {
                    if fallback == Resolution::NotFound {
                        fallback = Resolution::Failed;
                    }
                }
            }
        }
        fallback
    }

    /// Total bytes of memory held by all namespaces.
    pub fn memory_bytes(&self) -> usize {
        self.namespaces.iter().map(Namespace::memory_bytes).sum()
    }
}

#[cfg(test)]
mod tests;
