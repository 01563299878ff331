//! The owning context of a module: its interned symbol table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of a [`Context`]; modules record the context they were built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

/// An interned symbol name. Only meaningful together with its [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> u32 {
        self.0
    }

    /// Rebuilds a symbol from an index previously returned by [`Symbol::index`].
    pub fn from_index(index: u32) -> Self {
        Symbol(index)
    }
}

/// Symbol table shared by the modules built against it.
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    names: Vec<String>,
    index: HashMap<String, Symbol>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            names: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Interns `name`, returning the existing symbol if it was seen before.
    pub fn symbol(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.index.get(name) {
            return symbol;
        }
        let symbol = Symbol(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), symbol);
        symbol
    }

    /// Looks up an already interned name.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.index.get(name).copied()
    }

    /// The name of `symbol`, or `None` if it was not interned here.
    pub fn name(&self, symbol: Symbol) -> Option<&str> {
        self.names.get(symbol.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
