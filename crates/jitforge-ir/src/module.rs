//! Modules: the unit of submission.

use jitforge_core::{DataLayout, Endianness};

use crate::context::{Context, ContextId, Symbol};
use crate::expr::{Local, Stmt};
use crate::types::{Signature, Type};

/// Visibility of a definition outside its module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// Visible to lookups and to modules submitted later.
    #[default]
    Export,
    /// Only referenced from inside the defining module.
    Local,
}

/// A function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub symbol: Symbol,
    pub signature: Signature,
    pub linkage: Linkage,
    pub locals: Vec<Type>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// Creates an exported function with an empty body.
    pub fn new(symbol: Symbol, signature: Signature) -> Self {
        Self {
            symbol,
            signature,
            linkage: Linkage::Export,
            locals: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    /// Declares a new local of type `ty`.
    pub fn local(&mut self, ty: Type) -> Local {
        self.locals.push(ty);
        Local(self.locals.len() as u32 - 1)
    }

    /// Appends a statement to the body.
    pub fn push(&mut self, stmt: Stmt) {
        self.body.push(stmt);
    }
}

/// A data definition: initialized bytes placed in a data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDef {
    pub symbol: Symbol,
    pub bytes: Vec<u8>,
    pub align: u32,
    pub writable: bool,
    pub linkage: Linkage,
}

impl DataDef {
    pub fn read_only(symbol: Symbol, bytes: Vec<u8>) -> Self {
        Self {
            symbol,
            bytes,
            align: 8,
            writable: false,
            linkage: Linkage::Export,
        }
    }

    pub fn writable(symbol: Symbol, bytes: Vec<u8>) -> Self {
        Self {
            writable: true,
            ..Self::read_only(symbol, bytes)
        }
    }

    /// Encodes `values` with the given byte order.
    pub fn i32_array(symbol: Symbol, values: &[i32], endianness: Endianness) -> Self {
        let bytes = values
            .iter()
            .flat_map(|v| match endianness {
                Endianness::Little => v.to_le_bytes(),
                Endianness::Big => v.to_be_bytes(),
            })
            .collect();
        Self::read_only(symbol, bytes).with_align(4)
    }

    pub fn with_align(mut self, align: u32) -> Self {
        self.align = align;
        self
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }
}

/// What an import refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    Function(Signature),
    Data,
}

/// A symbol the module uses but does not define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub symbol: Symbol,
    pub kind: ImportKind,
}

/// A unit of compilable program text.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    context: ContextId,
    data_layout: Option<DataLayout>,
    functions: Vec<FunctionDef>,
    data: Vec<DataDef>,
    imports: Vec<Import>,
}

impl Module {
    /// Creates an empty module whose symbols are interned in `context`.
    pub fn new(name: impl Into<String>, context: &Context) -> Self {
        Self {
            name: name.into(),
            context: context.id(),
            data_layout: None,
            functions: Vec::new(),
            data: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// The module's data layout; `None` until one is set.
    pub fn data_layout(&self) -> Option<&DataLayout> {
        self.data_layout.as_ref()
    }

    pub fn set_data_layout(&mut self, layout: DataLayout) {
        self.data_layout = Some(layout);
    }

    pub fn with_data_layout(mut self, layout: DataLayout) -> Self {
        self.data_layout = Some(layout);
        self
    }

    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    pub fn data(&self) -> &[DataDef] {
        &self.data
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn define_function(&mut self, function: FunctionDef) {
        self.functions.push(function);
    }

    pub fn define_data(&mut self, data: DataDef) {
        self.data.push(data);
    }

    /// Declares an external function; it is resolved when the module is linked.
    pub fn import_function(&mut self, symbol: Symbol, signature: Signature) {
        self.imports.push(Import {
            symbol,
            kind: ImportKind::Function(signature),
        });
    }

    /// Declares external data; it is resolved when the module is linked.
    pub fn import_data(&mut self, symbol: Symbol) {
        self.imports.push(Import {
            symbol,
            kind: ImportKind::Data,
        });
    }

    pub fn function(&self, symbol: Symbol) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.symbol == symbol)
    }

    pub fn import(&self, symbol: Symbol) -> Option<&Import> {
        self.imports.iter().find(|i| i.symbol == symbol)
    }

    /// Returns true if the module defines `symbol` as a function or data.
    pub fn defines(&self, symbol: Symbol) -> bool {
        self.functions.iter().any(|f| f.symbol == symbol)
            || self.data.iter().any(|d| d.symbol == symbol)
    }

    /// Every defined symbol with its linkage, functions first.
    pub fn definitions(&self) -> impl Iterator<Item = (Symbol, Linkage)> + '_ {
        self.functions
            .iter()
            .map(|f| (f.symbol, f.linkage))
            .chain(self.data.iter().map(|d| (d.symbol, d.linkage)))
    }
}
