//! The JIT engine facade.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::marker::PhantomPinned;
use std::pin::Pin;

use jitforge_config::JitConfig;
use jitforge_core::{mangle, DataLayout, JitError, Result};
use jitforge_ir::{Context, Module};
use tracing::{info, warn};

use crate::callable::{Callable, NativeFunction};
use crate::compile::CompileLayer;
use crate::link::ObjectLinkingLayer;
use crate::resolver::{DefinitionGenerator, HostProcessResolver, ProcessSymbols};
use crate::session::{ExecutionSession, NamespaceId, Resolution, ResolvedSymbol};
use crate::target::TargetDescriptor;

/// Compiles IR modules into the running process and hands out their
/// functions.
///
/// The engine lives pinned on the heap behind its single owning handle and
/// is not `Sync`: all state sits behind a `RefCell`. Code and data memory of
/// every submitted module is released when the engine is dropped. The
/// [`Callable`]s it hands out borrow it, so [`Callable::call`] never reaches
/// released memory; raw pointers taken with [`Callable::get`] must not be
/// used after the drop.
///
/// # Examples
///
/// ```
/// use jitforge::ir::{Context, Expr, FunctionDef, Module, Signature, Stmt, Type};
/// use jitforge::{Jit, JitConfig, TargetDescriptor};
///
/// let target = TargetDescriptor::host(&JitConfig::default()).unwrap();
/// let jit = Jit::new(target);
///
/// let mut context = Context::new();
/// let mut module = Module::new("demo", &context);
/// let add_one = context.symbol("add_one");
/// module.define_function(
///     FunctionDef::new(add_one, Signature::new([Type::I32], Some(Type::I32)))
///         .with_body(vec![Stmt::ret(Expr::param(0) + Expr::i32(1))]),
/// );
/// jit.submit_module(module, context).unwrap();
///
/// let f = unsafe { jit.get_function::<extern "C" fn(i32) -> i32>("add_one") }.unwrap();
/// assert_eq!(f.call(41), 42);
/// ```
pub struct Jit {
    target: TargetDescriptor,
    compiler: CompileLayer,
    linker: ObjectLinkingLayer,
    session: RefCell<ExecutionSession>,
    _pinned: PhantomPinned,
}

impl Jit {
    /// Creates an engine for `target` that resolves host symbols from the
    /// whole process image.
    pub fn new(target: TargetDescriptor) -> Pin<Box<Jit>> {
        Self::with_config(target, &JitConfig::default())
    }

    /// Creates an engine applying the host resolution policy of `config`.
    ///
    /// Code generation flags are fixed by `target`; build it with
    /// [`TargetDescriptor::host`] to apply those from the same config.
    pub fn with_config(target: TargetDescriptor, config: &JitConfig) -> Pin<Box<Jit>> {
        let layout = *target.data_layout();
        let mut host = HostProcessResolver::new(layout);
        if config.host.search_process {
            match ProcessSymbols::with_policy(config.host.clone()) {
                Ok(process) => host.set_fallback(process),
                Err(error) => warn!(
                    event = "process_symbols_unavailable",
                    error = %error,
                ),
            }
        }

        info!(
            event = "engine_created",
            triple = %target.triple(),
            data_layout = %layout,
            process_symbols = host.has_fallback(),
        );

        Box::pin(Jit {
            compiler: CompileLayer::new(target.clone()),
            linker: ObjectLinkingLayer::new(layout),
            session: RefCell::new(ExecutionSession::new(host)),
            target,
            _pinned: PhantomPinned,
        })
    }

    /// Compiles and links `module`, built against `context`, into a fresh
    /// namespace.
    ///
    /// Ownership of both moves into the engine. On success every symbol
    /// the module defines is resolvable; on failure none is.
    pub fn submit_module(&self, mut module: Module, context: Context) -> Result<NamespaceId> {
        if module.context_id() != context.id() {
            return Err(JitError::compile(
                module.name(),
                "module was built against a different context",
            ));
        }
        self.apply_data_layout(&mut module)?;

        info!(
            event = "module_submitted",
            module = module.name(),
            functions = module.functions().len(),
            data = module.data().len(),
            imports = module.imports().len(),
        );

        let mut session = self.session.borrow_mut();
        let id = session.create_namespace(module.name());
        session.add_module(id, module, context, &self.compiler, &self.linker)?;
        Ok(id)
    }

    /// Makes `module`'s data layout equal to the target's.
    ///
    /// An unset layout, or one differing only in mangling and alignments, is
    /// replaced. A layout with a different byte order or pointer width is a
    /// [`JitError::DataLayoutMismatch`]. Applying it twice changes nothing.
    pub fn apply_data_layout(&self, module: &mut Module) -> Result<()> {
        let target = self.target.data_layout();
        match module.data_layout() {
            Some(layout) if layout == target => Ok(()),
            Some(layout) if !layout.is_reconcilable_with(target) => {
                Err(JitError::DataLayoutMismatch {
                    module: module.name().to_string(),
                    module_layout: layout.to_string(),
                    target_layout: target.to_string(),
                })
            }
            _ => {
                module.set_data_layout(*target);
                Ok(())
            }
        }
    }

    /// Resolves a logical name to its address.
    ///
    /// Exported symbols of submitted modules are searched in submission
    /// order, then the host.
    pub fn lookup(&self, name: &str) -> Result<ResolvedSymbol> {
        let mangled = self.mangle(name);
        let session = self.session.borrow();
        if let Resolution::Resolved(symbol) = session.resolve(&mangled) {
            return Ok(symbol);
        }
        match session.host().resolve(&mangled) {
            Some(address) => Ok(ResolvedSymbol {
                name: mangled,
                address,
                kind: None,
                namespace: None,
            }),
            None => Err(JitError::LookupMiss(name.to_string())),
        }
    }

    /// Looks `name` up and views it as a function of type `F`.
    ///
    /// Two calls for the same name return the same address.
    ///
    /// # Safety
    ///
    /// `F` must match the signature the function was compiled with. Calling
    /// through a mismatched type is undefined behaviour. The pointer behind
    /// the returned handle must not be called after the engine is dropped.
    pub unsafe fn get_function<F: NativeFunction>(&self, name: &str) -> Result<Callable<'_, F>> {
        let symbol = self.lookup(name)?;
        Ok(unsafe { Callable::new(symbol.address) })
    }

    /// The link-time name of `name` on this target.
    pub fn mangle(&self, name: &str) -> String {
        mangle(name, self.data_layout())
    }

    pub fn data_layout(&self) -> &DataLayout {
        self.target.data_layout()
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Appends a host definition generator, consulted after those already
    /// added and before the process image. Affects modules submitted
    /// afterwards.
    pub fn add_host_generator(&self, generator: impl DefinitionGenerator + 'static) {
        self.session
            .borrow_mut()
            .host_mut()
            .add_generator(generator);
    }

    /// Read-only view of the session.
    pub fn session(&self) -> Ref<'_, ExecutionSession> {
        self.session.borrow()
    }
}

impl fmt::Debug for Jit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jit")
            .field("target", &self.target)
            .field("namespaces", &self.session.borrow().namespaces().len())
            .finish()
    }
}
