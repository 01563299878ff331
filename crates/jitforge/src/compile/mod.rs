//! The compile layer: IR modules to relocatable objects.
//!
//! Each function is lowered with `cranelift-frontend` and compiled on its own
//! with the target ISA. The machine code is appended to the object's text
//! section and every Cranelift relocation is rewritten to name its target by
//! mangled symbol, so the linking layer never sees Cranelift entity numbers.

mod lower;

use std::collections::HashSet;

use cranelift_codegen::binemit::Reloc;
use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir::{self, ExternalName, LibCall, UserFuncName};
use cranelift_codegen::{Context as CodegenContext, FinalizedMachReloc, FinalizedRelocTarget};
use jitforge_core::{is_valid_symbol_name, mangle, JitError, Result};
use jitforge_ir::{Context, Linkage, Module, Symbol};
use tracing::debug;

use crate::object::{ObjectFile, ObjectSymbol, RelocTarget, Relocation, SectionKind, SymbolKind};
use crate::target::TargetDescriptor;

/// Minimum alignment of every function in the text section.
const MIN_FUNCTION_ALIGN: usize = 16;

type LibcallNames = Box<dyn Fn(LibCall) -> String + Send + Sync>;

/// Turns IR modules into [`ObjectFile`]s for one target.
pub struct CompileLayer {
    target: TargetDescriptor,
    libcall_names: LibcallNames,
}

impl CompileLayer {
    pub fn new(target: TargetDescriptor) -> Self {
        Self {
            target,
            libcall_names: cranelift_module::default_libcall_names(),
        }
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Compiles `module`, whose symbols are interned in `context`.
    ///
    /// The module's data layout must already match the target's; the engine
    /// normalizes it before calling this.
    pub fn compile(&self, module: &Module, context: &Context) -> Result<ObjectFile> {
        if module.context_id() != context.id() {
            return Err(JitError::compile(
                module.name(),
                "module was built against a different context",
            ));
        }
        self.validate(module, context)?;

        let layout = self.target.data_layout();
        let function_align = (self.target.isa().function_alignment().preferred as usize)
            .max(MIN_FUNCTION_ALIGN);
        let mut object = ObjectFile::new(module.name());

        for function in module.functions() {
            let name = symbol_name(module, context, function.symbol)?;
            let signature = lower::clif_signature(&function.signature, &self.target);
            let func = ir::Function::with_name_signature(
                UserFuncName::user(0, function.symbol.index()),
                signature,
            );
            let mut codegen = CodegenContext::for_function(func);
            lower::lower_function(
                &mut codegen.func,
                module,
                context,
                function,
                name,
                &self.target,
            )?;

            let (code, relocs) = {
                let compiled = codegen
                    .compile(self.target.isa(), &mut ControlPlane::default())
                    .map_err(|e| {
                        JitError::compile(name, format!("code generation failed: {}", e.inner))
                    })?;
                (
                    compiled.code_buffer().to_vec(),
                    compiled.buffer.relocs().to_vec(),
                )
            };

            let offset = object
                .section_mut(SectionKind::Text)
                .append(&code, function_align);
            for reloc in &relocs {
                let relocation = self.convert_reloc(reloc, offset, &codegen.func, context)?;
                object.relocations.push(relocation);
            }
            object.symbols.push(ObjectSymbol {
                name: mangle(name, layout),
                kind: SymbolKind::Function,
                section: SectionKind::Text,
                offset,
                size: code.len(),
                exported: function.linkage == Linkage::Export,
            });

            debug!(
                event = "function_compiled",
                module = module.name(),
                function = name,
                code_bytes = code.len(),
                relocations = relocs.len(),
            );
        }

        for data in module.data() {
            let name = symbol_name(module, context, data.symbol)?;
            if data.bytes.is_empty() {
                return Err(JitError::compile(name, "empty data definition"));
            }
            if !data.align.is_power_of_two() {
                return Err(JitError::compile(
                    name,
                    format!("data alignment {} is not a power of two", data.align),
                ));
            }
            let section = if data.writable {
                SectionKind::ReadWriteData
            } else {
                SectionKind::ReadOnlyData
            };
            let offset = object
                .section_mut(section)
                .append(&data.bytes, data.align as usize);
            object.symbols.push(ObjectSymbol {
                name: mangle(name, layout),
                kind: SymbolKind::Data,
                section,
                offset,
                size: data.bytes.len(),
                exported: data.linkage == Linkage::Export,
            });
        }

        Ok(object)
    }

    /// Checks every defined and imported symbol has a valid name in
    /// `context` and that no symbol is defined twice.
    fn validate(&self, module: &Module, context: &Context) -> Result<()> {
        let mut defined = HashSet::new();
        for (symbol, _) in module.definitions() {
            let name = symbol_name(module, context, symbol)?;
            if !defined.insert(symbol) {
                return Err(JitError::DuplicateDefinition {
                    symbol: name.to_string(),
                    namespace: module.name().to_string(),
                });
            }
        }
        for import in module.imports() {
            symbol_name(module, context, import.symbol)?;
        }
        Ok(())
    }

    fn convert_reloc(
        &self,
        reloc: &FinalizedMachReloc,
        function_offset: usize,
        func: &ir::Function,
        context: &Context,
    ) -> Result<Relocation> {
        let layout = self.target.data_layout();
        let target = match &reloc.target {
            FinalizedRelocTarget::ExternalName(ExternalName::User(name_ref)) => {
                let user = &func.params.user_named_funcs()[*name_ref];
                let symbol = Symbol::from_index(user.index);
                let name = context
                    .name(symbol)
                    .ok_or_else(|| reloc_failure(&reloc.kind, "symbol not in context"))?;
                RelocTarget::Symbol(mangle(name, layout))
            }
            FinalizedRelocTarget::ExternalName(ExternalName::LibCall(libcall)) => {
                RelocTarget::Symbol(mangle(&(self.libcall_names)(*libcall), layout))
            }
            FinalizedRelocTarget::ExternalName(other) => {
                return Err(JitError::RelocationFailure {
                    symbol: format!("{other:?}"),
                    kind: reloc.kind.to_string(),
                    reason: "unsupported relocation target".to_string(),
                })
            }
            FinalizedRelocTarget::Func(offset) => {
                RelocTarget::Section(SectionKind::Text, function_offset + *offset as usize)
            }
        };
        Ok(Relocation {
            section: SectionKind::Text,
            offset: function_offset + reloc.offset as usize,
            kind: reloc.kind,
            target,
            addend: reloc.addend,
        })
    }
}

/// The logical name of `symbol`, checked for validity.
fn symbol_name<'c>(module: &Module, context: &'c Context, symbol: Symbol) -> Result<&'c str> {
    let name = context.name(symbol).ok_or_else(|| {
        JitError::compile(
            module.name(),
            format!(
                "symbol #{} does not belong to the module's context",
                symbol.index()
            ),
        )
    })?;
    if !is_valid_symbol_name(name) {
        return Err(JitError::compile(name, "invalid symbol name"));
    }
    Ok(name)
}

fn reloc_failure(kind: &Reloc, reason: &str) -> JitError {
    JitError::RelocationFailure {
        symbol: String::new(),
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests;
