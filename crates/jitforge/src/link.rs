//! The object linking layer: objects to executable memory.
//!
//! Linking an [`ObjectFile`] takes five steps: reserve memory for its
//! sections, copy the sections in, resolve every undefined symbol, apply the
//! relocations and finalize page protections. A failure at any step drops the
//! memory manager, so no partially linked code survives.

use std::collections::HashMap;
use std::fmt;

use cranelift_codegen::binemit::Reloc;
use jitforge_core::{demangle, DataLayout, JitError, Result};
use tracing::{debug, trace};

use crate::memory::{MemoryManager, MemoryManagerFactory, MmapMemoryManagerFactory};
use crate::object::{ObjectFile, RelocTarget, Relocation, SectionKind, SymbolKind};

/// Source of addresses for the symbols an object does not define.
///
/// Receives mangled names.
pub trait SymbolResolver {
    fn resolve(&self, name: &str) -> Option<usize>;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Option<usize>,
{
    fn resolve(&self, name: &str) -> Option<usize> {
        self(name)
    }
}

/// A symbol of a linked object with its final address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSymbol {
    pub name: String,
    pub address: usize,
    pub kind: SymbolKind,
    pub exported: bool,
}

/// A linked object: its memory plus the address of every symbol it defines.
///
/// The memory stays mapped for as long as this value lives.
pub struct LinkedObject {
    memory: Box<dyn MemoryManager>,
    symbols: Vec<LinkedSymbol>,
}

impl LinkedObject {
    pub fn symbols(&self) -> &[LinkedSymbol] {
        &self.symbols
    }

    pub fn symbol(&self, name: &str) -> Option<&LinkedSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory.allocated_bytes()
    }
}

impl fmt::Debug for LinkedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedObject")
            .field("symbols", &self.symbols)
            .field("memory_bytes", &self.memory_bytes())
            .finish()
    }
}

/// Links objects into memory obtained from a [`MemoryManagerFactory`].
pub struct ObjectLinkingLayer {
    factory: Box<dyn MemoryManagerFactory>,
    layout: DataLayout,
}

impl ObjectLinkingLayer {
    /// Creates a layer using anonymous page mappings.
    pub fn new(layout: DataLayout) -> Self {
        Self::with_factory(layout, MmapMemoryManagerFactory)
    }

    pub fn with_factory(layout: DataLayout, factory: impl MemoryManagerFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            layout,
        }
    }

    /// Links `object`, resolving its undefined symbols through `resolver`.
    ///
    /// Symbols the object defines itself always win over the resolver.
    pub fn link(&self, object: &ObjectFile, resolver: &dyn SymbolResolver) -> Result<LinkedObject> {
        let mut memory = self.factory.create();
        memory.reserve(&object.sizes())?;

        let mut bases = [0usize; 3];
        for section in object.sections().filter(|s| !s.is_empty()) {
            let ptr = memory.allocate(section.kind, section.bytes.len(), section.align)?;
            // SAFETY: the allocation is writable and `bytes.len()` long.
            unsafe {
                std::ptr::copy_nonoverlapping(section.bytes.as_ptr(), ptr, section.bytes.len());
            }
            bases[section.kind.index()] = ptr as usize;
        }

        let symbols: Vec<LinkedSymbol> = object
            .symbols
            .iter()
            .map(|s| LinkedSymbol {
                name: s.name.clone(),
                address: bases[s.section.index()] + s.offset,
                kind: s.kind,
                exported: s.exported,
            })
            .collect();

        let mut external = HashMap::new();
        for name in object.undefined_symbols() {
            let address = resolver.resolve(name).ok_or_else(|| {
                JitError::UnresolvedSymbol(demangle(name, &self.layout).unwrap_or(name).to_string())
            })?;
            debug!(
                event = "symbol_resolved",
                module = %object.name,
                symbol = name,
                address,
            );
            external.insert(name, address);
        }

        for reloc in &object.relocations {
            let target = match &reloc.target {
                RelocTarget::Symbol(name) => match symbols.iter().find(|s| &s.name == name) {
                    Some(symbol) => symbol.address,
                    None => external
                        .get(name.as_str())
                        .copied()
                        .ok_or_else(|| failure(reloc, "target was never resolved"))?,
                },
                RelocTarget::Section(kind, offset) => bases[kind.index()] + offset,
            };
            let section_len = object.section(reloc.section).bytes.len();
            let at = bases[reloc.section.index()] + reloc.offset;
            if reloc.offset + reloc_width(reloc.kind) > section_len {
                return Err(failure(reloc, "offset outside its section"));
            }
            // SAFETY: `at` lies inside a writable allocation (checked above).
            unsafe { apply_relocation(reloc.kind, at as *mut u8, target, reloc.addend) }
                .map_err(|reason| failure(reloc, reason))?;
            trace!(
                event = "relocation_applied",
                kind = %reloc.kind,
                at,
                target,
            );
        }

        memory.finalize()?;

        Ok(LinkedObject { memory, symbols })
    }
}

fn failure(reloc: &Relocation, reason: &str) -> JitError {
    let symbol = match &reloc.target {
        RelocTarget::Symbol(name) => name.clone(),
        RelocTarget::Section(kind, offset) => format!("{kind:?}+{offset:#x}"),
    };
    JitError::RelocationFailure {
        symbol,
        kind: reloc.kind.to_string(),
        reason: reason.to_string(),
    }
}

/// Number of bytes a relocation of `kind` patches.
fn reloc_width(kind: Reloc) -> usize {
    match kind {
        Reloc::Abs8 => 8,
        _ => 4,
    }
}

/// Writes the value of a relocation of `kind` at `at`.
///
/// # Safety
///
/// `at` must be valid for reads and writes of [`reloc_width`] bytes.
pub(crate) unsafe fn apply_relocation(
    kind: Reloc,
    at: *mut u8,
    target: usize,
    addend: i64,
) -> std::result::Result<(), &'static str> {
    let value = (target as i64).wrapping_add(addend);
    match kind {
        Reloc::Abs4 => {
            let value = u32::try_from(value).map_err(|_| "address does not fit in 32 bits")?;
            unsafe { std::ptr::write_unaligned(at as *mut u32, value) };
        }
        Reloc::Abs8 => {
            unsafe { std::ptr::write_unaligned(at as *mut u64, value as u64) };
        }
        Reloc::X86PCRel4 | Reloc::X86CallPCRel4 | Reloc::X86CallPLTRel4 => {
            let delta = value.wrapping_sub(at as i64);
            let delta = i32::try_from(delta).map_err(|_| "displacement exceeds ±2GiB")?;
            unsafe { std::ptr::write_unaligned(at as *mut i32, delta) };
        }
        Reloc::Arm64Call => {
            let delta = value.wrapping_sub(at as i64);
            if delta % 4 != 0 {
                return Err("branch target is not 4-byte aligned");
            }
            if !(-(1 << 27)..(1 << 27)).contains(&delta) {
                return Err("branch displacement exceeds ±128MiB");
            }
            let imm26 = ((delta >> 2) as u32) & 0x03ff_ffff;
            unsafe {
                let insn = std::ptr::read_unaligned(at as *const u32);
                std::ptr::write_unaligned(at as *mut u32, (insn & 0xfc00_0000) | imm26);
            }
        }
        _ => return Err("unsupported relocation kind"),
    }
    Ok(())
}

#[cfg(test)]
mod tests;
