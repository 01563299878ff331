//! Tests for the object linking layer.

use std::cell::Cell;
use std::rc::Rc;

use jitforge_test::layouts::{elf64, macho64};

use super::*;
use crate::memory::MmapMemoryManager;
use crate::object::{ObjectSymbol, SectionSizes};

fn data_symbol(name: &str, section: SectionKind, offset: usize, size: usize) -> ObjectSymbol {
    ObjectSymbol {
        name: name.to_string(),
        kind: SymbolKind::Data,
        section,
        offset,
        size,
        exported: true,
    }
}

fn abs8(offset: usize, target: RelocTarget) -> Relocation {
    Relocation {
        section: SectionKind::ReadWriteData,
        offset,
        kind: Reloc::Abs8,
        target,
        addend: 0,
    }
}

/// An object with a pointer table in writable data whose entries point at
/// `target` and at the second word of its own read-only data.
fn pointer_table(target: &str) -> ObjectFile {
    let mut object = ObjectFile::new("pointers");
    object
        .section_mut(SectionKind::ReadOnlyData)
        .append(&[1, 0, 0, 0, 2, 0, 0, 0], 4);
    object
        .section_mut(SectionKind::ReadWriteData)
        .append(&[0; 16], 8);
    object
        .symbols
        .push(data_symbol("table", SectionKind::ReadWriteData, 0, 16));
    object
        .symbols
        .push(data_symbol("words", SectionKind::ReadOnlyData, 0, 8));
    object
        .relocations
        .push(abs8(0, RelocTarget::Symbol(target.to_string())));
    object
        .relocations
        .push(abs8(8, RelocTarget::Section(SectionKind::ReadOnlyData, 4)));
    object
}

fn resolver(f: impl Fn(&str) -> Option<usize>) -> impl Fn(&str) -> Option<usize> {
    f
}

fn read_table(linked: &LinkedObject) -> [usize; 2] {
    let table = linked.symbol("table").unwrap().address as *const usize;
    unsafe { [table.read(), table.add(1).read()] }
}

#[test]
fn test_link_resolves_external_and_section_targets() {
    let layer = ObjectLinkingLayer::new(elf64());
    let object = pointer_table("host_value");

    let linked = layer
        .link(&object, &resolver(|name| (name == "host_value").then_some(0x1000)))
        .unwrap();

    let words = linked.symbol("words").unwrap().address;
    assert_eq!(read_table(&linked), [0x1000, words + 4]);
    assert_eq!(unsafe { (words as *const u32).add(1).read() }, 2);
    assert!(linked.memory_bytes() > 0);
}

#[test]
fn test_own_definitions_win_over_resolver() {
    let layer = ObjectLinkingLayer::new(elf64());
    let object = pointer_table("words");
    let consulted = Cell::new(false);

    let linked = layer
        .link(&object, &resolver(|_| {
            consulted.set(true);
            Some(0xdead)
        }))
        .unwrap();

    let words = linked.symbol("words").unwrap().address;
    assert_eq!(read_table(&linked)[0], words);
    assert!(!consulted.get());
}

#[test]
fn test_unresolved_symbol_reports_logical_name() {
    let layer = ObjectLinkingLayer::new(macho64());
    let object = pointer_table("_ghost_fn");

    let err = layer.link(&object, &resolver(|_| None)).unwrap_err();
    assert_eq!(err, JitError::UnresolvedSymbol("ghost_fn".to_string()));
}

struct CountingManager {
    inner: MmapMemoryManager,
    drops: Rc<Cell<usize>>,
}

impl MemoryManager for CountingManager {
    fn reserve(&mut self, sizes: &SectionSizes) -> Result<()> {
        self.inner.reserve(sizes)
    }

    fn allocate(&mut self, kind: SectionKind, size: usize, align: usize) -> Result<*mut u8> {
        self.inner.allocate(kind, size, align)
    }

    fn finalize(&mut self) -> Result<()> {
        self.inner.finalize()
    }

    fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes()
    }
}

impl Drop for CountingManager {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

fn counting_layer(drops: &Rc<Cell<usize>>) -> ObjectLinkingLayer {
    let drops = drops.clone();
    ObjectLinkingLayer::with_factory(elf64(), move || {
        Box::new(CountingManager {
            inner: MmapMemoryManager::new(),
            drops: drops.clone(),
        }) as Box<dyn MemoryManager>
    })
}

#[test]
fn test_failed_link_releases_memory() {
    let drops = Rc::new(Cell::new(0));
    let layer = counting_layer(&drops);

    assert!(layer
        .link(&pointer_table("missing"), &resolver(|_| None))
        .is_err());
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_linked_object_owns_memory() {
    let drops = Rc::new(Cell::new(0));
    let layer = counting_layer(&drops);

    let linked = layer
        .link(&pointer_table("x"), &resolver(|_| Some(1)))
        .unwrap();
    assert_eq!(drops.get(), 0);
    drop(linked);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_relocation_outside_section() {
    let layer = ObjectLinkingLayer::new(elf64());
    let mut object = pointer_table("x");
    object
        .relocations
        .push(abs8(12, RelocTarget::Symbol("x".to_string())));

    let err = layer.link(&object, &resolver(|_| Some(1))).unwrap_err();
    assert!(matches!(err, JitError::RelocationFailure { .. }), "{err:?}");
}

// ---------------------------------------------------------------------------
// Relocation encodings
// ---------------------------------------------------------------------------

#[test]
fn test_pc_relative_displacement() {
    let mut buf = [0u8; 8];
    let at = buf.as_mut_ptr();
    unsafe { apply_relocation(Reloc::X86CallPCRel4, at, at as usize + 100, -4) }.unwrap();
    assert_eq!(i32::from_ne_bytes(buf[..4].try_into().unwrap()), 96);
}

#[test]
fn test_pc_relative_out_of_range() {
    let mut buf = [0u8; 8];
    let at = buf.as_mut_ptr();
    let far = (at as usize).wrapping_add(1 << 40);
    let result = unsafe { apply_relocation(Reloc::X86PCRel4, at, far, 0) };
    assert_eq!(result, Err("displacement exceeds ±2GiB"));
}

#[test]
fn test_abs4_requires_32_bit_address() {
    let mut buf = [0u8; 8];
    let at = buf.as_mut_ptr();
    let result = unsafe { apply_relocation(Reloc::Abs4, at, 1 << 40, 0) };
    assert!(result.is_err());

    unsafe { apply_relocation(Reloc::Abs4, at, 0x1234, 1) }.unwrap();
    assert_eq!(u32::from_ne_bytes(buf[..4].try_into().unwrap()), 0x1235);
}

#[test]
fn test_arm64_call_patches_imm26() {
    let mut buf = 0x9400_0000u32.to_ne_bytes();
    let at = buf.as_mut_ptr();
    unsafe { apply_relocation(Reloc::Arm64Call, at, at as usize + 8, 0) }.unwrap();
    assert_eq!(u32::from_ne_bytes(buf), 0x9400_0002);

    let mut buf = 0x9400_0000u32.to_ne_bytes();
    let at = buf.as_mut_ptr();
    unsafe { apply_relocation(Reloc::Arm64Call, at, (at as usize).wrapping_sub(4), 0) }.unwrap();
    assert_eq!(u32::from_ne_bytes(buf), 0x97ff_ffff);
}

#[test]
fn test_arm64_call_rejects_misaligned_target() {
    let mut buf = [0u8; 4];
    let at = buf.as_mut_ptr();
    let result = unsafe { apply_relocation(Reloc::Arm64Call, at, at as usize + 6, 0) };
    assert_eq!(result, Err("branch target is not 4-byte aligned"));
}

#[test]
fn test_unsupported_relocation_kind() {
    let mut buf = [0u8; 8];
    let at = buf.as_mut_ptr();
    let result = unsafe { apply_relocation(Reloc::Aarch64AdrGotPage21, at, 0, 0) };
    assert_eq!(result, Err("unsupported relocation kind"));
}
