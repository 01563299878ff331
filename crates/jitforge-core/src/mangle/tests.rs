//! Tests for symbol mangling.

use super::*;
use crate::layout::{Endianness, ManglingMode};

fn layout(mangling: ManglingMode) -> DataLayout {
    DataLayout::new(Endianness::Little, 64, mangling)
}

#[test]
fn test_valid_symbol_names() {
    assert!(is_valid_symbol_name("add_one"));
    assert!(is_valid_symbol_name("_start"));
    assert!(is_valid_symbol_name("llvm.memcpy"));
    assert!(is_valid_symbol_name("$tmp0"));
    assert!(!is_valid_symbol_name(""));
    assert!(!is_valid_symbol_name("1abc"));
    assert!(!is_valid_symbol_name("has space"));
    assert!(!is_valid_symbol_name("ümlaut"));
}

#[test]
fn test_mangle_is_deterministic() {
    let macho = layout(ManglingMode::MachO);
    assert_eq!(mangle("compute", &macho), mangle("compute", &macho));

    let elf = layout(ManglingMode::Elf);
    assert_eq!(mangle("compute", &elf), mangle("compute", &elf));
}

#[test]
fn test_mangle_differs_across_abis() {
    let elf = layout(ManglingMode::Elf);
    let macho = layout(ManglingMode::MachO);
    assert_ne!(mangle("compute", &elf), mangle("compute", &macho));
    assert_eq!(mangle("compute", &layout(ManglingMode::WinCoff)), "compute");
    assert_eq!(
        mangle("compute", &DataLayout::new(Endianness::Little, 32, ManglingMode::WinCoffX86)),
        "_compute"
    );
}

#[test]
fn test_demangle_inverts_mangle() {
    for mode in [
        ManglingMode::Elf,
        ManglingMode::MachO,
        ManglingMode::WinCoff,
        ManglingMode::WinCoffX86,
    ] {
        let l = layout(mode);
        assert_eq!(demangle(&mangle("host_alloc", &l), &l), Some("host_alloc"));
    }
}

#[test]
fn test_demangle_requires_prefix() {
    let macho = layout(ManglingMode::MachO);
    assert_eq!(demangle("host_alloc", &macho), None);
}
