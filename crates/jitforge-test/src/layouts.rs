//! Data layout fixtures.
//!
//! The engine's tests run on 64-bit little-endian hosts, so these layouts
//! are stated relative to that.

use jitforge_core::{DataLayout, Endianness, ManglingMode};

/// 64-bit little-endian ELF layout.
pub fn elf64() -> DataLayout {
    DataLayout::new(Endianness::Little, 64, ManglingMode::Elf).with_stack_align(128)
}

/// 64-bit little-endian Mach-O layout.
pub fn macho64() -> DataLayout {
    DataLayout::new(Endianness::Little, 64, ManglingMode::MachO).with_stack_align(128)
}

/// A layout that agrees with a 64-bit little-endian host on everything
/// but mangling and alignments.
pub fn reconcilable() -> DataLayout {
    DataLayout::new(Endianness::Little, 64, ManglingMode::WinCoffX86)
        .with_pointer_align(32)
        .with_stack_align(64)
}

/// A big-endian layout no little-endian host can adopt.
pub fn big_endian() -> DataLayout {
    DataLayout::new(Endianness::Big, 64, ManglingMode::Elf)
}

/// A 32-bit layout no 64-bit host can adopt.
pub fn pointer32() -> DataLayout {
    DataLayout::new(Endianness::Little, 32, ManglingMode::Elf)
}
