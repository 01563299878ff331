//! Tests for object images.

use super::*;

#[test]
fn test_section_append_aligns() {
    let mut section = Section::new(SectionKind::Text);
    assert_eq!(section.append(&[1, 2, 3], 1), 0);
    assert_eq!(section.append(&[4], 16), 16);
    assert_eq!(section.bytes.len(), 17);
    assert_eq!(section.align, 16);
    assert!(section.bytes[3..16].iter().all(|&b| b == 0));
}

#[test]
fn test_sizes_report_each_section() {
    let mut object = ObjectFile::new("m");
    object.section_mut(SectionKind::Text).append(&[0x90; 10], 16);
    object.section_mut(SectionKind::ReadWriteData).append(&[0; 4], 4);

    let sizes = object.sizes();
    assert_eq!(sizes.get(SectionKind::Text), (10, 16));
    assert_eq!(sizes.get(SectionKind::ReadOnlyData), (0, 1));
    assert_eq!(sizes.get(SectionKind::ReadWriteData), (4, 4));
}

#[test]
fn test_undefined_symbols_are_deduplicated() {
    let mut object = ObjectFile::new("m");
    object.symbols.push(ObjectSymbol {
        name: "local_fn".to_string(),
        kind: SymbolKind::Function,
        section: SectionKind::Text,
        offset: 0,
        size: 8,
        exported: true,
    });
    for target in ["host_alloc", "local_fn", "host_alloc", "ghost_fn"] {
        object.relocations.push(Relocation {
            section: SectionKind::Text,
            offset: 0,
            kind: Reloc::Abs8,
            target: RelocTarget::Symbol(target.to_string()),
            addend: 0,
        });
    }
    object.relocations.push(Relocation {
        section: SectionKind::Text,
        offset: 8,
        kind: Reloc::Abs8,
        target: RelocTarget::Section(SectionKind::ReadOnlyData, 0),
        addend: 0,
    });

    assert_eq!(object.undefined_symbols(), vec!["host_alloc", "ghost_fn"]);
}
