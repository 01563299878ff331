//! Relocatable object images produced by the compile layer.
//!
//! An [`ObjectFile`] holds three sections (code, read-only data, read-write
//! data), the symbols defined in them and the relocations still to be
//! applied. Symbol names are already mangled.

use cranelift_codegen::binemit::Reloc;

/// Kind of a section, which also fixes its final memory protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// Machine code; read + execute once finalized.
    Text,
    /// Constants; read-only once finalized.
    ReadOnlyData,
    /// Mutable globals; stays read + write.
    ReadWriteData,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [
        SectionKind::Text,
        SectionKind::ReadOnlyData,
        SectionKind::ReadWriteData,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            SectionKind::Text => 0,
            SectionKind::ReadOnlyData => 1,
            SectionKind::ReadWriteData => 2,
        }
    }
}

/// Contents and alignment of one section.
#[derive(Debug, Clone)]
pub struct Section {
    pub kind: SectionKind,
    pub bytes: Vec<u8>,
    pub align: usize,
}

impl Section {
    fn new(kind: SectionKind) -> Self {
        Self {
            kind,
            bytes: Vec::new(),
            align: 1,
        }
    }

    /// Appends `bytes` at the next offset aligned to `align`; returns that offset.
    pub fn append(&mut self, bytes: &[u8], align: usize) -> usize {
        let align = align.max(1);
        let offset = self.bytes.len().next_multiple_of(align);
        self.bytes.resize(offset, 0);
        self.bytes.extend_from_slice(bytes);
        self.align = self.align.max(align);
        offset
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Data,
}

/// A symbol defined by the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub section: SectionKind,
    pub offset: usize,
    pub size: usize,
    /// Whether the symbol is visible outside its module.
    pub exported: bool,
}

/// What a relocation points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocTarget {
    /// A named symbol, defined in this object or elsewhere.
    Symbol(String),
    /// An offset into one of this object's own sections.
    Section(SectionKind, usize),
}

/// A deferred address fix-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub section: SectionKind,
    pub offset: usize,
    pub kind: Reloc,
    pub target: RelocTarget,
    pub addend: i64,
}

/// Sizes and alignments of the three sections, handed to the memory manager
/// before anything is allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionSizes {
    pub text: (usize, usize),
    pub read_only: (usize, usize),
    pub read_write: (usize, usize),
}

impl SectionSizes {
    /// `(size, align)` of the section of the given kind.
    pub fn get(&self, kind: SectionKind) -> (usize, usize) {
        match kind {
            SectionKind::Text => self.text,
            SectionKind::ReadOnlyData => self.read_only,
            SectionKind::ReadWriteData => self.read_write,
        }
    }
}

/// A compiled, not yet linked module.
#[derive(Debug, Clone)]
pub struct ObjectFile {
    pub name: String,
    sections: [Section; 3],
    pub symbols: Vec<ObjectSymbol>,
    pub relocations: Vec<Relocation>,
}

impl ObjectFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: SectionKind::ALL.map(Section::new),
            symbols: Vec::new(),
            relocations: Vec::new(),
        }
    }

    pub fn section(&self, kind: SectionKind) -> &Section {
        &self.sections[kind.index()]
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        &mut self.sections[kind.index()]
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn sizes(&self) -> SectionSizes {
        let entry = |kind: SectionKind| {
            let section = self.section(kind);
            (section.bytes.len(), section.align)
        };
        SectionSizes {
            text: entry(SectionKind::Text),
            read_only: entry(SectionKind::ReadOnlyData),
            read_write: entry(SectionKind::ReadWriteData),
        }
    }

    pub fn symbol(&self, name: &str) -> Option<&ObjectSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Names referenced by relocations but not defined here, in order of
    /// first reference and without duplicates.
    pub fn undefined_symbols(&self) -> Vec<&str> {
        let mut undefined: Vec<&str> = Vec::new();
        for reloc in &self.relocations {
            if let RelocTarget::Symbol(name) = &reloc.target {
                if self.symbol(name).is_none() && !undefined.contains(&name.as_str()) {
                    undefined.push(name);
                }
            }
        }
        undefined
    }
}

#[cfg(test)]
mod tests;
