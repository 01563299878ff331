//! Data layouts: the target's rules for pointer width, byte order and
//! link-time symbol naming.
//!
//! The textual form follows the LLVM data-layout string convention for the
//! attributes modeled here:
//!
//! ```
//! use jitforge_core::{DataLayout, Endianness, ManglingMode};
//!
//! let layout: DataLayout = "e-m:o-p:64:64-S128".parse().unwrap();
//! assert_eq!(layout.endianness(), Endianness::Little);
//! assert_eq!(layout.mangling(), ManglingMode::MachO);
//! assert_eq!(layout.pointer_bits(), 64);
//! assert_eq!(layout.to_string(), "e-m:o-p:64:64-S128");
//! ```
//!
//! Specifications for attributes that are not modeled (integer, float and
//! vector alignments, native widths, address spaces) are accepted and ignored.

use std::fmt;
use std::str::FromStr;

/// Byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    Little,
    Big,
}

/// Object-format rule for turning a logical name into a link-time name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ManglingMode {
    /// ELF: names are used verbatim.
    Elf,
    /// Mach-O: global names get a leading underscore.
    MachO,
    /// 64-bit Windows COFF: names are used verbatim.
    WinCoff,
    /// 32-bit Windows COFF: global names get a leading underscore.
    WinCoffX86,
}

impl ManglingMode {
    /// The prefix prepended to every global symbol, if any.
    pub fn global_prefix(self) -> Option<char> {
        match self {
            ManglingMode::Elf | ManglingMode::WinCoff => None,
            ManglingMode::MachO | ManglingMode::WinCoffX86 => Some('_'),
        }
    }

    fn code(self) -> char {
        match self {
            ManglingMode::Elf => 'e',
            ManglingMode::MachO => 'o',
            ManglingMode::WinCoff => 'w',
            ManglingMode::WinCoffX86 => 'x',
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "e" => Some(ManglingMode::Elf),
            "o" => Some(ManglingMode::MachO),
            "w" => Some(ManglingMode::WinCoff),
            "x" => Some(ManglingMode::WinCoffX86),
            _ => None,
        }
    }
}

/// Memory layout rules of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataLayout {
    endianness: Endianness,
    mangling: ManglingMode,
    pointer_bits: u32,
    pointer_align_bits: u32,
    stack_align_bits: Option<u32>,
}

impl DataLayout {
    /// Creates a layout whose pointers are aligned to their own width.
    pub fn new(endianness: Endianness, pointer_bits: u32, mangling: ManglingMode) -> Self {
        Self {
            endianness,
            mangling,
            pointer_bits,
            pointer_align_bits: pointer_bits,
            stack_align_bits: None,
        }
    }

    /// Sets the pointer ABI alignment in bits.
    pub fn with_pointer_align(mut self, bits: u32) -> Self {
        self.pointer_align_bits = bits;
        self
    }

    /// Sets the natural stack alignment in bits.
    pub fn with_stack_align(mut self, bits: u32) -> Self {
        self.stack_align_bits = Some(bits);
        self
    }

    /// Sets the mangling mode.
    pub fn with_mangling(mut self, mangling: ManglingMode) -> Self {
        self.mangling = mangling;
        self
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn mangling(&self) -> ManglingMode {
        self.mangling
    }

    pub fn pointer_bits(&self) -> u32 {
        self.pointer_bits
    }

    pub fn pointer_bytes(&self) -> u32 {
        self.pointer_bits / 8
    }

    pub fn pointer_align_bits(&self) -> u32 {
        self.pointer_align_bits
    }

    pub fn stack_align_bits(&self) -> Option<u32> {
        self.stack_align_bits
    }

    /// Returns true if a module laid out as `self` can be rewritten to `target`.
    ///
    /// Byte order and pointer width are baked into explicit IR offsets, so
    /// those must agree. Mangling and alignments are link-time properties the
    /// rewrite can adopt.
    pub fn is_reconcilable_with(&self, target: &DataLayout) -> bool {
        self.endianness == target.endianness && self.pointer_bits == target.pointer_bits
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.endianness {
            Endianness::Little => 'e',
            Endianness::Big => 'E',
        };
        write!(
            f,
            "{}-m:{}-p:{}:{}",
            order,
            self.mangling.code(),
            self.pointer_bits,
            self.pointer_align_bits
        )?;
        if let Some(stack) = self.stack_align_bits {
            write!(f, "-S{}", stack)?;
        }
        Ok(())
    }
}

/// Error when parsing a data layout string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutParseError {
    pub message: String,
}

impl LayoutParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for LayoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data layout parse error: {}", self.message)
    }
}

impl std::error::Error for LayoutParseError {}

fn parse_bits(spec: &str, value: &str) -> Result<u32, LayoutParseError> {
    let bits: u32 = value
        .parse()
        .map_err(|_| LayoutParseError::new(format!("invalid size `{value}` in `{spec}`")))?;
    if bits == 0 || bits % 8 != 0 {
        return Err(LayoutParseError::new(format!(
            "size `{value}` in `{spec}` is not a positive multiple of 8"
        )));
    }
    Ok(bits)
}

impl FromStr for DataLayout {
    type Err = LayoutParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Unspecified attributes take LLVM's defaults.
        let mut layout = DataLayout::new(Endianness::Little, 64, ManglingMode::Elf);
        let mut pointer_align = None;

        for spec in s.split('-').filter(|spec| !spec.is_empty()) {
            match spec {
                "e" => layout.endianness = Endianness::Little,
                "E" => layout.endianness = Endianness::Big,
                _ if spec.starts_with("m:") => {
                    layout.mangling = ManglingMode::from_code(&spec[2..]).ok_or_else(|| {
                        LayoutParseError::new(format!("unknown mangling mode in `{spec}`"))
                    })?;
                }
                _ if spec.starts_with("p:") || spec.starts_with("p0:") => {
                    let mut parts = spec.split(':').skip(1);
                    let size = parts
                        .next()
                        .ok_or_else(|| LayoutParseError::new(format!("missing size in `{spec}`")))?;
                    layout.pointer_bits = parse_bits(spec, size)?;
                    if let Some(align) = parts.next() {
                        pointer_align = Some(parse_bits(spec, align)?);
                    }
                }
                _ if spec.starts_with('S') => {
                    layout.stack_align_bits = Some(parse_bits(spec, &spec[1..])?);
                }
                _ => match spec.chars().next() {
                    Some('i' | 'f' | 'v' | 'a' | 'n' | 'A' | 'P' | 'G' | 'F' | 'p') => {}
                    _ => {
                        return Err(LayoutParseError::new(format!(
                            "unknown specification `{spec}`"
                        )))
                    }
                },
            }
        }

        layout.pointer_align_bits = pointer_align.unwrap_or(layout.pointer_bits);
        Ok(layout)
    }
}
