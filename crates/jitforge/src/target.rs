//! Target descriptors: the native ISA plus the data layout derived from it.

use std::fmt;

use cranelift_codegen::ir;
use cranelift_codegen::isa::{CallConv, OwnedTargetIsa, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use jitforge_config::JitConfig;
use jitforge_core::{DataLayout, Endianness, JitError, ManglingMode, Result};

/// Instruction set, ABI and memory layout of the code the engine emits.
///
/// Cloning shares the underlying ISA.
#[derive(Clone)]
pub struct TargetDescriptor {
    isa: OwnedTargetIsa,
    data_layout: DataLayout,
}

impl TargetDescriptor {
    /// Detects the host ISA and applies the code generation flags of `config`.
    pub fn host(config: &JitConfig) -> Result<Self> {
        let mut flag_builder = settings::builder();
        let verify = if config.verify_ir { "true" } else { "false" };
        for (name, value) in [
            ("use_colocated_libcalls", "false"),
            ("is_pic", "false"),
            ("opt_level", config.opt_level.as_setting()),
            ("enable_verifier", verify),
        ] {
            flag_builder.set(name, value).map_err(|e| {
                JitError::UnsupportedTarget(format!("setting {name}={value}: {e}"))
            })?;
        }

        let isa_builder = cranelift_native::builder()
            .map_err(|e| JitError::UnsupportedTarget(format!("host not supported: {e}")))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::UnsupportedTarget(format!("failed to build ISA: {e}")))?;
        Ok(Self::from_isa(isa))
    }

    /// Wraps an already configured ISA.
    pub fn from_isa(isa: OwnedTargetIsa) -> Self {
        let data_layout = layout_for(&*isa);
        Self { isa, data_layout }
    }

    pub fn isa(&self) -> &dyn TargetIsa {
        &*self.isa
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.data_layout
    }

    pub fn call_conv(&self) -> CallConv {
        self.isa.default_call_conv()
    }

    pub fn pointer_type(&self) -> ir::Type {
        self.isa.pointer_type()
    }

    pub fn triple(&self) -> String {
        self.isa.triple().to_string()
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("triple", &self.triple())
            .field("data_layout", &self.data_layout.to_string())
            .finish()
    }
}

fn layout_for(isa: &dyn TargetIsa) -> DataLayout {
    let endianness = match isa.endianness() {
        ir::Endianness::Little => Endianness::Little,
        ir::Endianness::Big => Endianness::Big,
    };
    let pointer_bits = u32::from(isa.pointer_bits());
    let triple = isa.triple().to_string();
    let mangling = if triple.contains("apple") || triple.contains("darwin") {
        ManglingMode::MachO
    } else if triple.contains("windows") {
        if pointer_bits == 32 {
            ManglingMode::WinCoffX86
        } else {
            ManglingMode::WinCoff
        }
    } else {
        ManglingMode::Elf
    };
    DataLayout::new(endianness, pointer_bits, mangling).with_stack_align(128)
}

#[cfg(test)]
mod tests;
