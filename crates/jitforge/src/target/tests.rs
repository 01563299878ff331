//! Tests for target descriptors.

use super::*;

#[test]
fn test_host_layout_matches_process() {
    let target = TargetDescriptor::host(&JitConfig::default()).unwrap();
    let layout = target.data_layout();

    assert_eq!(layout.pointer_bits(), usize::BITS);
    let native = if cfg!(target_endian = "little") {
        Endianness::Little
    } else {
        Endianness::Big
    };
    assert_eq!(layout.endianness(), native);
    assert_eq!(layout.stack_align_bits(), Some(128));
    assert_eq!(target.pointer_type().bits(), usize::BITS);
}

#[test]
fn test_host_mangling() {
    let target = TargetDescriptor::host(&JitConfig::default()).unwrap();
    let expected = if cfg!(target_vendor = "apple") {
        ManglingMode::MachO
    } else if cfg!(windows) {
        ManglingMode::WinCoff
    } else {
        ManglingMode::Elf
    };
    assert_eq!(target.data_layout().mangling(), expected);
}

#[test]
fn test_flags_follow_config() {
    let config = JitConfig::default()
        .with_opt_level(jitforge_config::OptLevel::None)
        .with_verify_ir(false);
    let target = TargetDescriptor::host(&config).unwrap();

    let flags = target.isa().flags();
    assert_eq!(flags.opt_level(), settings::OptLevel::None);
    assert!(!flags.enable_verifier());
    assert!(!flags.is_pic());
}

#[test]
fn test_clones_share_layout() {
    let target = TargetDescriptor::host(&JitConfig::default()).unwrap();
    let clone = target.clone();
    assert_eq!(clone.data_layout(), target.data_layout());
    assert_eq!(clone.triple(), target.triple());
}
