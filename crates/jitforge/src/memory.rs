//! Memory managers: where linked sections live.
//!
//! The linking layer asks a [`MemoryManagerFactory`] for one fresh
//! [`MemoryManager`] per object. The manager reserves space for all three
//! section kinds up front, hands out writable blocks while the object is
//! copied in and relocated, and switches every block to its final protection
//! in [`MemoryManager::finalize`]. Dropping the manager releases the memory.

use std::ptr::NonNull;

use jitforge_core::{JitError, Result};
use tracing::debug;

use crate::object::{SectionKind, SectionSizes};

/// Owner of the memory backing one linked object.
pub trait MemoryManager {
    /// Reserves space for the given section sizes. Called once, before any
    /// allocation.
    fn reserve(&mut self, sizes: &SectionSizes) -> Result<()>;

    /// Returns a writable block of `size` bytes aligned to `align`, carved
    /// from the space reserved for `kind`.
    fn allocate(&mut self, kind: SectionKind, size: usize, align: usize) -> Result<*mut u8>;

    /// Applies final protections: text read + execute, read-only data read
    /// only, read-write data unchanged. No allocation is allowed afterwards.
    fn finalize(&mut self) -> Result<()>;

    /// Bytes currently held from the operating system.
    fn allocated_bytes(&self) -> usize;
}

/// Creates one [`MemoryManager`] per linking request.
pub trait MemoryManagerFactory {
    fn create(&self) -> Box<dyn MemoryManager>;
}

impl<F> MemoryManagerFactory for F
where
    F: Fn() -> Box<dyn MemoryManager>,
{
    fn create(&self) -> Box<dyn MemoryManager> {
        self()
    }
}

/// Factory for the default [`MmapMemoryManager`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapMemoryManagerFactory;

impl MemoryManagerFactory for MmapMemoryManagerFactory {
    fn create(&self) -> Box<dyn MemoryManager> {
        Box::new(MmapMemoryManager::new())
    }
}

// ---------------------------------------------------------------------------
// Platform layer
// ---------------------------------------------------------------------------

/// Page protection of a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadWrite,
    ReadOnly,
    ReadExecute,
}

impl Protection {
    /// Final protection of a section of the given kind.
    pub fn for_section(kind: SectionKind) -> Self {
        match kind {
            SectionKind::Text => Protection::ReadExecute,
            SectionKind::ReadOnlyData => Protection::ReadOnly,
            SectionKind::ReadWriteData => Protection::ReadWrite,
        }
    }
}

#[cfg(unix)]
mod platform {
    use std::ptr;

    use super::Protection;

    pub fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    }

    /// Maps `len` bytes of zeroed read-write memory.
    pub unsafe fn map(len: usize) -> Option<*mut u8> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            None
        } else {
            Some(ptr as *mut u8)
        }
    }

    pub unsafe fn unmap(ptr: *mut u8, len: usize) {
        unsafe {
            libc::munmap(ptr as *mut _, len);
        }
    }

    pub unsafe fn protect(ptr: *mut u8, len: usize, protection: Protection) -> bool {
        let prot = match protection {
            Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            Protection::ReadOnly => libc::PROT_READ,
            Protection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
        };
        unsafe { libc::mprotect(ptr as *mut _, len, prot) == 0 }
    }

    #[cfg(all(target_arch = "aarch64", target_vendor = "apple"))]
    pub unsafe fn flush_icache(ptr: *mut u8, len: usize) {
        extern "C" {
            fn sys_icache_invalidate(start: *mut libc::c_void, len: usize);
        }
        unsafe { sys_icache_invalidate(ptr as *mut _, len) }
    }

    #[cfg(all(target_arch = "aarch64", not(target_vendor = "apple")))]
    pub unsafe fn flush_icache(ptr: *mut u8, len: usize) {
        extern "C" {
            fn __clear_cache(start: *mut libc::c_char, end: *mut libc::c_char);
        }
        unsafe { __clear_cache(ptr as *mut _, ptr.add(len) as *mut _) }
    }

    #[cfg(not(target_arch = "aarch64"))]
    pub unsafe fn flush_icache(_ptr: *mut u8, _len: usize) {}
}

#[cfg(windows)]
mod platform {
    use std::ptr;

    use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_EXECUTE_READ, PAGE_READONLY, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    use super::Protection;

    pub fn page_size() -> usize {
        4096
    }

    /// Maps `len` bytes of zeroed read-write memory.
    pub unsafe fn map(len: usize) -> Option<*mut u8> {
        let ptr =
            unsafe { VirtualAlloc(ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        if ptr.is_null() {
            None
        } else {
            Some(ptr as *mut u8)
        }
    }

    pub unsafe fn unmap(ptr: *mut u8, _len: usize) {
        unsafe {
            VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
        }
    }

    pub unsafe fn protect(ptr: *mut u8, len: usize, protection: Protection) -> bool {
        let flags = match protection {
            Protection::ReadWrite => PAGE_READWRITE,
            Protection::ReadOnly => PAGE_READONLY,
            Protection::ReadExecute => PAGE_EXECUTE_READ,
        };
        let mut old = 0;
        unsafe { VirtualProtect(ptr as *const _, len, flags, &mut old) != 0 }
    }

    pub unsafe fn flush_icache(ptr: *mut u8, len: usize) {
        unsafe {
            FlushInstructionCache(GetCurrentProcess(), ptr as *const _, len);
        }
    }
}

// ---------------------------------------------------------------------------
// Default manager
// ---------------------------------------------------------------------------

/// One page-aligned mapping per section kind.
struct Region {
    base: NonNull<u8>,
    capacity: usize,
    used: usize,
}

/// Memory manager backed by anonymous page mappings.
///
/// Every mapping starts read-write; [`MemoryManager::finalize`] applies the
/// section's final [`Protection`]. Mappings are released on drop.
pub struct MmapMemoryManager {
    page_size: usize,
    regions: [Option<Region>; 3],
    finalized: bool,
}

impl MmapMemoryManager {
    pub fn new() -> Self {
        Self {
            page_size: platform::page_size(),
            regions: [None, None, None],
            finalized: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether [`MemoryManager::finalize`] has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Default for MmapMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for MmapMemoryManager {
    fn reserve(&mut self, sizes: &SectionSizes) -> Result<()> {
        for kind in SectionKind::ALL {
            let (size, align) = sizes.get(kind);
            if size == 0 {
                continue;
            }
            if align > self.page_size {
                return Err(JitError::Memory(format!(
                    "{kind:?} alignment {align} exceeds the page size {}",
                    self.page_size
                )));
            }
            if self.regions[kind.index()].is_some() {
                return Err(JitError::Memory(format!("{kind:?} space already reserved")));
            }
            let capacity = size.next_multiple_of(self.page_size);
            // SAFETY: mapping fresh anonymous memory has no preconditions.
            let base = unsafe { platform::map(capacity) }
                .and_then(NonNull::new)
                .ok_or_else(|| {
                    JitError::Memory(format!("failed to map {capacity} bytes for {kind:?}"))
                })?;
            self.regions[kind.index()] = Some(Region {
                base,
                capacity,
                used: 0,
            });
        }
        Ok(())
    }

    fn allocate(&mut self, kind: SectionKind, size: usize, align: usize) -> Result<*mut u8> {
        if self.finalized {
            return Err(JitError::Memory(
                "allocation after finalization".to_string(),
            ));
        }
        let region = self.regions[kind.index()]
            .as_mut()
            .ok_or_else(|| JitError::Memory(format!("no space reserved for {kind:?}")))?;
        let start = region.used.next_multiple_of(align.max(1));
        if start + size > region.capacity {
            return Err(JitError::Memory(format!(
                "{kind:?} allocation of {size} bytes exceeds the reserved {} bytes",
                region.capacity
            )));
        }
        region.used = start + size;
        // SAFETY: start + size is within the mapping.
        Ok(unsafe { region.base.as_ptr().add(start) })
    }

    fn finalize(&mut self) -> Result<()> {
        for kind in SectionKind::ALL {
            let Some(region) = &self.regions[kind.index()] else {
                continue;
            };
            let protection = Protection::for_section(kind);
            // SAFETY: the region is a live mapping owned by this manager.
            unsafe {
                if kind == SectionKind::Text {
                    platform::flush_icache(region.base.as_ptr(), region.used);
                }
                if !platform::protect(region.base.as_ptr(), region.capacity, protection) {
                    return Err(JitError::Memory(format!(
                        "failed to make {kind:?} {protection:?}"
                    )));
                }
            }
            debug!(
                event = "memory_finalized",
                section = ?kind,
                protection = ?protection,
                bytes = region.capacity,
            );
        }
        self.finalized = true;
        Ok(())
    }

    fn allocated_bytes(&self) -> usize {
        self.regions
            .iter()
            .flatten()
            .map(|region| region.capacity)
            .sum()
    }
}

impl Drop for MmapMemoryManager {
    fn drop(&mut self) {
        for region in self.regions.iter_mut().filter_map(Option::take) {
            // SAFETY: the mapping was created by `platform::map` with this length.
            unsafe { platform::unmap(region.base.as_ptr(), region.capacity) }
        }
    }
}

#[cfg(test)]
mod tests;
