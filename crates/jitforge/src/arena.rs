//! A caller-owned bump allocator that compiled code can call into.
//!
//! Compiled modules import [`ALLOC_SYMBOL`] with the C signature
//! `(arena: ptr, items: i32) -> ptr` and reach the arena itself through an
//! imported data symbol whose address is the arena. [`IntArena::symbols`]
//! builds a definition generator exporting both.
//!
//! ```
//! use jitforge::arena::{int_arena_alloc, IntArena};
//!
//! let arena = IntArena::new(4);
//! // SAFETY: `arena` is a live arena.
//! let block = unsafe { int_arena_alloc(&arena, 3) };
//! assert!(!block.is_null());
//! assert!(unsafe { int_arena_alloc(&arena, 2) }.is_null());
//! assert_eq!(arena.allocations(), 1);
//! ```

use std::cell::Cell;
use std::ptr::{self, NonNull};

use crate::resolver::AbsoluteSymbols;

/// Name under which [`int_arena_alloc`] is exported.
pub const ALLOC_SYMBOL: &str = "int_arena_alloc";

/// Fixed-capacity bump allocator of zero-initialized `i32` slots.
///
/// Blocks are never freed individually; all of them are released when the
/// arena is dropped.
pub struct IntArena {
    storage: NonNull<i32>,
    capacity: usize,
    used: Cell<usize>,
    allocations: Cell<usize>,
}

impl IntArena {
    pub fn new(capacity: usize) -> Self {
        let storage: Box<[i32]> = vec![0; capacity].into_boxed_slice();
        let storage = NonNull::from(Box::leak(storage)).cast::<i32>();
        Self {
            storage,
            capacity,
            used: Cell::new(0),
            allocations: Cell::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots handed out so far.
    pub fn used(&self) -> usize {
        self.used.get()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Number of successful allocations.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Hands out `items` consecutive slots, or `None` if the arena is
    /// exhausted.
    pub fn allocate(&self, items: usize) -> Option<NonNull<i32>> {
        let start = self.used.get();
        if items > self.capacity - start {
            return None;
        }
        self.used.set(start + items);
        self.allocations.set(self.allocations.get() + 1);
        // SAFETY: start <= capacity, so the result is in bounds or one past the end.
        Some(unsafe { NonNull::new_unchecked(self.storage.as_ptr().add(start)) })
    }

    /// Every slot handed out so far, in allocation order.
    pub fn contents(&self) -> &[i32] {
        // SAFETY: the first `used` slots are initialized and in bounds.
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr(), self.used.get()) }
    }

    /// Exports [`int_arena_alloc`] under [`ALLOC_SYMBOL`] and this arena's
    /// address under `data_name`.
    ///
    /// The arena must neither move nor be dropped while code linked against
    /// these symbols can still run.
    pub fn symbols(&self, data_name: &str) -> AbsoluteSymbols {
        AbsoluteSymbols::new()
            .with(ALLOC_SYMBOL, int_arena_alloc as usize)
            .with(data_name, self as *const IntArena as usize)
    }
}

impl Drop for IntArena {
    fn drop(&mut self) {
        let slice = ptr::slice_from_raw_parts_mut(self.storage.as_ptr(), self.capacity);
        // SAFETY: `storage` came from `Box::leak` of a slice of `capacity` elements.
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// Runtime helper called by compiled code: allocates `items` slots from
/// `arena`. Returns null when the arena is exhausted or `arena` is null.
///
/// # Safety
///
/// `arena` must be null or point to a live [`IntArena`], such as the
/// address exported by [`IntArena::symbols`].
pub unsafe extern "C" fn int_arena_alloc(arena: *const IntArena, items: u32) -> *mut i32 {
    // SAFETY: upheld by the caller.
    let Some(arena) = (unsafe { arena.as_ref() }) else {
        return ptr::null_mut();
    };
    arena
        .allocate(items as usize)
        .map_or(ptr::null_mut(), NonNull::as_ptr)
}
