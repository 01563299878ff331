//! Typed views over resolved native code.

use std::fmt;
use std::marker::PhantomData;

use crate::engine::Jit;

mod sealed {
    pub trait Sealed {}
}

/// Native function pointer types a resolved address can be viewed as.
///
/// Implemented for `extern "C" fn` pointers of up to six arguments. Each
/// arity also gets a `call` method on [`Callable`].
pub trait NativeFunction: Copy + sealed::Sealed {
    /// Reinterprets `address` as a function pointer of this type.
    ///
    /// # Safety
    ///
    /// `address` must be the entry point of a function with exactly this
    /// signature and calling convention. The returned pointer must not be
    /// called once the memory holding that function is released.
    unsafe fn from_address(address: usize) -> Self;
}

macro_rules! native_function {
    ($($arg:ident $value:ident),*) => {
        impl<R, $($arg),*> sealed::Sealed for extern "C" fn($($arg),*) -> R {}

        impl<R, $($arg),*> NativeFunction for extern "C" fn($($arg),*) -> R {
            unsafe fn from_address(address: usize) -> Self {
                unsafe { std::mem::transmute_copy::<usize, Self>(&address) }
            }
        }

        impl<R, $($arg),*> Callable<'_, extern "C" fn($($arg),*) -> R> {
            /// Calls the function while the engine is borrowed.
            pub fn call(&self, $($value: $arg),*) -> R {
                (self.function)($($value),*)
            }
        }
    };
}

native_function!();
native_function!(A a);
native_function!(A a, B b);
native_function!(A a, B b, C c);
native_function!(A a, B b, C c, D d);
native_function!(A a, B b, C c, D d, E e);
native_function!(A a, B b, C c, D d, E e, G g);

/// A compiled function, typed as `F`.
///
/// Borrows the engine that owns the code. Calls made through
/// [`Callable::call`] can therefore never reach unmapped memory; the raw
/// pointer from [`Callable::get`] carries no such guarantee.
pub struct Callable<'jit, F> {
    function: F,
    address: usize,
    _engine: PhantomData<&'jit Jit>,
}

impl<F: NativeFunction> Callable<'_, F> {
    /// # Safety
    ///
    /// Same contract as [`NativeFunction::from_address`].
    pub(crate) unsafe fn new(address: usize) -> Self {
        Self {
            function: unsafe { F::from_address(address) },
            address,
            _engine: PhantomData,
        }
    }

    /// The raw function pointer.
    ///
    /// # Safety
    ///
    /// The pointer is `'static` as far as the borrow checker is concerned,
    /// but the code behind it is unmapped when the engine is dropped. It must
    /// not be called after that.
    pub unsafe fn get(&self) -> F {
        self.function
    }

    pub fn address(&self) -> usize {
        self.address
    }
}

impl<F> fmt::Debug for Callable<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("address", &format_args!("{:#x}", self.address))
            .field("type", &std::any::type_name::<F>())
            .finish()
    }
}
