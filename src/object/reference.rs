//! Strong handle - one machine word, owns one unit of the object's count

use super::{Object, ObjectBox, ObjectHeader, Referent, TypeInfo, WeakReference};
use crate::errors::fatal;
use crate::ffi::{self, Token};
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// Owning alias of an intrusive object
///
/// Design:
/// - Clone increments, drop decrements, moves are free
/// - Null is a valid state; dereferencing it is a fatal error
/// - `Reference<dyn Object>` is the universal base handle, narrowed with `cast_to`
pub struct Reference<T: ?Sized + Referent> {
    ptr: Option<NonNull<ObjectHeader>>,
    _marker: PhantomData<T>,
}

// Tokens and anchors cross the foreign boundary as a single `void*`
const _: () = assert!(mem::size_of::<Reference<dyn Object>>() == mem::size_of::<*mut c_void>());

/// Allocate `value` as a new object, returning the first strong alias (count 1)
#[inline]
pub fn make_reference<T: Object>(value: T) -> Reference<T> {
    Reference::new(value)
}

impl<T: Object> Reference<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        let header = ObjectBox::allocate(value);
        // Safety: freshly allocated with a count of 1, adopted here
        unsafe { Self::adopt(header) }
    }

    /// Strong alias from a pointer to a value living inside an object
    /// allocation (e.g. `self` inside a method). Null yields a null handle.
    ///
    /// # Safety
    /// A non-null `ptr` must point at the value of a live object created by
    /// `Reference::new`, whose count the caller knows to be non-zero.
    pub unsafe fn from_ptr(ptr: *const T) -> Self {
        match NonNull::new(ptr as *mut T) {
            Some(value) => {
                let header = ObjectBox::header_of(value);
                ObjectHeader::increment(header);
                Self::adopt(header)
            }
            None => Self::null(),
        }
    }

    /// Give up the concrete type; no count change
    #[inline]
    pub fn upcast(self) -> Reference<dyn Object> {
        match self.into_header() {
            // Safety: the unit owned by `self` moves to the new handle
            Some(header) => unsafe { Reference::adopt(header) },
            None => Reference::null(),
        }
    }
}

impl<T: ?Sized + Referent> Reference<T> {
    /// Evaluated by `mint` for every `T` that crosses the boundary
    pub(crate) const SIZE_CHECK: () =
        assert!(mem::size_of::<Self>() == mem::size_of::<*mut c_void>());

    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        // Safety: a non-null handle keeps its object alive for `&self`
        self.ptr.map(|header| unsafe { T::resolve(header).as_ref() })
    }

    /// Address of the object, null for an empty handle
    #[inline]
    pub fn as_ptr(&self) -> *const c_void {
        self.ptr.map_or(ptr::null(), |header| header.as_ptr() as *const c_void)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

    /// Current count (diagnostics/tests), 0 for a null handle
    pub fn reference_count(&self) -> u32 {
        self.ptr.map_or(0, |header| unsafe { ObjectHeader::count(header) })
    }

    /// Concrete type name of the object
    pub fn type_name(&self) -> Option<&'static str> {
        self.type_info().map(TypeInfo::name)
    }

    /// Non-owning alias at the same address; no count change
    #[inline]
    pub fn weaken(&self) -> WeakReference<T> {
        WeakReference::from(self)
    }

    /// Checked downcast: a new independently counted alias, or null if the
    /// object's dynamic type is not `U`. `self` is never affected.
    pub fn cast_to<U: ?Sized + Referent>(&self) -> Reference<U> {
        match self.ptr {
            Some(header) if U::type_matches(unsafe { ObjectHeader::type_info(header) }) => {
                unsafe {
                    ObjectHeader::increment(header);
                    Reference::adopt(header)
                }
            }
            _ => Reference::null(),
        }
    }

    /// Mint a boundary token, see `ffi::mint`
    #[inline]
    pub fn mint(&self) -> Token {
        ffi::mint(self)
    }

    /// New alias from a minted token, see `ffi::reclaim`
    ///
    /// # Safety
    /// Same contract as `ffi::reclaim`.
    #[inline]
    pub unsafe fn reclaim(token: Token) -> Self {
        ffi::reclaim(token)
    }

    /// Settle a minted token, see `ffi::release`
    ///
    /// # Safety
    /// Same contract as `ffi::release`.
    #[inline]
    pub unsafe fn release(token: Token) {
        ffi::release(token)
    }

    #[inline]
    pub(crate) fn header(&self) -> Option<NonNull<ObjectHeader>> {
        self.ptr
    }

    pub(crate) fn type_info(&self) -> Option<&'static TypeInfo> {
        self.ptr.map(|header| unsafe { ObjectHeader::type_info(header) })
    }

    /// Adopt one unit of count already owned by the caller
    ///
    /// # Safety
    /// `header` must be a live object of a type matching `T`, and the caller
    /// must transfer one unit of its count to the returned handle.
    #[inline]
    pub(crate) unsafe fn adopt(header: NonNull<ObjectHeader>) -> Self {
        Self {
            ptr: Some(header),
            _marker: PhantomData,
        }
    }

    /// Consume without decrementing; the unit moves to the caller
    #[inline]
    pub(crate) fn into_header(self) -> Option<NonNull<ObjectHeader>> {
        let header = self.ptr;
        mem::forget(self);
        header
    }
}

impl<T: Object> From<Reference<T>> for Reference<dyn Object> {
    #[inline]
    fn from(reference: Reference<T>) -> Self {
        reference.upcast()
    }
}

impl<T: ?Sized + Referent> Clone for Reference<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(header) = self.ptr {
            unsafe { ObjectHeader::increment(header) };
        }
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + Referent> Drop for Reference<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(header) = self.ptr.take() {
            unsafe { ObjectHeader::decrement(header) };
        }
    }
}

impl<T: ?Sized + Referent> Deref for Reference<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => null_deref(),
        }
    }
}

#[cold]
#[track_caller]
fn null_deref() -> ! {
    fatal("dereferenced a null Reference")
}

impl<T: ?Sized + Referent> Default for Reference<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + Referent> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized + Referent> Eq for Reference<T> {}

impl<T: ?Sized + Referent> Hash for Reference<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state);
    }
}

impl<T: ?Sized + Referent> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => write!(
                f,
                "Reference<{}>({:p}, count={})",
                name,
                self.as_ptr(),
                self.reference_count()
            ),
            None => f.write_str("Reference(null)"),
        }
    }
}

// Objects are Send + Sync and the count is atomic
unsafe impl<T: ?Sized + Referent> Send for Reference<T> {}
unsafe impl<T: ?Sized + Referent> Sync for Reference<T> {}
