//! Weak handle - one machine word, never touches the count
//!
//! There is no liveness tracking: a weak handle may outlive its object.
//! Use it for back-edges (child -> parent) where the strong owner is known to
//! outlive every use of the weak side.

use super::{Object, ObjectBox, ObjectHeader, Referent, Reference};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

pub struct WeakReference<T: ?Sized + Referent> {
    ptr: Option<NonNull<ObjectHeader>>,
    _marker: PhantomData<*const T>,
}

impl<T: Object> WeakReference<T> {
    /// Weak alias from a pointer to a value inside an object allocation
    ///
    /// # Safety
    /// A non-null `ptr` must point at the value of an object created by
    /// `Reference::new`.
    pub unsafe fn from_ptr(ptr: *const T) -> Self {
        Self {
            ptr: NonNull::new(ptr as *mut T).map(|value| ObjectBox::header_of(value)),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + Referent> WeakReference<T> {
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

    /// New strong alias (increments). A null weak handle yields null.
    ///
    /// # Safety
    /// The object must still be alive. Nothing here can detect that it is
    /// not; the caller's ownership structure has to guarantee it.
    #[inline]
    pub unsafe fn strengthen(&self) -> Reference<T> {
        match self.ptr {
            Some(header) => {
                ObjectHeader::increment(header);
                Reference::adopt(header)
            }
            None => Reference::null(),
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *const c_void {
        self.ptr.map_or(ptr::null(), |header| header.as_ptr() as *const c_void)
    }

    /// Raw word for storage in a foreign `void*` slot
    #[inline]
    pub fn into_raw(self) -> *mut c_void {
        self.ptr.map_or(ptr::null_mut(), |header| header.as_ptr().cast())
    }

    /// # Safety
    /// `raw` must be null or come from `into_raw` on a handle whose object
    /// type matches `T`.
    #[inline]
    pub unsafe fn from_raw(raw: *mut c_void) -> Self {
        Self {
            ptr: NonNull::new(raw.cast::<ObjectHeader>()),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + Referent> From<&Reference<T>> for WeakReference<T> {
    #[inline]
    fn from(reference: &Reference<T>) -> Self {
        Self {
            ptr: reference.header(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + Referent> Clone for WeakReference<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + Referent> Copy for WeakReference<T> {}

impl<T: ?Sized + Referent> Default for WeakReference<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + Referent> PartialEq for WeakReference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: ?Sized + Referent> Eq for WeakReference<T> {}

impl<T: ?Sized + Referent> PartialEq<Reference<T>> for WeakReference<T> {
    fn eq(&self, other: &Reference<T>) -> bool {
        self.ptr == other.header()
    }
}

impl<T: ?Sized + Referent> fmt::Debug for WeakReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The object may be gone, so only the address is printed
        write!(f, "WeakReference({:p})", self.as_ptr())
    }
}

// Same sharing rules as the strong handle; the word itself is inert
unsafe impl<T: ?Sized + Referent> Send for WeakReference<T> {}
unsafe impl<T: ?Sized + Referent> Sync for WeakReference<T> {}
