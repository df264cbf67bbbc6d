//! Intrusive reference-counted objects
//!
//! Every shareable value lives in a single allocation: an `ObjectHeader`
//! (atomic counter + static type metadata) followed by the value itself.
//! There is no side allocation, so a handle is just the header address.
//!
//! Counting follows the usual intrusive pattern:
//! - increment with relaxed ordering (the caller already holds a counted alias)
//! - decrement with release ordering
//! - acquire fence before the object is destroyed

use crate::errors::fatal;
use crate::logging::trace;
use std::any::{Any, TypeId};
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU32, Ordering};

mod reference;
mod weak;

pub use reference::{make_reference, Reference};
pub use weak::WeakReference;


/// Counts above this are treated as a leak or corruption
const MAX_COUNT: u32 = i32::MAX as u32;

/// Marker for types that may be shared through `Reference<T>`.
///
/// Opt in with an empty impl: `impl Object for Engine {}`. Destruction is the
/// type's ordinary `Drop`, run once when the last strong alias goes away.
pub trait Object: Any + Send + Sync {}

/// Per-type metadata, shared by every instance of a type
pub struct TypeInfo {
    pub type_id: fn() -> TypeId,
    pub type_name: fn() -> &'static str,
    destroy: unsafe fn(NonNull<ObjectHeader>),
    as_object: unsafe fn(NonNull<ObjectHeader>) -> NonNull<dyn Object>,
}

impl TypeInfo {
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        (self.type_id)() == TypeId::of::<T>()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        (self.type_name)()
    }
}

/// Object header, always at offset 0 of the allocation
#[repr(C)]
pub struct ObjectHeader {
    count: AtomicU32,
    type_info: &'static TypeInfo,
}

impl ObjectHeader {
    /// Increment reference count (hot path, always inlined)
    ///
    /// # Safety
    /// `header` must point at a live object.
    #[inline(always)]
    pub(crate) unsafe fn increment(header: NonNull<Self>) {
        let old = header.as_ref().count.fetch_add(1, Ordering::Relaxed);

        if old >= MAX_COUNT {
            fatal("reference count overflow");
        }
    }

    /// Decrement reference count, destroying the object on the 1 -> 0 edge
    ///
    /// # Safety
    /// `header` must point at a live object and the caller must own one unit
    /// of its count.
    #[inline(always)]
    pub(crate) unsafe fn decrement(header: NonNull<Self>) {
        let old = header.as_ref().count.fetch_sub(1, Ordering::Release);

        if old == 1 {
            // Synchronize with all previous decrements
            fence(Ordering::Acquire);
            Self::destroy(header);
        } else if old == 0 {
            fatal("reference count underflow");
        }
    }

    /// Current count (diagnostics only, may be stale immediately)
    #[inline]
    pub(crate) unsafe fn count(header: NonNull<Self>) -> u32 {
        header.as_ref().count.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) unsafe fn set_count(header: NonNull<Self>, count: u32) {
        header.as_ref().count.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) unsafe fn type_info(header: NonNull<Self>) -> &'static TypeInfo {
        header.as_ref().type_info
    }

    /// Destroy object and free memory (cold path)
    #[cold]
    unsafe fn destroy(header: NonNull<Self>) {
        let info = header.as_ref().type_info;
        trace!(event = "object_destroy", address = ?header.as_ptr(), type_name = info.name());
        (info.destroy)(header);
    }
}

/// The single allocation backing a `Reference<T>`
#[repr(C)]
pub(crate) struct ObjectBox<T> {
    header: ObjectHeader,
    value: T,
}

impl<T: Object> ObjectBox<T> {
    const TYPE_INFO: &'static TypeInfo = &TypeInfo {
        type_id: TypeId::of::<T>,
        type_name: std::any::type_name::<T>,
        destroy: Self::destroy,
        as_object: Self::as_object,
    };

    /// Allocate a new object with a count of 1
    pub(crate) fn allocate(value: T) -> NonNull<ObjectHeader> {
        let boxed = Box::new(ObjectBox {
            header: ObjectHeader {
                count: AtomicU32::new(1),
                type_info: Self::TYPE_INFO,
            },
            value,
        });

        let header = NonNull::from(Box::leak(boxed)).cast::<ObjectHeader>();
        trace!(event = "object_new", address = ?header.as_ptr(), type_name = std::any::type_name::<T>());
        header
    }

    #[inline]
    pub(crate) unsafe fn value_ptr(header: NonNull<ObjectHeader>) -> NonNull<T> {
        let boxed = header.cast::<ObjectBox<T>>().as_ptr();
        NonNull::new_unchecked(ptr::addr_of_mut!((*boxed).value))
    }

    /// Recover the header from a pointer to the value inside an allocation
    #[inline]
    pub(crate) unsafe fn header_of(value: NonNull<T>) -> NonNull<ObjectHeader> {
        let offset = std::mem::offset_of!(ObjectBox<T>, value);
        NonNull::new_unchecked(value.as_ptr().cast::<u8>().sub(offset).cast::<ObjectHeader>())
    }

    unsafe fn destroy(header: NonNull<ObjectHeader>) {
        drop(Box::from_raw(header.cast::<ObjectBox<T>>().as_ptr()));
    }

    unsafe fn as_object(header: NonNull<ObjectHeader>) -> NonNull<dyn Object> {
        Self::value_ptr(header)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Types a handle can point at: any concrete `Object`, or `dyn Object`.
///
/// Sealed; the handle machinery relies on both impls below being the only ones.
pub trait Referent: sealed::Sealed + 'static {
    /// Whether an object described by `info` may be viewed as `Self`
    #[doc(hidden)]
    fn type_matches(info: &TypeInfo) -> bool;

    /// # Safety
    /// `header` must point at a live object for which `type_matches` holds.
    #[doc(hidden)]
    unsafe fn resolve(header: NonNull<ObjectHeader>) -> NonNull<Self>;
}

impl<T: Object> sealed::Sealed for T {}

impl<T: Object> Referent for T {
    #[inline]
    fn type_matches(info: &TypeInfo) -> bool {
        info.is::<T>()
    }

    #[inline]
    unsafe fn resolve(header: NonNull<ObjectHeader>) -> NonNull<T> {
        ObjectBox::<T>::value_ptr(header)
    }
}

impl sealed::Sealed for dyn Object {}

impl Referent for dyn Object {
    #[inline]
    fn type_matches(_info: &TypeInfo) -> bool {
        true
    }

    #[inline]
    unsafe fn resolve(header: NonNull<ObjectHeader>) -> NonNull<dyn Object> {
        (ObjectHeader::type_info(header).as_object)(header)
    }
}
