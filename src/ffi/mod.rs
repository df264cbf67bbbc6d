//! Boundary codec - strong handles as opaque `void*` tokens
//!
//! The interpreter's foreign API only stores untyped words. A token is the
//! bit pattern of exactly one strong handle: `mint` adds the unit the token
//! carries, `release` settles it. Every reinterpretation between handles and
//! words happens in this module.

use crate::logging::{debug, trace};
use crate::object::{Object, ObjectHeader, Referent, Reference};
use std::ffi::c_void;
use std::fmt;
use std::ptr::{self, NonNull};

#[cfg(test)]
mod tests;

/// Opaque one-word token carrying one unit of an object's count
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(*mut c_void);

impl Token {
    pub const NULL: Token = Token(ptr::null_mut());

    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// Rebuild a token from the word stored by foreign code
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Token(ptr)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    #[inline]
    fn header(self) -> Option<NonNull<ObjectHeader>> {
        NonNull::new(self.0.cast::<ObjectHeader>())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:p})", self.0)
    }
}

/// Increment once and hand out the handle's word. The new unit belongs to
/// whoever holds the token until `release`. A null handle mints a null token.
pub fn mint<T: ?Sized + Referent>(handle: &Reference<T>) -> Token {
    let () = Reference::<T>::SIZE_CHECK;

    match handle.header() {
        Some(header) => {
            unsafe { ObjectHeader::increment(header) };
            trace!(event = "token_mint", address = ?header.as_ptr(), count = handle.reference_count());
            Token(header.as_ptr().cast())
        }
        None => Token::NULL,
    }
}

/// New strong alias from a token (increments). The token stays valid and
/// still owes its own `release`.
///
/// Returns null for a null token, or when the object is not a `T`.
///
/// # Safety
/// `token` must come from `mint` and must not have been released yet.
pub unsafe fn reclaim<T: ?Sized + Referent>(token: Token) -> Reference<T> {
    let Some(header) = token.header() else {
        return Reference::null();
    };

    let info = ObjectHeader::type_info(header);
    if !T::type_matches(info) {
        debug!(
            event = "token_reclaim_mismatch",
            address = ?header.as_ptr(),
            found = info.name(),
            expected = std::any::type_name::<T>()
        );
        return Reference::null();
    }

    ObjectHeader::increment(header);
    trace!(event = "token_reclaim", address = ?header.as_ptr());
    Reference::adopt(header)
}

/// Settle a token: exactly one decrement, destroying the object if the token
/// held the last unit. Null tokens are ignored.
///
/// # Safety
/// `token` must come from `mint` and is dead afterwards. Each minted token
/// is released exactly once.
pub unsafe fn release(token: Token) {
    if let Some(header) = token.header() {
        trace!(event = "token_release", address = ?header.as_ptr());
        drop(Reference::<dyn Object>::adopt(header));
    }
}

/// Current count of a token's object (for debugging/testing)
///
/// # Safety
/// Same liveness requirement as `reclaim`.
pub unsafe fn token_count(token: Token) -> u32 {
    token.header().map_or(0, |header| ObjectHeader::count(header))
}

/// Increment the count behind a token and return the same word (for chaining)
///
/// # Safety
/// - Null-safe (returns null)
/// - Otherwise `token` must be a live token from `mint`; the extra unit must
///   be settled by its own `euler_token_release`
#[no_mangle]
pub unsafe extern "C" fn euler_token_retain(token: *mut c_void) -> *mut c_void {
    if let Some(header) = Token::from_ptr(token).header() {
        ObjectHeader::increment(header);
    }
    token
}

/// Release one unit, destroying the object when it was the last
///
/// # Safety
/// - Null-safe (no-op)
/// - Otherwise `token` must be a live token from `mint` or `euler_token_retain`
#[no_mangle]
pub unsafe extern "C" fn euler_token_release(token: *mut c_void) {
    release(Token::from_ptr(token));
}

/// Get current reference count (for debugging/testing)
///
/// # Safety
/// - Returns 0 for null pointers
/// - Otherwise `token` must be live
#[no_mangle]
pub unsafe extern "C" fn euler_token_refcount(token: *const c_void) -> u32 {
    token_count(Token::from_ptr(token as *mut c_void))
}
