//! Host binding adapter - exposes native objects to the script interpreter
//!
//! Each exposed type registers a name and a finalizer. `make_handle` mints a
//! token and stores it in an interpreter heap object; when the interpreter
//! collects that object it calls the finalizer, which settles the token.
//! `read_handle` is the single place where script-supplied values are
//! validated before a native handle is rebuilt from them.

use crate::anchor::ContextAnchor;
use crate::errors::{fatal, HostError};
use crate::ffi::{self, Token};
use crate::logging::{debug, trace};
use crate::object::{Object, Referent, Reference, TypeInfo};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::ffi::c_void;
use std::fmt;
use std::ptr;

pub mod heap;

pub use heap::{DataId, HeapStats, NativeFunction, NativeMethod, ScriptHeap, Value};


/// Registration record for one exposed native type
pub struct HostType {
    name: &'static str,
    type_id: fn() -> TypeId,
    finalizer: unsafe fn(Token),
}

/// Identity of an exposed type; compared by address
pub type TypeTag = &'static HostType;

impl HostType {
    /// Type whose finalizer releases the token
    pub const fn new<T: Object>(name: &'static str) -> Self {
        Self::with_finalizer::<T>(name, ffi::release)
    }

    /// Type with a custom finalizer. The finalizer owns the token's unit and
    /// must settle it exactly once (normally by ending in `ffi::release`).
    pub const fn with_finalizer<T: Object>(name: &'static str, finalizer: unsafe fn(Token)) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>,
            finalizer,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether objects described by `info` may be wrapped under this tag
    #[inline]
    pub fn accepts(&self, info: &TypeInfo) -> bool {
        (self.type_id)() == (info.type_id)()
    }

    /// Run the registered finalizer on a collected handle's token
    ///
    /// # Safety
    /// `token` must be the live token stored in the collected handle; it is
    /// dead afterwards.
    #[inline]
    pub unsafe fn finalize(&self, token: Token) {
        trace!(event = "host_finalize", class = self.name, token = ?token);
        (self.finalizer)(token)
    }

    #[inline]
    pub fn same(a: TypeTag, b: TypeTag) -> bool {
        ptr::eq(a, b)
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostType({} @ {:p})", self.name, self)
    }
}

/// Seam to the interpreter's foreign API
///
/// Implementations are driven from the interpreter's own thread only.
pub trait HostRuntime {
    /// Allocate a handle object carrying `token`
    ///
    /// # Safety
    /// `token` must be a unit freshly minted for this handle alone, for an
    /// object of `tag`'s native type. The handle adopts that unit and its
    /// finalizer settles it; a token copied out of `data_of` or built with
    /// `Token::from_ptr` would be settled twice.
    ///
    /// ```compile_fail
    /// use euler::{make_handle, make_reference, HostRuntime, HostType, Object, ScriptHeap};
    ///
    /// struct Sprite;
    /// impl Object for Sprite {}
    /// static SPRITE: HostType = HostType::new::<Sprite>("Doc::Sprite");
    ///
    /// let mut heap = ScriptHeap::new();
    /// let value = make_handle(&mut heap, &make_reference(Sprite), &SPRITE);
    /// let (tag, token) = heap.data_of(&value).unwrap();
    /// heap.alloc_data(tag, token);
    /// ```
    unsafe fn alloc_data(&mut self, tag: TypeTag, token: Token) -> Value;

    /// Tag and token of a live handle object, `None` for anything else
    fn data_of(&self, value: &Value) -> Option<(TypeTag, Token)>;

    /// Name of a value's class for error messages
    fn describe(&self, value: &Value) -> String {
        value.type_name().to_string()
    }

    /// The interpreter's single reserved native slot
    fn user_data(&self) -> *mut c_void;

    /// Overwrite the reserved slot
    ///
    /// # Safety
    /// The slot is read back by `ContextAnchor::recover`, so `data` must be
    /// null or a weak handle written by `ContextAnchor::install`.
    ///
    /// ```compile_fail
    /// use euler::{HostRuntime, ScriptHeap};
    ///
    /// let mut word = [0u8; 16];
    /// let mut heap = ScriptHeap::new();
    /// heap.set_user_data(word.as_mut_ptr().cast());
    /// ```
    unsafe fn set_user_data(&mut self, data: *mut c_void);

    fn interpreter_id(&self) -> u64;
}

static TYPE_REGISTRY: Lazy<DashMap<&'static str, TypeTag>> = Lazy::new(DashMap::new);

/// Record `tag` under its name. Registering the same tag twice is a no-op;
/// two different tags under one name is a programming error.
pub fn register_type(tag: TypeTag) {
    let existing = *TYPE_REGISTRY.entry(tag.name()).or_insert(tag);
    if !HostType::same(existing, tag) {
        fatal(&format!("host type '{}' registered twice", tag.name()));
    }
    debug!(event = "host_type_registered", class = tag.name());
}

pub fn registered_type(name: &str) -> Option<TypeTag> {
    TYPE_REGISTRY.get(name).map(|entry| *entry.value())
}

/// Wrap a strong handle into a new script value. A null handle becomes nil.
///
/// The handle's object must be of the tag's native type.
pub fn make_handle<T, R>(rt: &mut R, handle: &Reference<T>, tag: TypeTag) -> Value
where
    T: ?Sized + Referent,
    R: HostRuntime + ?Sized,
{
    let Some(info) = handle.type_info() else {
        return Value::Nil;
    };

    if !tag.accepts(info) {
        fatal(&format!("cannot wrap {} as {}", info.name(), tag.name()));
    }

    let token = ffi::mint(handle);
    // Safety: the token was minted above for this handle only
    unsafe { rt.alloc_data(tag, token) }
}

/// Rebuild a strong handle from a script value, checking that it is a live
/// handle object of exactly `tag`.
pub fn read_handle<T, R>(rt: &R, value: &Value, tag: TypeTag) -> Result<Reference<T>, HostError>
where
    T: ?Sized + Referent,
    R: HostRuntime + ?Sized,
{
    let Some((found, token)) = rt.data_of(value) else {
        return Err(HostError::type_mismatch(tag.name(), rt.describe(value)));
    };

    if !HostType::same(found, tag) {
        return Err(HostError::type_mismatch(tag.name(), found.name()));
    }

    // Safety: a live handle object still owns its token's unit
    let reference = unsafe { ffi::reclaim::<T>(token) };
    if reference.is_null() {
        fatal(&format!(
            "host type {} does not hold a {}",
            tag.name(),
            std::any::type_name::<T>()
        ));
    }
    Ok(reference)
}

/// Bind a native method of `tag` whose body receives the anchored engine
/// state `S` and the receiver as `T`. A nil receiver is an `ArgumentError`.
pub fn bind_method<S, T, F>(heap: &mut ScriptHeap, tag: TypeTag, name: &'static str, body: F)
where
    S: Object,
    T: Object,
    F: Fn(&mut ScriptHeap, &Reference<S>, &Reference<T>, &[Value]) -> Result<Value, HostError> + 'static,
{
    heap.define_method(tag, name, move |heap, receiver, args| {
        let state = ContextAnchor::recover::<S, _>(&*heap);
        if receiver.is_nil() {
            return Err(HostError::null_self(tag.name()));
        }
        let this = read_handle::<T, _>(&*heap, receiver, tag)?;
        body(heap, &state, &this, args)
    });
}

/// Bind a class-level function of `tag`. The body receives the anchored
/// engine state `S` and the arguments; there is no receiver.
pub fn bind_function<S, F>(heap: &mut ScriptHeap, tag: TypeTag, name: &'static str, body: F)
where
    S: Object,
    F: Fn(&mut ScriptHeap, &Reference<S>, &[Value]) -> Result<Value, HostError> + 'static,
{
    heap.define_function(tag, name, move |heap, args| {
        let state = ContextAnchor::recover::<S, _>(&*heap);
        body(heap, &state, args)
    });
}
