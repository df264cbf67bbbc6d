//! Context anchor - engine state recovered from the interpreter's reserved slot
//!
//! Native callbacks receive only the interpreter instance. The engine state is
//! stored there once, as a weak handle, so the anchor never keeps the state
//! alive on its own; the application's top-level owner does.

use crate::errors::fatal;
use crate::host::HostRuntime;
use crate::logging::info;
use crate::object::{Object, Reference, WeakReference};

pub struct ContextAnchor;

impl ContextAnchor {
    /// Store a weak handle to `state` in the interpreter's reserved slot.
    ///
    /// Installing twice into one interpreter, or installing a null state, is
    /// fatal.
    ///
    /// # Safety
    /// `state`'s object must stay alive for every later `recover` on `rt`
    /// (typically the engine owns both the state and the interpreter, and
    /// closes the interpreter first).
    pub unsafe fn install<S, R>(rt: &mut R, state: &Reference<S>)
    where
        S: Object,
        R: HostRuntime + ?Sized,
    {
        if !rt.user_data().is_null() {
            fatal("context anchor installed twice");
        }
        if state.is_null() {
            fatal("context anchor installed with a null state");
        }

        rt.set_user_data(state.weaken().into_raw());
        info!(
            event = "anchor_install",
            interpreter = rt.interpreter_id(),
            state = std::any::type_name::<S>()
        );
    }

    /// Strong handle to the installed state. Fatal when nothing is installed
    /// or the installed state is not an `S`.
    pub fn recover<S, R>(rt: &R) -> Reference<S>
    where
        S: Object,
        R: HostRuntime + ?Sized,
    {
        let raw = rt.user_data();
        if raw.is_null() {
            fatal("context anchor recovered before install");
        }

        // Safety: the slot only ever holds a weak handle written by `install`,
        // whose caller guarantees the state is still alive
        let state = unsafe { WeakReference::<dyn Object>::from_raw(raw).strengthen() }.cast_to::<S>();
        if state.is_null() {
            fatal(&format!(
                "context anchor does not hold a {}",
                std::any::type_name::<S>()
            ));
        }
        state
    }

    pub fn is_installed<R: HostRuntime + ?Sized>(rt: &R) -> bool {
        !rt.user_data().is_null()
    }

    /// Empty the slot (interpreter shutdown). No count change.
    pub fn clear<R: HostRuntime + ?Sized>(rt: &mut R) {
        // Safety: an empty slot is always valid
        unsafe { rt.set_user_data(std::ptr::null_mut()) };
    }
}
