//! Euler - shared ownership between a native engine and an embedded interpreter
//!
//! Native objects are intrusively reference counted and handed to the
//! script interpreter as single-word tokens. The interpreter's collector
//! settles each token exactly once through a per-type finalizer.

pub mod anchor;
pub mod config;
pub mod errors;
pub mod ffi;
pub mod host;
pub mod logging;
pub mod object;
pub mod stress;

// Re-export core types
pub use anchor::ContextAnchor;
pub use config::EngineConfig;
pub use errors::{ErrorKind, ExceptionClass, HostError};
pub use ffi::Token;
pub use host::{bind_function, bind_method, make_handle, read_handle, HostRuntime, HostType, ScriptHeap, TypeTag, Value};
pub use object::{make_reference, Object, Reference, WeakReference};
