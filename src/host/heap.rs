//! Reference interpreter heap
//!
//! A small mark/sweep heap standing in for the embedded interpreter. It owns
//! handle objects (one token + type tag each), runs each finalizer exactly
//! once when a handle becomes unreachable, and finalizes everything left
//! when the heap is closed.
//!
//! Design:
//! - Slot table with per-slot generations, so stale script values are detected
//! - Globals are always roots; callers pass their stack values as extra roots
//! - Single-threaded (`!Send`), like the interpreter it models

use super::{HostRuntime, HostType, TypeTag};
use crate::config::HeapConfig;
use crate::errors::HostError;
use crate::ffi::Token;
use crate::logging::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INTERPRETER_ID: AtomicU64 = AtomicU64::new(1);

/// Address of a handle object slot, valid only in the heap that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId {
    heap: u64,
    index: u32,
    generation: u32,
}

/// Script-visible value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Data(DataId),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Data(_) => "Data",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Str(value) => write!(f, "{:?}", value),
            Value::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
            Value::Data(id) => write!(f, "#<Data {}:{}:{}>", id.heap, id.index, id.generation),
        }
    }
}

/// Native method: `(heap, receiver, arguments)`
pub type NativeMethod = Rc<dyn Fn(&mut ScriptHeap, &Value, &[Value]) -> Result<Value, HostError>>;

/// Class-level native function: `(heap, arguments)`
pub type NativeFunction = Rc<dyn Fn(&mut ScriptHeap, &[Value]) -> Result<Value, HostError>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    pub live_handles: usize,
    pub allocated_total: u64,
    pub finalized_total: u64,
    pub collections: u64,
    pub slots: usize,
}

struct HandleObject {
    tag: TypeTag,
    token: Token,
    marked: bool,
}

struct Slot {
    generation: u32,
    object: Option<HandleObject>,
}

pub struct ScriptHeap {
    id: u64,
    slots: Vec<Slot>,
    free: Vec<u32>,
    globals: HashMap<String, Value>,
    methods: HashMap<usize, HashMap<&'static str, NativeMethod>>,
    functions: HashMap<usize, HashMap<&'static str, NativeFunction>>,
    user_data: *mut c_void,
    collect_threshold: usize,
    since_collect: usize,
    stats: HeapStats,
}

impl ScriptHeap {
    pub fn new() -> Self {
        Self::with_config(&HeapConfig::default())
    }

    pub fn with_config(config: &HeapConfig) -> Self {
        let id = NEXT_INTERPRETER_ID.fetch_add(1, Ordering::Relaxed);
        debug!(event = "heap_open", interpreter = id, threshold = config.collect_threshold);

        Self {
            id,
            slots: Vec::with_capacity(config.initial_capacity),
            free: Vec::new(),
            globals: HashMap::new(),
            methods: HashMap::new(),
            functions: HashMap::new(),
            user_data: ptr::null_mut(),
            collect_threshold: config.collect_threshold.max(1),
            since_collect: 0,
            stats: HeapStats::default(),
        }
    }

    /// Expose a type: registers its name and gives it a method table
    pub fn define_class(&mut self, tag: TypeTag) {
        super::register_type(tag);
        self.methods.entry(tag_key(tag)).or_default();
    }

    pub fn define_method<F>(&mut self, tag: TypeTag, name: &'static str, method: F)
    where
        F: Fn(&mut ScriptHeap, &Value, &[Value]) -> Result<Value, HostError> + 'static,
    {
        self.define_class(tag);
        debug!(event = "method_defined", class = tag.name(), method = name);
        self.methods
            .entry(tag_key(tag))
            .or_default()
            .insert(name, Rc::new(method));
    }

    pub fn method(&self, tag: TypeTag, name: &str) -> Option<NativeMethod> {
        self.methods.get(&tag_key(tag))?.get(name).cloned()
    }

    /// Dispatch `receiver.name(args)`
    pub fn call(&mut self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, HostError> {
        let Some((tag, _)) = self.data_of(receiver) else {
            return Err(HostError::no_method(self.describe(receiver), name));
        };
        let Some(method) = self.method(tag, name) else {
            return Err(HostError::no_method(tag.name(), name));
        };
        (*method)(self, receiver, args)
    }

    pub fn define_function<F>(&mut self, tag: TypeTag, name: &'static str, function: F)
    where
        F: Fn(&mut ScriptHeap, &[Value]) -> Result<Value, HostError> + 'static,
    {
        self.define_class(tag);
        debug!(event = "function_defined", class = tag.name(), function = name);
        self.functions
            .entry(tag_key(tag))
            .or_default()
            .insert(name, Rc::new(function));
    }

    pub fn function(&self, tag: TypeTag, name: &str) -> Option<NativeFunction> {
        self.functions.get(&tag_key(tag))?.get(name).cloned()
    }

    /// Dispatch `Class.name(args)`
    pub fn call_function(&mut self, tag: TypeTag, name: &str, args: &[Value]) -> Result<Value, HostError> {
        let Some(function) = self.function(tag, name) else {
            return Err(HostError::no_method(tag.name(), name));
        };
        (*function)(self, args)
    }

    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn remove_global(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    /// Whether `value` names a handle object that has not been collected
    pub fn is_live(&self, value: &Value) -> bool {
        self.data_of(value).is_some()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            slots: self.slots.len(),
            ..self.stats
        }
    }

    /// Mark from globals and `roots`, then sweep: every unreachable handle
    /// object is freed and its finalizer runs once. Returns the number freed.
    pub fn collect(&mut self, roots: &[Value]) -> usize {
        let mut pending: Vec<&Value> = self.globals.values().chain(roots.iter()).collect();
        let mut marks = Vec::new();

        while let Some(value) = pending.pop() {
            match value {
                Value::Data(id) => {
                    if self.live_slot(*id).is_some() {
                        marks.push(id.index);
                    }
                }
                Value::Array(values) => pending.extend(values.iter()),
                _ => {}
            }
        }

        for index in marks {
            if let Some(object) = self.slots[index as usize].object.as_mut() {
                object.marked = true;
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let marked = match slot.object.as_mut() {
                Some(object) => std::mem::replace(&mut object.marked, false),
                None => continue,
            };
            if marked {
                continue;
            }

            if let Some(object) = slot.object.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.stats.live_handles -= 1;
                self.stats.finalized_total += 1;
                freed += 1;
                unsafe { object.tag.finalize(object.token) };
            }
        }

        self.since_collect = 0;
        self.stats.collections += 1;
        info!(
            event = "heap_collect",
            interpreter = self.id,
            freed,
            live = self.stats.live_handles
        );
        freed
    }

    /// Collect once enough handle objects were allocated since the last run
    pub fn maybe_collect(&mut self, roots: &[Value]) -> usize {
        if self.since_collect >= self.collect_threshold {
            self.collect(roots)
        } else {
            0
        }
    }

    fn live_slot(&self, id: DataId) -> Option<&HandleObject> {
        if id.heap != self.id {
            return None;
        }
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.object.as_ref()
    }

    /// Finalize every remaining handle object (interpreter shutdown)
    fn free_all(&mut self) {
        let mut freed = 0;
        for slot in &mut self.slots {
            if let Some(object) = slot.object.take() {
                slot.generation = slot.generation.wrapping_add(1);
                freed += 1;
                unsafe { object.tag.finalize(object.token) };
            }
        }
        self.stats.finalized_total += freed;
        self.stats.live_handles = 0;
        debug!(event = "heap_close", interpreter = self.id, freed);
    }
}

impl Default for ScriptHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime for ScriptHeap {
    unsafe fn alloc_data(&mut self, tag: TypeTag, token: Token) -> Value {
        let object = HandleObject {
            tag,
            token,
            marked: false,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].object = Some(object);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                (self.slots.len() - 1) as u32
            }
        };

        self.stats.live_handles += 1;
        self.stats.allocated_total += 1;
        self.since_collect += 1;

        let generation = self.slots[index as usize].generation;
        debug!(event = "handle_alloc", class = tag.name(), index, generation);
        Value::Data(DataId {
            heap: self.id,
            index,
            generation,
        })
    }

    fn data_of(&self, value: &Value) -> Option<(TypeTag, Token)> {
        match value {
            Value::Data(id) => self.live_slot(*id).map(|object| (object.tag, object.token)),
            _ => None,
        }
    }

    fn describe(&self, value: &Value) -> String {
        match value {
            Value::Data(id) if id.heap != self.id => "foreign object".to_string(),
            Value::Data(id) => match self.live_slot(*id) {
                Some(object) => object.tag.name().to_string(),
                None => "collected object".to_string(),
            },
            other => other.type_name().to_string(),
        }
    }

    fn user_data(&self) -> *mut c_void {
        self.user_data
    }

    unsafe fn set_user_data(&mut self, data: *mut c_void) {
        self.user_data = data;
    }

    fn interpreter_id(&self) -> u64 {
        self.id
    }
}

impl Drop for ScriptHeap {
    fn drop(&mut self) {
        self.free_all();
    }
}

impl fmt::Debug for ScriptHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHeap")
            .field("id", &self.id)
            .field("stats", &self.stats())
            .finish()
    }
}

#[inline]
fn tag_key(tag: TypeTag) -> usize {
    tag as *const HostType as usize
}
