//! Error vocabulary for the ownership core
//!
//! Two classes of failure exist:
//! - Recoverable errors raised at the script boundary (`HostError`). Script values
//!   are untrusted input, so a bad value becomes a catchable error.
//! - Invariant violations (`fatal`). These indicate a logic defect in native code
//!   and never propagate as values.

use std::fmt;
use std::path::PathBuf;

/// Script-visible exception class an error maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionClass {
    TypeError,
    ArgumentError,
    NoMethodError,
}

impl ExceptionClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::TypeError => "TypeError",
            Self::ArgumentError => "ArgumentError",
            Self::NoMethodError => "NoMethodError",
        }
    }
}

impl fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    TypeMismatch { expected: String, found: String },
    NullSelf { class: String },
    NoMethod { class: String, method: String },
    ArgumentCount { method: String, expected: usize, found: usize },
}

impl ErrorKind {
    pub fn exception_class(&self) -> ExceptionClass {
        match self {
            Self::TypeMismatch { .. } => ExceptionClass::TypeError,
            Self::NullSelf { .. } | Self::ArgumentCount { .. } => ExceptionClass::ArgumentError,
            Self::NoMethod { .. } => ExceptionClass::NoMethodError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "wrong argument type {} (expected {})", found, expected)
            }
            Self::NullSelf { class } => {
                write!(f, "passed null self to {}", class)
            }
            Self::NoMethod { class, method } => {
                write!(f, "undefined method '{}' for {}", method, class)
            }
            Self::ArgumentCount { method, expected, found } => {
                write!(
                    f,
                    "wrong number of arguments to '{}' (given {}, expected {})",
                    method, found, expected
                )
            }
        }
    }
}

/// Recoverable error surfaced to the script layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub kind: ErrorKind,
}

impl HostError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        })
    }

    pub fn null_self(class: impl Into<String>) -> Self {
        Self::new(ErrorKind::NullSelf { class: class.into() })
    }

    pub fn no_method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoMethod {
            class: class.into(),
            method: method.into(),
        })
    }

    pub fn argument_count(method: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::new(ErrorKind::ArgumentCount {
            method: method.into(),
            expected,
            found,
        })
    }

    pub fn exception_class(&self) -> ExceptionClass {
        self.kind.exception_class()
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception_class(), self.kind)
    }
}

impl std::error::Error for HostError {}

/// Failure while loading engine configuration
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            Self::Parse { message } => write!(f, "invalid config: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse { message: err.to_string() }
    }
}

/// Report an invariant violation and stop.
///
/// Release builds abort (`panic = "abort"`), so nothing is unwound through
/// interpreter frames. Test builds unwind so the violation can be asserted.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fatal(message: &str) -> ! {
    tracing::error!(event = "invariant_violation", detail = message, "fatal ownership error");
    panic!("{}", message);
}
