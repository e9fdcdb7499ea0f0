//! Error types for class registration and value marshaling.
//!
//! ```text
//! BindError            - registration-order and VM failures while binding
//! ├── MissingTable     - methods / accessor table absent for a class
//! ├── MissingMetatable - pushing an instance of a class unknown to the VM
//! ├── Unbound          - a Rust type that was never given a script name
//! ├── Lua              - error reported by the interpreter
//! └── Io               - binding doc could not be written
//!
//! ArgumentError        - a ConversionError tagged with its stack position
//! ```
//!
//! Every error converts into [`mlua::Error`] so it can be raised through the
//! interpreter's error channel from inside a trampoline.

use std::path::PathBuf;

use mlua::Value;
use thiserror::Error;

/// Errors raised while reading a script value as a Rust type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The value has the wrong script type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A class reference was requested but the value is not an instance.
    #[error("object not found: expected {target_type}, got {actual}")]
    NullHandle {
        target_type: &'static str,
        actual: &'static str,
    },

    /// A `&mut self` method was handed its own receiver as an argument.
    #[error("argument refers to the {target_type} receiver")]
    AliasedReceiver { target_type: &'static str },

    /// Invalid UTF-8 in string
    #[error("invalid UTF-8 string data")]
    InvalidUtf8,

    /// A C string argument contained a nul byte.
    #[error("string contains an interior nul byte at {position}")]
    InteriorNul { position: usize },

    /// A number that does not name any variant of the target enum.
    #[error("{value} is not a valid {target_type}")]
    InvalidDiscriminant {
        value: i64,
        target_type: &'static str,
    },
}

impl ConversionError {
    /// Create a type mismatch error for `actual`.
    pub fn mismatch(expected: &'static str, actual: &Value) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.type_name(),
        }
    }
}

/// A conversion failure at a 1-based stack position.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("bad argument #{position} ({source})")]
pub struct ArgumentError {
    pub position: usize,
    pub source: ConversionError,
}

/// Errors raised while registering classes or binding members.
#[derive(Debug, Error)]
pub enum BindError {
    /// A table the builder writes into does not exist in this VM.
    #[error("{class}: missing table '{table}' (was the class registered in this VM?)")]
    MissingTable { class: String, table: String },

    /// The class has no metatable in this VM.
    #[error("{class} missing metatable '{table}'")]
    MissingMetatable { class: String, table: String },

    /// The Rust type was never given a script name.
    #[error("{rust_type} has not been registered with a script name")]
    Unbound { rust_type: &'static str },

    /// Error reported by the interpreter.
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    /// The binding doc could not be written.
    #[error("failed to write binding doc {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BindError {
    pub(crate) fn missing_table(class: &str, table: impl Into<String>) -> Self {
        BindError::MissingTable {
            class: class.to_string(),
            table: table.into(),
        }
    }
}

impl From<BindError> for mlua::Error {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Lua(inner) => inner,
            other => mlua::Error::external(other),
        }
    }
}

impl From<ArgumentError> for mlua::Error {
    fn from(err: ArgumentError) -> Self {
        mlua::Error::external(err)
    }
}
