//! Core of the luaglue binding layer.
//!
//! This crate holds everything that runs when a script touches a bound class:
//!
//! - [`convert`]: `FromScript` / `ToScript` marshaling
//! - [`signature`]: compile-time description of bindable callables
//! - [`trampoline`]: the generated entry points
//! - [`class`] and [`registry`]: process-wide class records and their
//!   per-VM tables
//! - [`handle`]: the userdata that references native instances
//! - [`lifecycle`] and [`binding_doc`]: setup, teardown and documentation
//!
//! Registration itself is driven by the `ClassBuilder` in `luaglue-module`.

pub mod binding_doc;
pub mod class;
pub mod convert;
pub mod error;
pub mod handle;
pub mod lifecycle;
mod macros;
pub mod operator;
pub mod policy;
pub mod registry;
pub mod signature;
pub mod trampoline;

pub use binding_doc::{Access, MemberDoc, MemberRole, binding_doc, write_binding_doc};
pub use class::{
    BoundType, CachedBinding, ClassIdentity, Destructor, Finalizer, NativeClass,
    deallocate_bindings,
};
pub use convert::{ClassRef, FromScript, IntoResults, ToScript};
pub use error::{ArgumentError, BindError, ConversionError};
pub use handle::{Handle, check, push, push_owned};
pub use lifecycle::{DEFAULT_BINDING_DOC_FILE, GlueConfig, init, init_with, is_recording, quit};
pub use operator::Operator;
pub use policy::ReturnPolicy;
pub use signature::{CallableKind, FunctionFn, ManualFn, MethodFn, Signature};
pub use trampoline::{FieldBinding, Trampoline, into_function};

pub use mlua;
pub use num_enum;
