//! Registration API for exposing native classes to Lua.
//!
//! # Architecture
//!
//! Member recipes describe what to bind; the builder decides where:
//!
//! ```text
//! method / function / manual / field!  ->  ClassBuilder::add  ->  BoundType cache
//!                                                              ->  per-VM tables
//! ```

mod class_builder;
mod member;
pub mod ops;

pub use class_builder::{Bindable, ClassBuilder};
pub use member::{Field, Member, function, manual, manual_with_receiver, method};

pub use luaglue_core::{Operator, ReturnPolicy};
