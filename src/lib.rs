//! Bind native Rust types into an embedded Lua VM.
//!
//! ```
//! use luaglue::prelude::*;
//!
//! struct Point {
//!     x: f64,
//! }
//! luaglue::native_class!(Point);
//!
//! impl Point {
//!     fn new(x: f64) -> Point {
//!         Point { x }
//!     }
//!
//!     fn scale(&mut self, by: f64) {
//!         self.x *= by;
//!     }
//! }
//!
//! # fn main() -> Result<(), BindError> {
//! let lua = Lua::new();
//! ClassBuilder::<Point>::new(&lua, "Point")?
//!     .constructor(Point::new)?
//!     .add("scale", method(Point::scale))?
//!     .add("x", luaglue::field!(Point, x))?;
//!
//! lua.load("local p = Point(3.0); p:scale(2.0); assert(p.x == 6.0)")
//!     .exec()?;
//! # Ok(())
//! # }
//! ```

pub use luaglue_core as core;
pub use luaglue_module as module;

pub use luaglue_core::{mlua, native_class, native_enum};
pub use luaglue_module::{field, ops};

pub mod prelude {
    pub use luaglue_core::mlua::{Lua, MultiValue, Value};
    pub use luaglue_core::{
        BindError, ClassRef, ConversionError, FromScript, GlueConfig, Handle, NativeClass,
        Operator, ReturnPolicy, ToScript, check, deallocate_bindings, init, init_with, push,
        push_owned, quit,
    };
    pub use luaglue_module::{
        Bindable, ClassBuilder, Field, Member, function, manual, manual_with_receiver, method,
    };
}
