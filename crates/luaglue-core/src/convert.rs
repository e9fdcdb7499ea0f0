//! Conversion traits between Rust values and script values.
//!
//! - [`FromScript`]: read an argument from a script value
//! - [`ToScript`]: push a single result under a [`ReturnPolicy`]
//! - [`IntoResults`]: push whatever a native callable returned (`()` pushes
//!   nothing, everything else pushes one value)
//!
//! ## Supported Types
//!
//! - Integers and floats: read from any script number (or numeric string)
//!   and cast with `as`
//! - `bool`: script truthiness
//! - `char`, `String`, `&'static str`, `CString`: script strings
//! - Raw pointers to primitives: light userdata
//! - `*mut U`, `*const U`, [`ClassRef<U>`] for `U: NativeClass`: handles
//! - By-value classes via [`native_class!`](crate::native_class), enums via
//!   [`native_enum!`](crate::native_enum)
//! - `Option<V>`, `Result<R, E>`, `mlua::Value`

use std::any::type_name;
use std::ffi::{CString, c_void};
use std::ops::Deref;
use std::ptr::{self, NonNull};

use mlua::{LightUserData, Lua, MultiValue, Value};

use crate::class::NativeClass;
use crate::error::ConversionError;
use crate::handle::{check, push};
use crate::policy::ReturnPolicy;

/// Read a Rust value from a script value.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be read from a script value",
    note = "classes are passed as `*mut {Self}` or `ClassRef<{Self}>`; by-value class arguments need `native_class!({Self}: Clone)`"
)]
pub trait FromScript: Sized {
    fn from_script(value: &Value) -> Result<Self, ConversionError>;
}

/// Convert a Rust value into a single script value.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be returned to a script",
    note = "declare classes with `native_class!` and enums with `native_enum!`"
)]
pub trait ToScript {
    /// Push `self`; class instances honour `policy`.
    fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value>;
}

/// Convert a native callable's output into its script results.
pub trait IntoResults {
    fn into_results(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<MultiValue>;
}

impl IntoResults for () {
    fn into_results(self, _lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<MultiValue> {
        Ok(MultiValue::new())
    }
}

impl<R: ToScript> IntoResults for R {
    fn into_results(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<MultiValue> {
        let value = self.to_script(lua, policy)?;
        Ok(std::iter::once(value).collect())
    }
}

impl<R, E> IntoResults for Result<R, E>
where
    R: IntoResults,
    E: Into<Box<dyn std::error::Error>>,
{
    fn into_results(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<MultiValue> {
        match self {
            Ok(value) => value.into_results(lua, policy),
            Err(err) => Err(mlua::Error::external(err)),
        }
    }
}

// ============================================================================
// Numbers
// ============================================================================

enum Numeric {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Integer(v) => Some(Numeric::Int(*v)),
        Value::Number(v) => Some(Numeric::Float(*v)),
        Value::String(s) => {
            let text = s.to_str().ok()?;
            let text = text.trim();
            text.parse::<i64>()
                .map(Numeric::Int)
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(Numeric::Float))
        }
        _ => None,
    }
}

macro_rules! impl_script_int {
    ($($ty:ty),*) => {
        $(
            impl FromScript for $ty {
                fn from_script(value: &Value) -> Result<Self, ConversionError> {
                    match numeric(value) {
                        Some(Numeric::Int(v)) => Ok(v as $ty),
                        Some(Numeric::Float(v)) => Ok(v as $ty),
                        None => Err(ConversionError::mismatch("number", value)),
                    }
                }
            }

            impl ToScript for $ty {
                fn to_script(self, _lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
                    Ok(Value::Integer(self as i64))
                }
            }
        )*
    };
}

impl_script_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_script_float {
    ($($ty:ty),*) => {
        $(
            impl FromScript for $ty {
                fn from_script(value: &Value) -> Result<Self, ConversionError> {
                    match numeric(value) {
                        Some(Numeric::Int(v)) => Ok(v as $ty),
                        Some(Numeric::Float(v)) => Ok(v as $ty),
                        None => Err(ConversionError::mismatch("number", value)),
                    }
                }
            }

            impl ToScript for $ty {
                fn to_script(self, _lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
                    Ok(Value::Number(self as f64))
                }
            }
        )*
    };
}

impl_script_float!(f32, f64);

// ============================================================================
// Bool and characters
// ============================================================================

impl FromScript for bool {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        Ok(!matches!(value, Value::Nil | Value::Boolean(false)))
    }
}

impl ToScript for bool {
    fn to_script(self, _lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
        Ok(Value::Boolean(self))
    }
}

impl FromScript for char {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        String::from_script(value)?
            .chars()
            .next()
            .ok_or_else(|| ConversionError::mismatch("character", value))
    }
}

impl ToScript for char {
    fn to_script(self, lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
        let mut buf = [0u8; 4];
        Ok(Value::String(lua.create_string(self.encode_utf8(&mut buf))?))
    }
}

// ============================================================================
// Strings
// ============================================================================

impl FromScript for String {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => s
                .to_str()
                .map(|s| (*s).to_owned())
                .map_err(|_| ConversionError::InvalidUtf8),
            Value::Integer(v) => Ok(v.to_string()),
            Value::Number(v) if v.fract() == 0.0 && v.is_finite() => Ok(format!("{v:.1}")),
            Value::Number(v) => Ok(v.to_string()),
            other => Err(ConversionError::mismatch("string", other)),
        }
    }
}

impl ToScript for String {
    fn to_script(self, lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
        Ok(Value::String(lua.create_string(&self)?))
    }
}

impl ToScript for &'static str {
    fn to_script(self, lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
        Ok(Value::String(lua.create_string(self)?))
    }
}

impl FromScript for CString {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        let bytes = match value {
            Value::String(s) => s.as_bytes().to_vec(),
            other => String::from_script(other)?.into_bytes(),
        };
        CString::new(bytes).map_err(|err| ConversionError::InteriorNul {
            position: err.nul_position(),
        })
    }
}

impl ToScript for CString {
    fn to_script(self, lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
        Ok(Value::String(lua.create_string(self.as_bytes())?))
    }
}

// ============================================================================
// Raw pointers to primitives
// ============================================================================

macro_rules! impl_script_light_pointer {
    ($($ty:ty),*) => {
        $(
            impl FromScript for *mut $ty {
                fn from_script(value: &Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::LightUserData(ud) => Ok(ud.0.cast::<$ty>()),
                        Value::Nil => Ok(ptr::null_mut()),
                        other => Err(ConversionError::mismatch("light userdata", other)),
                    }
                }
            }

            impl FromScript for *const $ty {
                fn from_script(value: &Value) -> Result<Self, ConversionError> {
                    <*mut $ty>::from_script(value).map(|p| p.cast_const())
                }
            }

            impl ToScript for *mut $ty {
                fn to_script(self, _lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
                    Ok(Value::LightUserData(LightUserData(self.cast::<c_void>())))
                }
            }

            impl ToScript for *const $ty {
                fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value> {
                    self.cast_mut().to_script(lua, policy)
                }
            }
        )*
    };
}

impl_script_light_pointer!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, c_void
);

// ============================================================================
// Classes
// ============================================================================

/// A non-null reference to a native instance held by a script handle.
///
/// Taking `ClassRef<U>` as an argument reports a conversion error instead of
/// yielding null when the value is not a `U` instance.
pub struct ClassRef<U> {
    ptr: NonNull<U>,
}

impl<U> ClassRef<U> {
    /// Wrap a raw instance pointer; `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for as long as the reference is dereferenced.
    pub unsafe fn from_ptr(ptr: *mut U) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    pub fn as_ptr(&self) -> *mut U {
        self.ptr.as_ptr()
    }

    /// Mutable access to the referenced instance.
    ///
    /// # Safety
    ///
    /// No other reference to the instance may be live, including the
    /// receiver of the method currently running when it is the same object.
    pub unsafe fn as_mut(&mut self) -> &mut U {
        // SAFETY: exclusivity is upheld by the caller.
        unsafe { self.ptr.as_mut() }
    }
}

impl<U> Deref for ClassRef<U> {
    type Target = U;

    fn deref(&self) -> &U {
        // SAFETY: the pointer came from a live script handle.
        unsafe { self.ptr.as_ref() }
    }
}


impl<U: NativeClass> FromScript for ClassRef<U> {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        check::<U>(value)
            .map(|ptr| ClassRef { ptr })
            .ok_or_else(|| ConversionError::NullHandle {
                target_type: type_name::<U>(),
                actual: value.type_name(),
            })
    }
}

impl<U: NativeClass> ToScript for ClassRef<U> {
    fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value> {
        self.as_ptr().to_script(lua, policy)
    }
}

impl<U: NativeClass> FromScript for *mut U {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        Ok(check::<U>(value).map_or(ptr::null_mut(), NonNull::as_ptr))
    }
}

impl<U: NativeClass> FromScript for *const U {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        <*mut U>::from_script(value).map(|p| p.cast_const())
    }
}

impl<U: NativeClass> ToScript for *mut U {
    fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value> {
        // SAFETY: a bound callable returning a class pointer promises it is
        // either null or a live instance.
        Ok(unsafe { push(lua, self, policy.transfers()) }?)
    }
}

impl<U: NativeClass> ToScript for *const U {
    fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value> {
        self.cast_mut().to_script(lua, policy)
    }
}

impl<U: NativeClass> ToScript for &'static mut U {
    fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value> {
        (self as *mut U).to_script(lua, policy)
    }
}

// ============================================================================
// Wrappers
// ============================================================================

impl<V: FromScript> FromScript for Option<V> {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Nil => Ok(None),
            other => V::from_script(other).map(Some),
        }
    }
}

impl<V: ToScript> ToScript for Option<V> {
    fn to_script(self, lua: &Lua, policy: ReturnPolicy) -> mlua::Result<Value> {
        match self {
            Some(value) => value.to_script(lua, policy),
            None => Ok(Value::Nil),
        }
    }
}

impl FromScript for Value {
    fn from_script(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl ToScript for Value {
    fn to_script(self, _lua: &Lua, _policy: ReturnPolicy) -> mlua::Result<Value> {
        Ok(self)
    }
}
