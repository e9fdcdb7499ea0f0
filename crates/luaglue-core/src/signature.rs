//! Compile-time introspection of bindable callables.
//!
//! Three callable shapes can be bound to a class:
//!
//! ```text
//! MethodFn    Fn(&mut T, A1..An) -> R   receiver at stack position 1
//!             Fn(&T, A1..An) -> R
//! ManualFn    Fn(&Lua, MultiValue) -> mlua::Result<MultiValue>
//!             Fn(&Lua, Option<&mut T>, MultiValue) -> mlua::Result<MultiValue>
//! FunctionFn  Fn(A1..An) -> R           arguments from stack position 1
//! ```
//!
//! Each trait is implemented by macro for every arity up to eight. The `M`
//! parameter is a marker type carrying the argument tuple and return type,
//! which keeps the impls disjoint and lets the compiler pick the shape from
//! the callable's own signature.

use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

use mlua::{Lua, MultiValue, Value};

use crate::convert::FromScript;
use crate::error::{ArgumentError, ConversionError};
use crate::handle::aliases;

/// The closed set of member shapes a binding can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
    MemberFunction,
    FreeFunctionManual,
    FreeFunctionGenerated,
    MemberData,
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallableKind::MemberFunction => "method",
            CallableKind::FreeFunctionManual => "manual",
            CallableKind::FreeFunctionGenerated => "function",
            CallableKind::MemberData => "field",
        })
    }
}

/// Static description of a bound callable or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub kind: CallableKind,
    /// Receiver type for methods and fields.
    pub owner: Option<&'static str>,
    /// Argument type names, receiver excluded.
    pub args: Vec<&'static str>,
    pub output: &'static str,
}

impl Signature {
    pub fn new(
        kind: CallableKind,
        owner: Option<&'static str>,
        args: Vec<&'static str>,
        output: &'static str,
    ) -> Self {
        Self {
            kind,
            owner,
            args,
            output,
        }
    }

    /// Number of script-visible arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Whether the callable produces no script results.
    pub fn is_void(&self) -> bool {
        self.output == type_name::<()>()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&short_type_name(arg))?;
        }
        f.write_str(")")?;
        if !self.is_void() {
            write!(f, " -> {}", short_type_name(self.output))?;
        }
        Ok(())
    }
}

/// Strip module paths from a `type_name` string.
///
/// `alloc::vec::Vec<alloc::string::String>` becomes `Vec<String>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut word = String::new();
    let mut chars = full.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            word.clear();
        } else if c.is_alphanumeric() || c == '_' {
            word.push(c);
        } else {
            out.push_str(&word);
            word.clear();
            out.push(c);
        }
    }
    out.push_str(&word);
    out
}

// ============================================================================
// Markers
// ============================================================================

/// Marker for methods taking `&mut T`.
pub struct ByMut;

/// Marker for methods taking `&T`.
pub struct ByRef;

/// Marker for manual callables that only take the VM context.
pub struct Context;

/// Marker for manual callables that also take the resolved receiver.
pub struct WithReceiver;

// ============================================================================
// Traits
// ============================================================================

/// A native method bound with generated marshaling.
pub trait MethodFn<T, M>: Send + Sync + 'static {
    type Output;

    const ARITY: usize;

    /// Invoke on `this`, reading arguments from `args[1..]`.
    ///
    /// `args` is the full script argument list; slot 0 holds the receiver.
    /// Methods taking `&mut T` reject arguments that refer to the receiver.
    ///
    /// # Safety
    ///
    /// `this` must point to a live `T` that nothing else borrows for the
    /// duration of the call.
    unsafe fn call(&self, this: NonNull<T>, args: &[Value])
    -> Result<Self::Output, ArgumentError>;

    fn signature() -> Signature;
}

/// A native free function bound with generated marshaling.
pub trait FunctionFn<M>: Send + Sync + 'static {
    type Output;

    const ARITY: usize;

    fn call(&self, args: &[Value]) -> Result<Self::Output, ArgumentError>;

    fn signature() -> Signature;
}

/// A callable that does its own marshaling against the VM context.
pub trait ManualFn<T, M>: Send + Sync + 'static {
    /// Whether the callable wants the receiver at stack position 1 resolved.
    const RECEIVER: bool;

    fn call(&self, lua: &Lua, this: Option<&mut T>, args: MultiValue)
    -> mlua::Result<MultiValue>;

    fn signature() -> Signature;
}

impl<T, F> ManualFn<T, Context> for F
where
    T: 'static,
    F: Fn(&Lua, MultiValue) -> mlua::Result<MultiValue> + Send + Sync + 'static,
{
    const RECEIVER: bool = false;

    fn call(
        &self,
        lua: &Lua,
        _this: Option<&mut T>,
        args: MultiValue,
    ) -> mlua::Result<MultiValue> {
        (self)(lua, args)
    }

    fn signature() -> Signature {
        Signature::new(
            CallableKind::FreeFunctionManual,
            None,
            vec![type_name::<MultiValue>()],
            type_name::<MultiValue>(),
        )
    }
}

impl<T, F> ManualFn<T, WithReceiver> for F
where
    T: 'static,
    F: Fn(&Lua, Option<&mut T>, MultiValue) -> mlua::Result<MultiValue> + Send + Sync + 'static,
{
    const RECEIVER: bool = true;

    fn call(&self, lua: &Lua, this: Option<&mut T>, args: MultiValue) -> mlua::Result<MultiValue> {
        (self)(lua, this, args)
    }

    fn signature() -> Signature {
        Signature::new(
            CallableKind::FreeFunctionManual,
            Some(type_name::<T>()),
            vec![type_name::<MultiValue>()],
            type_name::<MultiValue>(),
        )
    }
}

/// Read the argument at `args[*index]`, advancing the cursor.
///
/// Missing trailing arguments read as `nil`.
fn gather<A: FromScript>(args: &[Value], index: &mut usize) -> Result<A, ArgumentError> {
    let slot = *index;
    *index += 1;
    let converted = match args.get(slot) {
        Some(value) => A::from_script(value),
        None => A::from_script(&Value::Nil),
    };
    converted.map_err(|source| ArgumentError {
        position: slot + 1,
        source,
    })
}

/// Fail if an argument is a handle to the receiver in `args[0]`.
fn ensure_unaliased<T: 'static>(this: NonNull<T>, args: &[Value]) -> Result<(), ArgumentError> {
    let Some(receiver) = args.first() else {
        return Ok(());
    };
    match args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, value)| aliases(value, receiver, this))
    {
        Some((slot, _)) => Err(ArgumentError {
            position: slot + 1,
            source: ConversionError::AliasedReceiver {
                target_type: type_name::<T>(),
            },
        }),
        None => Ok(()),
    }
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! impl_signatures {
    ($($arg:ident),*) => {
        impl<T, F, R, $($arg,)*> MethodFn<T, (ByMut, ($($arg,)*), R)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromScript,)*
        {
            type Output = R;

            const ARITY: usize = count!($($arg)*);

            #[allow(non_snake_case, unused_mut, unused_variables)]
            unsafe fn call(&self, mut this: NonNull<T>, args: &[Value]) -> Result<R, ArgumentError> {
                ensure_unaliased(this, args)?;
                let mut index = 1;
                $(let $arg = gather::<$arg>(args, &mut index)?;)*
                // SAFETY: live and unborrowed per the caller; no argument
                // refers to the same instance.
                Ok((self)(unsafe { this.as_mut() }, $($arg),*))
            }

            fn signature() -> Signature {
                Signature::new(
                    CallableKind::MemberFunction,
                    Some(type_name::<T>()),
                    vec![$(type_name::<$arg>()),*],
                    type_name::<R>(),
                )
            }
        }

        impl<T, F, R, $($arg,)*> MethodFn<T, (ByRef, ($($arg,)*), R)> for F
        where
            T: 'static,
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromScript,)*
        {
            type Output = R;

            const ARITY: usize = count!($($arg)*);

            #[allow(non_snake_case, unused_mut, unused_variables)]
            unsafe fn call(&self, this: NonNull<T>, args: &[Value]) -> Result<R, ArgumentError> {
                let mut index = 1;
                $(let $arg = gather::<$arg>(args, &mut index)?;)*
                // SAFETY: live per the caller; shared access only.
                Ok((self)(unsafe { this.as_ref() }, $($arg),*))
            }

            fn signature() -> Signature {
                Signature::new(
                    CallableKind::MemberFunction,
                    Some(type_name::<T>()),
                    vec![$(type_name::<$arg>()),*],
                    type_name::<R>(),
                )
            }
        }

        impl<F, R, $($arg,)*> FunctionFn<(($($arg,)*), R)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromScript,)*
        {
            type Output = R;

            const ARITY: usize = count!($($arg)*);

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, args: &[Value]) -> Result<R, ArgumentError> {
                let mut index = 0;
                $(let $arg = gather::<$arg>(args, &mut index)?;)*
                Ok((self)($($arg),*))
            }

            fn signature() -> Signature {
                Signature::new(
                    CallableKind::FreeFunctionGenerated,
                    None,
                    vec![$(type_name::<$arg>()),*],
                    type_name::<R>(),
                )
            }
        }
    };
}

impl_signatures!();
impl_signatures!(A1);
impl_signatures!(A1, A2);
impl_signatures!(A1, A2, A3);
impl_signatures!(A1, A2, A3, A4);
impl_signatures!(A1, A2, A3, A4, A5);
impl_signatures!(A1, A2, A3, A4, A5, A6);
impl_signatures!(A1, A2, A3, A4, A5, A6, A7);
impl_signatures!(A1, A2, A3, A4, A5, A6, A7, A8);
