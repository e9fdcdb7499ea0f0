//! Recipes describing what to bind under a member name.
//!
//! A recipe fixes the callable shape at the call site; the builder only
//! decides the name and the ownership policy:
//!
//! ```ignore
//! ClassBuilder::<Point>::new(&lua, "Point")?
//!     .add("scale", method(Point::scale))?              // MemberFunction
//!     .add("origin", function(Point::origin))?          // FreeFunctionGenerated
//!     .add("dump", manual(dump_point))?                 // FreeFunctionManual
//!     .add("peek", manual_with_receiver(|_, this, _| ..))? // ..with the receiver
//!     .add("x", field!(Point, x))?;                     // MemberData
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use luaglue_core::mlua::{self, Lua, MultiValue};
use luaglue_core::signature::WithReceiver;
use luaglue_core::trampoline::{FunctionTrampoline, ManualTrampoline, MethodTrampoline};
use luaglue_core::{
    CallableKind, FunctionFn, IntoResults, ManualFn, MethodFn, NativeClass, ReturnPolicy,
    Signature, Trampoline,
};

type Build = Box<dyn FnOnce(ReturnPolicy) -> Arc<dyn Trampoline>>;

/// A callable member of `T`, built lazily when first bound.
pub struct Member<T> {
    kind: CallableKind,
    signature: Signature,
    build: Build,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Member<T> {
    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn into_parts(self) -> (Signature, Build) {
        (self.signature, self.build)
    }
}

/// Bind a method of `T`; the script calls it as `obj:name(...)`.
///
/// Called on anything other than a `T` instance it returns `nil`.
pub fn method<T, M, F>(callable: F) -> Member<T>
where
    T: NativeClass,
    F: MethodFn<T, M>,
    F::Output: IntoResults,
    M: 'static,
{
    Member {
        kind: CallableKind::MemberFunction,
        signature: F::signature(),
        build: Box::new(move |policy: ReturnPolicy| -> Arc<dyn Trampoline> {
            Arc::new(MethodTrampoline::new(callable, policy))
        }),
        _marker: PhantomData,
    }
}

/// Bind a free function with generated argument marshaling.
pub fn function<T, M, F>(callable: F) -> Member<T>
where
    T: NativeClass,
    F: FunctionFn<M>,
    F::Output: IntoResults,
    M: 'static,
{
    Member {
        kind: CallableKind::FreeFunctionGenerated,
        signature: F::signature(),
        build: Box::new(move |policy: ReturnPolicy| -> Arc<dyn Trampoline> {
            Arc::new(FunctionTrampoline::new(callable, policy))
        }),
        _marker: PhantomData,
    }
}

/// Bind a callable that reads its arguments from the VM itself.
///
/// Either `Fn(&Lua, MultiValue)` or `Fn(&Lua, Option<&mut T>, MultiValue)`;
/// the second form also receives the instance at stack position 1. The
/// callable returns exactly the values it wants pushed.
pub fn manual<T, M, F>(callable: F) -> Member<T>
where
    T: NativeClass,
    F: ManualFn<T, M>,
    M: 'static,
{
    Member {
        kind: CallableKind::FreeFunctionManual,
        signature: F::signature(),
        build: Box::new(move |_: ReturnPolicy| -> Arc<dyn Trampoline> {
            Arc::new(ManualTrampoline::new(callable))
        }),
        _marker: PhantomData,
    }
}

/// [`manual`] restricted to the receiver-taking form.
///
/// Useful for closures, whose parameter types are otherwise ambiguous.
pub fn manual_with_receiver<T, F>(callable: F) -> Member<T>
where
    T: NativeClass,
    F: Fn(&Lua, Option<&mut T>, MultiValue) -> mlua::Result<MultiValue> + Send + Sync + 'static,
{
    manual::<T, WithReceiver, F>(callable)
}

/// A field of `T` reached through a projection.
pub struct Field<T, V> {
    project: fn(&mut T) -> &mut V,
}

impl<T, V> Field<T, V> {
    pub fn new(project: fn(&mut T) -> &mut V) -> Self {
        Self { project }
    }

    pub(crate) fn projection(&self) -> fn(&mut T) -> &mut V {
        self.project
    }
}

/// Build a [`Field`] for a named (or tuple) field.
///
/// ```ignore
/// .add("x", field!(Point, x))?
/// .add_readonly("id", field!(Entity, 0))?
/// ```
#[macro_export]
macro_rules! field {
    ($ty:ty, $name:tt) => {
        $crate::Field::<$ty, _>::new(|this: &mut $ty| &mut this.$name)
    };
}
