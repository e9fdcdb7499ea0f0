//! Generated entry points between the VM and native callables.
//!
//! Every bound member owns one binding object. The object is captured by the
//! Lua function created in [`into_function`], so a call from the script finds
//! its callable without any registry lookup:
//!
//! ```text
//! script call -> Lua closure -> Trampoline::invoke
//!                                 ├── gather arguments (FromScript)
//!                                 ├── call the native callable
//!                                 └── push results (IntoResults)
//! ```

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, Value};

use crate::class::NativeClass;
use crate::convert::{FromScript, IntoResults, ToScript};
use crate::error::ArgumentError;
use crate::handle::{check, push_owned};
use crate::policy::ReturnPolicy;
use crate::signature::{CallableKind, FunctionFn, ManualFn, MethodFn, Signature};

/// A type-erased callable binding.
pub trait Trampoline: Send + Sync {
    /// Run the binding with the raw script arguments.
    fn invoke(&self, lua: &Lua, args: MultiValue) -> mlua::Result<MultiValue>;

    fn signature(&self) -> &Signature;
}

/// Create a Lua function that invokes `binding`.
pub fn into_function(lua: &Lua, binding: Arc<dyn Trampoline>) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| binding.invoke(lua, args))
}

fn nil_result() -> MultiValue {
    std::iter::once(Value::Nil).collect()
}

// ============================================================================
// Methods
// ============================================================================

/// Binding for a native method; the receiver is stack position 1.
pub struct MethodTrampoline<T, F, M> {
    callable: F,
    policy: ReturnPolicy,
    signature: Signature,
    _marker: PhantomData<fn(&mut T, M)>,
}

impl<T, F, M> MethodTrampoline<T, F, M>
where
    T: NativeClass,
    F: MethodFn<T, M>,
{
    pub fn new(callable: F, policy: ReturnPolicy) -> Self {
        Self {
            callable,
            policy,
            signature: F::signature(),
            _marker: PhantomData,
        }
    }
}

impl<T, F, M> Trampoline for MethodTrampoline<T, F, M>
where
    T: NativeClass,
    F: MethodFn<T, M>,
    F::Output: IntoResults,
    M: 'static,
{
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn invoke(&self, lua: &Lua, args: MultiValue) -> mlua::Result<MultiValue> {
        let args: Vec<Value> = args.into_iter().collect();
        let Some(receiver) = args.first().and_then(check::<T>) else {
            return Ok(nil_result());
        };
        // SAFETY: `check` only yields pointers recorded for live handles.
        let output = unsafe { self.callable.call(receiver, &args) }?;
        output.into_results(lua, self.policy)
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }
}

// ============================================================================
// Free functions
// ============================================================================

/// Binding for a free function with generated marshaling.
pub struct FunctionTrampoline<F, M> {
    callable: F,
    policy: ReturnPolicy,
    signature: Signature,
    _marker: PhantomData<fn(M)>,
}

impl<F, M> FunctionTrampoline<F, M>
where
    F: FunctionFn<M>,
{
    pub fn new(callable: F, policy: ReturnPolicy) -> Self {
        Self {
            callable,
            policy,
            signature: F::signature(),
            _marker: PhantomData,
        }
    }
}

impl<F, M> Trampoline for FunctionTrampoline<F, M>
where
    F: FunctionFn<M>,
    F::Output: IntoResults,
    M: 'static,
{
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn invoke(&self, lua: &Lua, args: MultiValue) -> mlua::Result<MultiValue> {
        let args: Vec<Value> = args.into_iter().collect();
        let output = self.callable.call(&args)?;
        output.into_results(lua, self.policy)
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Binding for a callable that marshals its own arguments.
pub struct ManualTrampoline<T, F, M> {
    callable: F,
    signature: Signature,
    _marker: PhantomData<fn(&mut T, M)>,
}

impl<T, F, M> ManualTrampoline<T, F, M>
where
    T: NativeClass,
    F: ManualFn<T, M>,
{
    pub fn new(callable: F) -> Self {
        Self {
            callable,
            signature: F::signature(),
            _marker: PhantomData,
        }
    }
}

impl<T, F, M> Trampoline for ManualTrampoline<T, F, M>
where
    T: NativeClass,
    F: ManualFn<T, M>,
    M: 'static,
{
    fn invoke(&self, lua: &Lua, args: MultiValue) -> mlua::Result<MultiValue> {
        let receiver = if F::RECEIVER {
            args.iter().next().and_then(check::<T>)
        } else {
            None
        };
        // SAFETY: `check` only yields pointers recorded for live handles.
        let this = receiver.map(|ptr| unsafe { &mut *ptr.as_ptr() });
        self.callable.call(lua, this, args)
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Binding for a constructor: the result moves to the heap and the VM owns it.
pub struct ConstructTrampoline<F, M> {
    factory: F,
    signature: Signature,
    _marker: PhantomData<fn(M)>,
}

impl<F, M> ConstructTrampoline<F, M>
where
    F: FunctionFn<M>,
    F::Output: NativeClass,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            signature: F::signature(),
            _marker: PhantomData,
        }
    }
}

impl<F, M> Trampoline for ConstructTrampoline<F, M>
where
    F: FunctionFn<M>,
    F::Output: NativeClass,
    M: 'static,
{
    fn invoke(&self, lua: &Lua, args: MultiValue) -> mlua::Result<MultiValue> {
        let args: Vec<Value> = args.into_iter().collect();
        let instance = self.factory.call(&args)?;
        let handle = push_owned(lua, Box::new(instance))?;
        Ok(std::iter::once(handle).collect())
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }
}

// ============================================================================
// Fields
// ============================================================================

/// Binding for a field, reached through a projection from the instance.
///
/// One binding produces both the getter and the setter closure.
pub struct FieldBinding<T, V> {
    project: fn(&mut T) -> &mut V,
}

impl<T, V> FieldBinding<T, V>
where
    T: NativeClass,
    V: 'static,
{
    pub fn new(project: fn(&mut T) -> &mut V) -> Self {
        Self { project }
    }

    pub fn signature(&self) -> Signature {
        Signature::new(
            CallableKind::MemberData,
            Some(type_name::<T>()),
            Vec::new(),
            type_name::<V>(),
        )
    }

    /// Read the field of the instance at stack position 1.
    ///
    /// Yields `nil` when position 1 is not an instance.
    pub fn get(&self, lua: &Lua, args: &[Value]) -> mlua::Result<Value>
    where
        V: Clone + ToScript,
    {
        let Some(receiver) = args.first().and_then(check::<T>) else {
            return Ok(Value::Nil);
        };
        // SAFETY: `check` only yields pointers recorded for live handles.
        let this = unsafe { &mut *receiver.as_ptr() };
        (self.project)(this).clone().to_script(lua, ReturnPolicy::Retain)
    }

    /// Assign the value at stack position 3 to the instance at position 1.
    pub fn set(&self, args: &[Value]) -> mlua::Result<()>
    where
        V: FromScript,
    {
        let Some(receiver) = args.first().and_then(check::<T>) else {
            return Ok(());
        };
        let value = match args.get(2) {
            Some(value) => V::from_script(value),
            None => V::from_script(&Value::Nil),
        }
        .map_err(|source| ArgumentError {
            position: 3,
            source,
        })?;
        // SAFETY: `check` only yields pointers recorded for live handles.
        let this = unsafe { &mut *receiver.as_ptr() };
        *(self.project)(this) = value;
        Ok(())
    }

    /// Lua function called as `getter(instance, key)`.
    pub fn getter(self: &Arc<Self>, lua: &Lua) -> mlua::Result<Function>
    where
        V: Clone + ToScript,
    {
        let binding = Arc::clone(self);
        lua.create_function(move |lua, args: MultiValue| {
            let args: Vec<Value> = args.into_iter().collect();
            binding.get(lua, &args)
        })
    }

    /// Lua function called as `setter(instance, key, value)`.
    pub fn setter(self: &Arc<Self>, lua: &Lua) -> mlua::Result<Function>
    where
        V: FromScript,
    {
        let binding = Arc::clone(self);
        lua.create_function(move |_, args: MultiValue| {
            let args: Vec<Value> = args.into_iter().collect();
            binding.set(&args)
        })
    }
}
