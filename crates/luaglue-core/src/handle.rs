//! Script handles referencing native instances.
//!
//! Every native instance pushed into a VM becomes a [`Handle`] userdata. All
//! classes share the handle's metatable; lookups are routed to the per-class
//! tables described in [`registry`](crate::registry):
//!
//! ```text
//! obj.key        methods[key] -> __getters[key](obj, key) -> meta.__index -> nil
//! obj.key = v    __setters[key](obj, key, v), otherwise dropped
//! a + b, ...     meta.__add(a, b), ...
//! collection     finalizer(ptr) if this handle owns the instance
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::iter;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use mlua::{AnyUserData, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value};
use tracing::trace;

use crate::class::{BoundType, ClassIdentity, NativeClass, OwnershipToken};
use crate::error::BindError;
use crate::operator::Operator;
use crate::registry::{self, GETTERS, SETTERS};

/// Userdata referencing one native instance.
pub struct Handle {
    ptr: *mut (),
    class: Arc<BoundType>,
    identity: Arc<ClassIdentity>,
    owned: Option<OwnershipToken>,
}

impl Handle {
    pub fn class(&self) -> &Arc<BoundType> {
        &self.class
    }

    pub fn identity(&self) -> &ClassIdentity {
        &self.identity
    }

    pub fn address(&self) -> *mut () {
        self.ptr
    }

    /// Whether collecting this handle finalizes the instance.
    pub fn is_owned(&self) -> bool {
        self.owned
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Acquire))
    }

    /// The instance as a `T`, following upcasts recorded by inheritance.
    pub fn cast<T: 'static>(&self) -> Option<NonNull<T>> {
        let target = TypeId::of::<T>();
        let ptr = if self.class.rust_type_id() == target {
            self.ptr
        } else {
            (self.class.upcast(target)?)(self.ptr)
        };
        NonNull::new(ptr.cast::<T>())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:p})", self.identity.name, self.ptr)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let Some(token) = self.owned.take() else {
            return;
        };
        if self.class.release_ownership(self.ptr as usize, &token) {
            trace!(class = %self.identity.name, address = ?self.ptr, "finalizing native instance");
            self.class.finalize(self.ptr);
        }
    }
}

impl UserData for Handle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_function(MetaMethod::Index, |lua, (object, key): (AnyUserData, Value)| {
            index(lua, object, key)
        });
        methods.add_meta_function(
            MetaMethod::NewIndex,
            |lua, (object, key, values): (AnyUserData, Value, MultiValue)| {
                new_index(lua, object, key, values)
            },
        );
        methods.add_meta_method(MetaMethod::ToString, |_, handle, ()| Ok(handle.to_string()));
        for op in Operator::ALL {
            methods.add_meta_function(op.metamethod(), move |lua, args: MultiValue| {
                operator(lua, op, args)
            });
        }
    }
}

// ============================================================================
// Push / check
// ============================================================================

/// Push `instance` as a handle.
///
/// A null pointer pushes `nil`. With `transfer`, the VM finalizes the
/// instance once the last owning handle is collected.
///
/// # Safety
///
/// `instance` must be null or point to a live `T` that outlives every
/// non-owning handle to it; with `transfer` it must be freeable by the
/// class's current finalizer.
pub unsafe fn push<T: NativeClass>(
    lua: &Lua,
    instance: *mut T,
    transfer: bool,
) -> Result<Value, BindError> {
    if instance.is_null() {
        return Ok(Value::Nil);
    }
    let class = BoundType::of::<T>();
    let identity = class.identity().ok_or(BindError::Unbound {
        rust_type: type_name::<T>(),
    })?;
    if registry::metatable(lua, &identity).is_err() {
        return Err(BindError::MissingMetatable {
            class: identity.name.clone(),
            table: identity.mt_name.clone(),
        });
    }

    let object = lua.create_userdata(Handle {
        ptr: instance.cast::<()>(),
        class: Arc::clone(&class),
        identity,
        owned: None,
    })?;
    if transfer {
        object.borrow_mut::<Handle>()?.owned = Some(class.take_ownership(instance as usize));
    }
    Ok(Value::UserData(object))
}

/// Push a boxed instance, transferring ownership to the VM.
pub fn push_owned<T: NativeClass>(lua: &Lua, instance: Box<T>) -> Result<Value, BindError> {
    let raw = Box::into_raw(instance);
    // SAFETY: a fresh box is live and freed by the default finalizer.
    match unsafe { push(lua, raw, true) } {
        Ok(value) => Ok(value),
        Err(err) => {
            // SAFETY: the push failed, so nothing else refers to `raw`.
            drop(unsafe { Box::from_raw(raw) });
            Err(err)
        }
    }
}

/// The `T` instance referenced by `value`, if it is one.
pub fn check<T: NativeClass>(value: &Value) -> Option<NonNull<T>> {
    let Value::UserData(object) = value else {
        return None;
    };
    object.borrow::<Handle>().ok()?.cast::<T>()
}

/// Whether `value` is a handle to the instance behind the handle `receiver`,
/// either at the same address or upcast to the receiver's `this`.
pub(crate) fn aliases<T: 'static>(value: &Value, receiver: &Value, this: NonNull<T>) -> bool {
    let Value::UserData(object) = value else {
        return false;
    };
    let Ok(handle) = object.borrow::<Handle>() else {
        return false;
    };
    let same_address = match receiver {
        Value::UserData(receiver) => receiver
            .borrow::<Handle>()
            .is_ok_and(|receiver| receiver.ptr == handle.ptr),
        _ => false,
    };
    same_address || handle.cast::<T>() == Some(this)
}

// ============================================================================
// Metamethods
// ============================================================================

fn single(value: Value) -> MultiValue {
    iter::once(value).collect()
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.type_name().to_string(),
    }
}

fn accessor_error(identity: &ClassIdentity, meta: &str, key: &Value, err: mlua::Error) -> mlua::Error {
    mlua::Error::RuntimeError(format!(
        "{}.{meta} for {}: {err}",
        identity.name,
        describe_key(key)
    ))
}

/// The accessor sub-tables live in the methods table but are not members.
fn is_accessor_key(key: &Value) -> bool {
    match key {
        Value::String(s) => {
            let bytes = s.as_bytes();
            [GETTERS, SETTERS]
                .iter()
                .any(|reserved| &*bytes == reserved.as_bytes())
        }
        _ => false,
    }
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn index(lua: &Lua, object: AnyUserData, key: Value) -> mlua::Result<MultiValue> {
    let identity = Arc::clone(&object.borrow::<Handle>()?.identity);
    let Value::Table(methods) = lua.globals().raw_get::<Value>(identity.mt_name.as_str())? else {
        return Ok(single(Value::Nil));
    };

    if !is_accessor_key(&key) {
        let direct: Value = methods.raw_get(key.clone())?;
        if !direct.is_nil() {
            return Ok(single(direct));
        }
    }

    if let Value::Table(getters) = methods.raw_get::<Value>(GETTERS)? {
        if let Value::Function(getter) = getters.raw_get::<Value>(key.clone())? {
            return getter
                .call::<MultiValue>((object, key.clone()))
                .map_err(|err| accessor_error(&identity, "__index", &key, err));
        }
    }

    if let Value::Table(meta) = lua.named_registry_value::<Value>(&identity.mt_name)? {
        match meta.raw_get::<Value>("__index")? {
            Value::Table(fallback) => return Ok(single(fallback.raw_get::<Value>(key)?)),
            Value::Function(fallback) => return fallback.call::<MultiValue>((meta, key)),
            _ => {}
        }
    }
    Ok(single(Value::Nil))
}

fn new_index(lua: &Lua, object: AnyUserData, key: Value, values: MultiValue) -> mlua::Result<()> {
    let identity = Arc::clone(&object.borrow::<Handle>()?.identity);
    let Value::Table(methods) = lua.globals().raw_get::<Value>(identity.mt_name.as_str())? else {
        return Ok(());
    };
    let Value::Table(setters) = methods.raw_get::<Value>(SETTERS)? else {
        return Ok(());
    };
    let Value::Function(setter) = setters.raw_get::<Value>(key.clone())? else {
        return Ok(());
    };

    let mut args = vec![Value::UserData(object), key.clone()];
    args.extend(values);
    setter
        .call::<()>(args.into_iter().collect::<MultiValue>())
        .map_err(|err| accessor_error(&identity, "__newindex", &key, err))
}

fn instance_identity(value: &Value) -> Option<(Arc<ClassIdentity>, *mut ())> {
    let Value::UserData(object) = value else {
        return None;
    };
    let handle = object.borrow::<Handle>().ok()?;
    Some((Arc::clone(&handle.identity), handle.ptr))
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn operator(lua: &Lua, op: Operator, args: MultiValue) -> mlua::Result<MultiValue> {
    let operands: Vec<_> = args.iter().take(2).map(instance_identity).collect();
    let Some((identity, _)) = operands.iter().flatten().next().cloned() else {
        return Err(mlua::Error::RuntimeError(format!(
            "{op} invoked without a native instance"
        )));
    };

    if let Value::Table(meta) = lua.named_registry_value::<Value>(&identity.mt_name)? {
        if let Value::Function(bound) = meta.raw_get::<Value>(op.metamethod())? {
            return bound.call::<MultiValue>(args);
        }
    }

    // Without a bound __eq, two handles are equal when they share an instance.
    if op == Operator::Equals {
        let same = match operands.as_slice() {
            [Some((_, a)), Some((_, b))] => a == b,
            _ => false,
        };
        return Ok(single(Value::Boolean(same)));
    }
    Err(mlua::Error::RuntimeError(format!(
        "{} has no {op} operator bound",
        identity.name
    )))
}
