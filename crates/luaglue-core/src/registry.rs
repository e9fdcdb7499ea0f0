//! Per-VM tables backing each registered class.
//!
//! Registering a class named `Point` creates, once per VM:
//!
//! ```text
//! _G.Point_mt                  methods table (script visible)
//!   ├── __getters              key -> getter(instance, key)
//!   └── __setters              key -> setter(instance, key, value)
//! registry["Point_mt"]         metatable
//!   ├── __metatable = Point_mt
//!   ├── __name = "Point"
//!   └── __init, __add, ...     constructors and operators
//! ```

use std::sync::Arc;

use mlua::{Lua, Table, Value};
use tracing::{debug, error};

use crate::class::{BoundType, ClassIdentity, NativeClass};
use crate::error::BindError;
use crate::lifecycle;

/// Key of the getters sub-table.
pub const GETTERS: &str = "__getters";

/// Key of the setters sub-table.
pub const SETTERS: &str = "__setters";

/// Register `T` under `name` in this VM.
///
/// Registration happens once per VM; later calls only return the identity.
pub fn register<T: NativeClass>(lua: &Lua, name: &str) -> Result<Arc<ClassIdentity>, BindError> {
    let class = BoundType::of::<T>();
    let _guard = class.lock_registration();
    let identity = class.bind_name(name);

    if is_registered(lua, &identity)? {
        return Ok(identity);
    }

    let methods = lua.create_table()?;
    methods.raw_set(GETTERS, lua.create_table()?)?;
    methods.raw_set(SETTERS, lua.create_table()?)?;

    let meta = lua.create_table()?;
    meta.raw_set("__metatable", methods.clone())?;
    meta.raw_set("__name", identity.name.as_str())?;

    lua.globals().raw_set(identity.mt_name.as_str(), methods)?;
    lua.set_named_registry_value(&identity.mt_name, meta)?;

    lifecycle::record_teardown(&class);
    debug!(
        class = %identity.name,
        rust_type = class.rust_name(),
        "registered native class"
    );
    Ok(identity)
}

/// Whether the class's methods table exists in this VM.
pub fn is_registered(lua: &Lua, identity: &ClassIdentity) -> Result<bool, BindError> {
    let methods: Value = lua.globals().raw_get(identity.mt_name.as_str())?;
    Ok(!methods.is_nil())
}

/// The class's methods table.
pub fn methods_table(lua: &Lua, identity: &ClassIdentity) -> Result<Table, BindError> {
    match lua.globals().raw_get::<Value>(identity.mt_name.as_str())? {
        Value::Table(methods) => Ok(methods),
        _ => Err(order_error(identity, identity.mt_name.clone())),
    }
}

/// The class's metatable.
pub fn metatable(lua: &Lua, identity: &ClassIdentity) -> Result<Table, BindError> {
    match lua.named_registry_value::<Value>(&identity.mt_name)? {
        Value::Table(meta) => Ok(meta),
        _ => Err(BindError::MissingMetatable {
            class: identity.name.clone(),
            table: identity.mt_name.clone(),
        }),
    }
}

/// The getters (`GETTERS`) or setters (`SETTERS`) sub-table.
pub fn accessor_table(lua: &Lua, identity: &ClassIdentity, which: &str) -> Result<Table, BindError> {
    match methods_table(lua, identity)?.raw_get::<Value>(which)? {
        Value::Table(table) => Ok(table),
        _ => Err(order_error(identity, format!("{}.{which}", identity.mt_name))),
    }
}

fn order_error(identity: &ClassIdentity, table: String) -> BindError {
    error!(class = %identity.name, table = %table, "binding before registration");
    BindError::missing_table(&identity.name, table)
}
