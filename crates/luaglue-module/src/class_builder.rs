//! ClassBuilder for exposing a native type to a Lua VM.
//!
//! ClassBuilder registers the class on construction (once per VM) and then
//! binds members one by one. Every binding method consumes the builder and
//! returns it again so calls chain with `?`.
//!
//! # Example
//!
//! ```ignore
//! ClassBuilder::<Point>::new(&lua, "Point")?
//!     .constructor(Point::new)?
//!     .add("scale", method(Point::scale))?
//!     .add("x", field!(Point, x))?
//!     .add_readonly("len", field!(Point, len))?
//!     .op_add(function(ops::add::<Point, Point>))?
//!     .destructor(free_point);
//!
//! lua.load("local p = Point(3.0); p:scale(2.0); assert(p.x == 6.0)").exec()?;
//! ```

use std::any::{TypeId, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

use luaglue_core::mlua::{Function, Lua, Table, Value};
use luaglue_core::registry::{self, GETTERS, SETTERS};
use luaglue_core::trampoline::{ConstructTrampoline, FieldBinding};
use luaglue_core::{
    Access, BindError, BoundType, ClassIdentity, Destructor, FromScript, FunctionFn, MemberDoc,
    MemberRole, NativeClass, Operator, ReturnPolicy, ToScript, Trampoline, into_function,
};
use tracing::debug;

use crate::member::{Field, Member};

/// Metatable keys that describe the class itself and are never inherited.
const OWN_META_KEYS: [&str; 3] = ["__metatable", "__name", "__init"];

/// Something that can be bound under a member name with [`ClassBuilder::add`].
///
/// Implemented by [`Member`] (callables) and [`Field`] (member data).
pub trait Bindable<T: NativeClass> {
    fn bind(
        self,
        builder: &ClassBuilder<'_, T>,
        name: &str,
        policy: ReturnPolicy,
    ) -> Result<(), BindError>;
}

impl<T: NativeClass> Bindable<T> for Member<T> {
    fn bind(
        self,
        builder: &ClassBuilder<'_, T>,
        name: &str,
        policy: ReturnPolicy,
    ) -> Result<(), BindError> {
        let methods = registry::methods_table(builder.lua, &builder.identity)?;
        let function = builder.callable(name, self, policy, MemberRole::Callable)?;
        methods.raw_set(name, function)?;
        Ok(())
    }
}

impl<T, V> Bindable<T> for Field<T, V>
where
    T: NativeClass,
    V: Clone + ToScript + FromScript + 'static,
{
    fn bind(
        self,
        builder: &ClassBuilder<'_, T>,
        name: &str,
        _policy: ReturnPolicy,
    ) -> Result<(), BindError> {
        let getters = registry::accessor_table(builder.lua, &builder.identity, GETTERS)?;
        let setters = registry::accessor_table(builder.lua, &builder.identity, SETTERS)?;
        let binding = builder.field(name, &self, Access::READ | Access::WRITE);
        getters.raw_set(name, binding.getter(builder.lua)?)?;
        setters.raw_set(name, binding.setter(builder.lua)?)?;
        Ok(())
    }
}

/// Builder binding the members of `T` into one VM.
///
/// # Type Parameters
///
/// - `'lua`: Lifetime of the borrowed VM
/// - `T`: The Rust type being exposed (must implement `NativeClass`)
pub struct ClassBuilder<'lua, T: NativeClass> {
    lua: &'lua Lua,
    class: Arc<BoundType>,
    identity: Arc<ClassIdentity>,
    _marker: PhantomData<fn() -> T>,
}

impl<'lua, T: NativeClass> ClassBuilder<'lua, T> {
    /// Register `T` as `name` in `lua` and start binding members.
    ///
    /// Registration is idempotent per VM; building the same class again only
    /// adds or replaces members.
    pub fn new(lua: &'lua Lua, name: &str) -> Result<Self, BindError> {
        let identity = registry::register::<T>(lua, name)?;
        Ok(Self {
            lua,
            class: BoundType::of::<T>(),
            identity,
            _marker: PhantomData,
        })
    }

    /// Display name of the class.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn class(&self) -> &Arc<BoundType> {
        &self.class
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Bind a callable or a field under `name`.
    ///
    /// Callables are reached as `obj:name(...)`; fields as `obj.name`, which
    /// reads and writes through the field's getter and setter. Class
    /// instances returned by callables stay owned by native code.
    pub fn add<B: Bindable<T>>(self, name: &str, member: B) -> Result<Self, BindError> {
        member.bind(&self, name, ReturnPolicy::Retain)?;
        Ok(self)
    }

    /// Bind a callable whose returned class instances follow `policy`.
    ///
    /// The policy is fixed when `name` is first bound for this class.
    pub fn add_with_policy(
        self,
        name: &str,
        member: Member<T>,
        policy: ReturnPolicy,
    ) -> Result<Self, BindError> {
        member.bind(&self, name, policy)?;
        Ok(self)
    }

    /// Bind a field that scripts can read but not assign.
    pub fn add_readonly<V>(self, name: &str, field: Field<T, V>) -> Result<Self, BindError>
    where
        V: Clone + ToScript + 'static,
    {
        let getters = registry::accessor_table(self.lua, &self.identity, GETTERS)?;
        let binding = self.field(name, &field, Access::READ);
        getters.raw_set(name, binding.getter(self.lua)?)?;
        Ok(self)
    }

    /// Bind a field that scripts can assign but not read.
    pub fn add_writeonly<V>(self, name: &str, field: Field<T, V>) -> Result<Self, BindError>
    where
        V: FromScript + 'static,
    {
        let setters = registry::accessor_table(self.lua, &self.identity, SETTERS)?;
        let binding = self.field(name, &field, Access::WRITE);
        setters.raw_set(name, binding.setter(self.lua)?)?;
        Ok(self)
    }

    // ========================================================================
    // Lifetime
    // ========================================================================

    /// Replace the finalizer used for instances the VM owns.
    ///
    /// The default finalizer drops a `Box<T>`. Pair a custom destructor with
    /// [`custom_constructor`](Self::custom_constructor) when instances come
    /// from a different allocator.
    ///
    /// ```compile_fail
    /// # use luaglue_module::ClassBuilder;
    /// # use luaglue_core::{mlua::Lua, NativeClass};
    /// struct Door;
    /// impl NativeClass for Door {}
    /// impl Door {
    ///     fn close(&mut self) {}
    /// }
    ///
    /// let lua = Lua::new();
    /// let builder = ClassBuilder::<Door>::new(&lua, "Door").unwrap();
    /// builder.destructor(Door::close);
    /// ```
    pub fn destructor<D: Destructor<T>>(self, destructor: D) -> Self {
        self.class.set_finalizer(Arc::new(move |instance: *mut ()| {
            destructor.destroy(instance.cast::<T>())
        }));
        debug!(class = %self.identity.name, "custom destructor installed");
        self
    }

    /// Expose `factory` as `Name(...)` and as the metatable's `__init`.
    ///
    /// The constructed value moves to the heap and the VM owns it.
    pub fn constructor<F, M>(self, factory: F) -> Result<Self, BindError>
    where
        F: FunctionFn<M, Output = T>,
        M: 'static,
    {
        self.class.document(MemberDoc::callable(
            &self.identity.name,
            MemberRole::Constructor,
            F::signature(),
        ));
        let binding: Arc<dyn Trampoline> = Arc::new(ConstructTrampoline::new(factory));
        self.expose_constructor(binding)?;
        Ok(self)
    }

    /// Expose `T::default()` as a zero-argument constructor.
    pub fn default_constructor(self) -> Result<Self, BindError>
    where
        T: Default,
    {
        self.constructor(T::default)
    }

    /// Expose a user factory as `Name(...)` and as `__init`.
    ///
    /// Returned instances are collected by the VM through the class's
    /// current finalizer.
    pub fn custom_constructor(self, factory: Member<T>) -> Result<Self, BindError> {
        let function = self.callable(
            "__init",
            factory,
            ReturnPolicy::Collect,
            MemberRole::Constructor,
        )?;
        let meta = registry::metatable(self.lua, &self.identity)?;
        meta.raw_set("__init", function.clone())?;
        self.lua
            .globals()
            .raw_set(self.identity.name.as_str(), function)?;
        Ok(self)
    }

    fn expose_constructor(&self, binding: Arc<dyn Trampoline>) -> Result<(), BindError> {
        let meta = registry::metatable(self.lua, &self.identity)?;
        let function = into_function(self.lua, binding)?;
        meta.raw_set("__init", function.clone())?;
        self.lua
            .globals()
            .raw_set(self.identity.name.as_str(), function)?;
        Ok(())
    }

    // ========================================================================
    // Operators
    // ========================================================================

    /// Bind `member` as the handler of `op`.
    ///
    /// Class instances returned by operators are owned by the VM.
    pub fn operator(self, op: Operator, member: Member<T>) -> Result<Self, BindError> {
        let meta = registry::metatable(self.lua, &self.identity)?;
        let function = self.callable(
            op.metamethod(),
            member,
            ReturnPolicy::Collect,
            MemberRole::Operator,
        )?;
        meta.raw_set(op.metamethod(), function)?;
        Ok(self)
    }

    pub fn op_add(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Add, member)
    }

    pub fn op_sub(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Subtract, member)
    }

    /// Unary minus.
    pub fn op_unm(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Negate, member)
    }

    pub fn op_mul(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Multiply, member)
    }

    pub fn op_div(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Divide, member)
    }

    pub fn op_mod(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Modulus, member)
    }

    pub fn op_pow(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Power, member)
    }

    pub fn op_concat(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Concatenate, member)
    }

    /// Equality; without it two handles are equal when they share an instance.
    pub fn op_eq(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Equals, member)
    }

    pub fn op_lt(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::LessThan, member)
    }

    pub fn op_le(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::LessOrEqual, member)
    }

    /// Calling an instance: `obj(...)`.
    pub fn op_call(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Call, member)
    }

    /// Length: `#obj`.
    pub fn op_len(self, member: Member<T>) -> Result<Self, BindError> {
        self.operator(Operator::Length, member)
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    /// Copy everything currently bound on `P` into this class.
    ///
    /// Methods, field accessors and operators bound on `P` so far become
    /// available on `T`; members bound on `P` later are not. Only
    /// string-keyed entries are copied. Inherited callables receive the `P`
    /// part of a `T` instance through `AsMut`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn inherit<P: NativeClass>(self) -> Result<Self, BindError>
    where
        T: AsMut<P>,
    {
        if TypeId::of::<P>() == TypeId::of::<T>() {
            return Ok(self);
        }
        let parent = BoundType::of::<P>();
        let parent_identity = parent.identity().ok_or(BindError::Unbound {
            rust_type: type_name::<P>(),
        })?;

        let parent_methods = registry::methods_table(self.lua, &parent_identity)?;
        let methods = registry::methods_table(self.lua, &self.identity)?;
        for pair in parent_methods.pairs::<Value, Value>() {
            let (key, value) = pair?;
            let Value::String(name) = &key else {
                continue;
            };
            let name = name.to_string_lossy().to_string();
            if name == GETTERS || name == SETTERS {
                if let Value::Table(inherited) = value {
                    let own = registry::accessor_table(self.lua, &self.identity, &name)?;
                    copy_string_keys(&inherited, &own, &[])?;
                }
                continue;
            }
            methods.raw_set(key, value)?;
        }

        let parent_meta = registry::metatable(self.lua, &parent_identity)?;
        let meta = registry::metatable(self.lua, &self.identity)?;
        copy_string_keys(&parent_meta, &meta, &OWN_META_KEYS)?;

        self.class.add_upcast::<T, P>(&parent);
        debug!(
            class = %self.identity.name,
            parent = %parent_identity.name,
            "inherited parent members"
        );
        Ok(self)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn callable(
        &self,
        name: &str,
        member: Member<T>,
        policy: ReturnPolicy,
        role: MemberRole,
    ) -> Result<Function, BindError> {
        let (signature, build) = member.into_parts();
        self.class.document(MemberDoc::callable(name, role, signature));
        let binding = self.class.cached_callable(name, || build(policy));
        debug!(
            class = %self.identity.name,
            member = name,
            kind = %binding.signature().kind,
            "bound callable"
        );
        Ok(into_function(self.lua, binding)?)
    }

    fn field<V: 'static>(
        &self,
        name: &str,
        field: &Field<T, V>,
        access: Access,
    ) -> Arc<FieldBinding<T, V>> {
        let project = field.projection();
        let binding = self
            .class
            .cached_field(name, || FieldBinding::<T, V>::new(project));
        self.class
            .document(MemberDoc::field(name, access, binding.signature()));
        debug!(class = %self.identity.name, member = name, "bound field");
        binding
    }
}

fn copy_string_keys(from: &Table, into: &Table, skip: &[&str]) -> Result<(), BindError> {
    for pair in from.pairs::<Value, Value>() {
        let (key, value) = pair?;
        let Value::String(name) = &key else {
            continue;
        };
        if skip.iter().any(|s| name.to_string_lossy() == *s) {
            continue;
        }
        into.raw_set(key, value)?;
    }
    Ok(())
}
