//! Declarative helpers for exposing user types.

/// Declare a Rust type as a native class.
///
/// `native_class!(T)` implements [`NativeClass`](crate::NativeClass) and lets
/// bound callables return `T` by value: the value moves to the heap and the
/// VM owns it. `native_class!(T: Clone)` additionally lets callables take `T`
/// by value, copying it out of the handle.
///
/// ```
/// use luaglue_core::{native_class, FromScript, mlua::Value};
///
/// #[derive(Clone)]
/// struct Vec2 {
///     x: f32,
///     y: f32,
/// }
///
/// native_class!(Vec2: Clone);
///
/// // Anything that is not a Vec2 handle is "object not found".
/// assert!(Vec2::from_script(&Value::Nil).is_err());
/// ```
#[macro_export]
macro_rules! native_class {
    ($ty:ty : Clone) => {
        $crate::native_class!($ty);

        impl $crate::FromScript for $ty {
            fn from_script(
                value: &$crate::mlua::Value,
            ) -> ::core::result::Result<Self, $crate::ConversionError> {
                <$crate::ClassRef<$ty> as $crate::FromScript>::from_script(value)
                    .map(|instance| ::core::clone::Clone::clone(&*instance))
            }
        }
    };
    ($ty:ty) => {
        impl $crate::NativeClass for $ty {}

        impl $crate::ToScript for $ty {
            fn to_script(
                self,
                lua: &$crate::mlua::Lua,
                _policy: $crate::ReturnPolicy,
            ) -> $crate::mlua::Result<$crate::mlua::Value> {
                $crate::push_owned(lua, ::std::boxed::Box::new(self))
                    .map_err(::core::convert::Into::into)
            }
        }
    };
}

/// Marshal a fieldless enum as its integer discriminant.
///
/// The enum derives `num_enum`'s `IntoPrimitive` and `TryFromPrimitive` with
/// the given representation. Numbers that name no variant fail to convert.
///
/// ```
/// use luaglue_core::{native_enum, FromScript, mlua::Value};
/// use num_enum::{IntoPrimitive, TryFromPrimitive};
///
/// #[derive(Debug, Clone, Copy, PartialEq, IntoPrimitive, TryFromPrimitive)]
/// #[repr(i32)]
/// enum Facing {
///     North = 0,
///     South = 1,
/// }
///
/// native_enum!(Facing: i32);
///
/// assert_eq!(Facing::from_script(&Value::Integer(1)).unwrap(), Facing::South);
/// assert!(Facing::from_script(&Value::Integer(7)).is_err());
/// ```
#[macro_export]
macro_rules! native_enum {
    ($ty:ty : $repr:ty) => {
        impl $crate::FromScript for $ty {
            fn from_script(
                value: &$crate::mlua::Value,
            ) -> ::core::result::Result<Self, $crate::ConversionError> {
                let raw = <$repr as $crate::FromScript>::from_script(value)?;
                <$ty as $crate::num_enum::TryFromPrimitive>::try_from_primitive(raw).map_err(
                    |_| $crate::ConversionError::InvalidDiscriminant {
                        value: raw as i64,
                        target_type: ::core::stringify!($ty),
                    },
                )
            }
        }

        impl $crate::ToScript for $ty {
            fn to_script(
                self,
                lua: &$crate::mlua::Lua,
                policy: $crate::ReturnPolicy,
            ) -> $crate::mlua::Result<$crate::mlua::Value> {
                <$repr as $crate::ToScript>::to_script(<$repr>::from(self), lua, policy)
            }
        }
    };
}
