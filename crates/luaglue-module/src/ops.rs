//! Generic operator wrappers for binding with [`function`](crate::function).
//!
//! Each helper forwards to the matching `std::ops` / `std::cmp` trait so an
//! existing Rust operator can be bound without writing a closure:
//!
//! ```ignore
//! ClassBuilder::<Vec2>::new(&lua, "Vec2")?
//!     .op_add(function(ops::add::<Vec2, Vec2>))?
//!     .op_mul(function(ops::mul::<Vec2, f32>))?
//!     .op_unm(function(ops::neg::<Vec2>))?
//!     .op_eq(function(ops::equal::<Vec2, Vec2>))?;
//! ```
//!
//! Class operands are taken by value, so the class must be declared with
//! `native_class!(T: Clone)`.

use std::ops::{Add, Deref, Div, Mul, Neg, Rem, Sub};

pub fn add<A: Add<B>, B>(lhs: A, rhs: B) -> A::Output {
    lhs + rhs
}

pub fn sub<A: Sub<B>, B>(lhs: A, rhs: B) -> A::Output {
    lhs - rhs
}

pub fn mul<A: Mul<B>, B>(lhs: A, rhs: B) -> A::Output {
    lhs * rhs
}

pub fn div<A: Div<B>, B>(lhs: A, rhs: B) -> A::Output {
    lhs / rhs
}

/// Bound as `%` (`op_mod`).
pub fn rem<A: Rem<B>, B>(lhs: A, rhs: B) -> A::Output {
    lhs % rhs
}

/// Bound as unary minus (`op_unm`); the second operand Lua passes is ignored.
pub fn neg<A: Neg>(value: A) -> A::Output {
    -value
}

pub fn equal<A: PartialEq<B>, B>(lhs: A, rhs: B) -> bool {
    lhs == rhs
}

pub fn less<A: PartialOrd<B>, B>(lhs: A, rhs: B) -> bool {
    lhs < rhs
}

pub fn less_equal<A: PartialOrd<B>, B>(lhs: A, rhs: B) -> bool {
    lhs <= rhs
}

/// Copy out the value a smart-pointer-like class points at.
///
/// Takes the receiver by reference, so bind it with
/// [`method`](crate::method).
pub fn deref<T>(this: &T) -> T::Target
where
    T: Deref,
    T::Target: Clone + Sized,
{
    (**this).clone()
}
