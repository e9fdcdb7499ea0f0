//! Methods, functions, manual callables and fields bound on a class.

use std::sync::Arc;

use luaglue::core::{BoundType, CachedBinding};
use luaglue::mlua::AnyUserData;
use luaglue::prelude::*;

struct Gauge {
    level: f64,
    label: String,
    hits: i32,
}
luaglue::native_class!(Gauge);

impl Gauge {
    fn new(level: f64) -> Gauge {
        Gauge {
            level,
            label: String::new(),
            hits: 0,
        }
    }

    fn origin() -> Gauge {
        Gauge::new(0.0)
    }

    fn level(&self) -> f64 {
        self.level
    }

    fn raise(&mut self, by: f64) {
        self.level += by;
        self.hits += 1;
    }

    fn describe(&self, prefix: String) -> String {
        format!("{prefix}{}", self.level)
    }

    fn absorb(&mut self, other: ClassRef<Gauge>) {
        self.level += other.level;
    }

    fn gap(&self, other: ClassRef<Gauge>) -> f64 {
        (self.level - other.level).abs()
    }

    fn itself(&mut self) -> *mut Gauge {
        self
    }

    fn twin(&mut self) -> *mut Gauge {
        Box::into_raw(Box::new(Gauge::new(self.level)))
    }
}

struct Shared {
    value: i64,
}
luaglue::native_class!(Shared);

impl Shared {
    fn value(&self) -> i64 {
        self.value
    }
}

fn sum_all(_: &Lua, args: MultiValue) -> luaglue::mlua::Result<MultiValue> {
    let total: f64 = args
        .iter()
        .map(|value| match value {
            Value::Integer(i) => *i as f64,
            Value::Number(n) => *n,
            _ => 0.0,
        })
        .sum();
    Ok(std::iter::once(Value::Number(total)).collect())
}

fn gauge_vm() -> Lua {
    let lua = Lua::new();
    ClassBuilder::<Gauge>::new(&lua, "Gauge")
        .unwrap()
        .constructor(Gauge::new)
        .unwrap()
        .add("origin", function(Gauge::origin))
        .unwrap()
        .add("level", method(Gauge::level))
        .unwrap()
        .add("raise", method(Gauge::raise))
        .unwrap()
        .add("describe", method(Gauge::describe))
        .unwrap()
        .add("absorb", method(Gauge::absorb))
        .unwrap()
        .add("gap", method(Gauge::gap))
        .unwrap()
        .add("itself", method(Gauge::itself))
        .unwrap()
        .add_with_policy("twin", method(Gauge::twin), ReturnPolicy::Collect)
        .unwrap()
        .add("sum", manual(sum_all))
        .unwrap()
        .add(
            "peek",
            manual_with_receiver::<Gauge, _>(|_, this, _| {
                let level = this.map_or(-1.0, |gauge| gauge.level);
                Ok(std::iter::once(Value::Number(level)).collect())
            }),
        )
        .unwrap()
        .add("value", luaglue::field!(Gauge, level))
        .unwrap()
        .add_readonly("hits", luaglue::field!(Gauge, hits))
        .unwrap()
        .add_writeonly("label", luaglue::field!(Gauge, label))
        .unwrap();
    lua
}

fn is_owned(value: AnyUserData) -> bool {
    value.borrow::<Handle>().unwrap().is_owned()
}

// =============================================================================
// Results
// =============================================================================

#[test]
fn test_void_method_returns_nothing() {
    let lua = gauge_vm();
    let counts: (i64, i64) = lua
        .load("local g = Gauge(1.0); return select('#', g:raise(1.0)), select('#', g:level())")
        .eval()
        .unwrap();
    assert_eq!(counts, (0, 1));
}

#[test]
fn test_method_arguments_and_results() {
    let lua = gauge_vm();
    let text: String = lua
        .load("local g = Gauge(2.5); g:raise(1); return g:describe('level=')")
        .eval()
        .unwrap();
    assert_eq!(text, "level=3.5");
}

#[test]
fn test_method_on_a_non_instance_returns_nil() {
    let lua = gauge_vm();
    let (count, first): (i64, Value) = lua
        .load("return select('#', Gauge_mt.level(42)), Gauge_mt.level(42)")
        .eval()
        .unwrap();
    assert_eq!(count, 1);
    assert!(first.is_nil());
}

#[test]
fn test_bad_argument_reports_its_position() {
    let lua = gauge_vm();
    let err = lua
        .load("local g = Gauge(1.0); g:raise({})")
        .exec()
        .unwrap_err();
    assert!(err.to_string().contains("bad argument #2"), "{err}");
}

#[test]
fn test_mutating_method_rejects_its_own_receiver() {
    let lua = gauge_vm();
    let level: f64 = lua
        .load("local a, b = Gauge(1.0), Gauge(2.0); a:absorb(b); return a:level()")
        .eval()
        .unwrap();
    assert_eq!(level, 3.0);

    let err = lua
        .load("local g = Gauge(1.0); g:absorb(g)")
        .exec()
        .unwrap_err();
    assert!(err.to_string().contains("bad argument #2"), "{err}");
    assert!(err.to_string().contains("refers to the"), "{err}");

    // A second handle to the same instance is the same receiver.
    let err = lua
        .load("local g = Gauge(1.0); g:absorb(g:itself())")
        .exec()
        .unwrap_err();
    assert!(err.to_string().contains("refers to the"), "{err}");
}

#[test]
fn test_shared_method_accepts_its_own_receiver() {
    let lua = gauge_vm();
    let gap: f64 = lua
        .load("local g = Gauge(4.0); return g:gap(g)")
        .eval()
        .unwrap();
    assert_eq!(gap, 0.0);
}

#[test]
fn test_missing_trailing_argument_reads_as_nil() {
    let lua = gauge_vm();
    let err = lua
        .load("local g = Gauge(1.0); g:raise()")
        .exec()
        .unwrap_err();
    assert!(err.to_string().contains("bad argument #2"), "{err}");
}

// =============================================================================
// Functions
// =============================================================================

#[test]
fn test_free_function_returns_an_owned_instance() {
    let lua = gauge_vm();
    let origin: AnyUserData = lua.load("return Gauge_mt.origin()").eval().unwrap();
    assert!(is_owned(origin));
}

#[test]
fn test_manual_function_reads_the_stack_itself() {
    let lua = gauge_vm();
    let total: f64 = lua.load("return Gauge_mt.sum(1, 2.5, 'x', 3)").eval().unwrap();
    assert_eq!(total, 6.5);
}

#[test]
fn test_manual_function_with_receiver() {
    let lua = gauge_vm();
    let (level, missing): (f64, f64) = lua
        .load("local g = Gauge(4.0); return g:peek(), Gauge_mt.peek(false)")
        .eval()
        .unwrap();
    assert_eq!(level, 4.0);
    assert_eq!(missing, -1.0);
}

#[test]
fn test_return_policy_decides_ownership() {
    let lua = gauge_vm();
    let (itself, twin): (AnyUserData, AnyUserData) = lua
        .load("g = Gauge(1.0); return g:itself(), g:twin()")
        .eval()
        .unwrap();
    assert!(!is_owned(itself));
    assert!(is_owned(twin));
}

// =============================================================================
// Fields
// =============================================================================

#[test]
fn test_field_round_trip() {
    let lua = gauge_vm();
    let mut gauge = Gauge::new(1.0);
    let value = unsafe { push(&lua, &mut gauge as *mut Gauge, false) }.unwrap();
    lua.globals().set("gauge", value).unwrap();

    let read: f64 = lua
        .load("gauge.value = 9.25; return gauge.value")
        .eval()
        .unwrap();
    assert_eq!(read, 9.25);
    assert_eq!(gauge.level, 9.25);
}

#[test]
fn test_unknown_member_reads_nil() {
    let lua = gauge_vm();
    let missing: Value = lua
        .load("local g = Gauge(1.0); return g.missing")
        .eval()
        .unwrap();
    assert!(missing.is_nil());
}

#[test]
fn test_accessor_tables_are_not_members() {
    let lua = gauge_vm();
    let (getters, setters, table): (Value, Value, String) = lua
        .load("local g = Gauge(1.0); return g.__getters, g.__setters, type(Gauge_mt.__getters)")
        .eval()
        .unwrap();
    assert!(getters.is_nil());
    assert!(setters.is_nil());
    assert_eq!(table, "table");
}

#[test]
fn test_write_without_setter_is_dropped() {
    let lua = gauge_vm();
    let (read, raw): (Value, Value) = lua
        .load("local g = Gauge(1.0); g.missing = 5; return g.missing, rawget(Gauge_mt, 'missing')")
        .eval()
        .unwrap();
    assert!(read.is_nil());
    assert!(raw.is_nil());
}

#[test]
fn test_readonly_field_ignores_writes() {
    let lua = gauge_vm();
    let hits: i32 = lua
        .load("local g = Gauge(1.0); g:raise(1.0); g.hits = 40; return g.hits")
        .eval()
        .unwrap();
    assert_eq!(hits, 1);
}

#[test]
fn test_writeonly_field_reads_nil() {
    let lua = gauge_vm();
    let mut gauge = Gauge::new(1.0);
    let value = unsafe { push(&lua, &mut gauge as *mut Gauge, false) }.unwrap();
    lua.globals().set("gauge", value).unwrap();

    let read: Value = lua
        .load("gauge.label = 'boiler'; return gauge.label")
        .eval()
        .unwrap();
    assert!(read.is_nil());
    assert_eq!(gauge.label, "boiler");
}

#[test]
fn test_field_rejects_wrong_type() {
    let lua = gauge_vm();
    let err = lua
        .load("local g = Gauge(1.0); g.value = {}")
        .exec()
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("Gauge.__newindex for value"), "{text}");
    assert!(text.contains("bad argument #3"), "{text}");
}

// =============================================================================
// Binding cache
// =============================================================================

#[test]
fn test_bindings_are_shared_across_vms() {
    let class = BoundType::of::<Shared>();
    let bind = |lua: &Lua| {
        ClassBuilder::<Shared>::new(lua, "Shared")
            .unwrap()
            .add("value", method(Shared::value))
            .unwrap()
            .add("raw", luaglue::field!(Shared, value))
            .unwrap();
    };

    let first = Lua::new();
    bind(&first);
    let count = class.cached_binding_count();
    let Some(CachedBinding::Callable(before)) = class.cached_binding("value") else {
        panic!("value is cached as a callable");
    };

    let second = Lua::new();
    bind(&second);
    assert_eq!(class.cached_binding_count(), count);
    let Some(CachedBinding::Callable(after)) = class.cached_binding("value") else {
        panic!("value is cached as a callable");
    };
    assert!(Arc::ptr_eq(&before, &after));

    let mut shared = Shared { value: 11 };
    for lua in [&first, &second] {
        let value = unsafe { push(lua, &mut shared as *mut Shared, false) }.unwrap();
        lua.globals().set("shared", value).unwrap();
        let read: (i64, i64) = lua
            .load("return shared:value(), shared.raw")
            .eval()
            .unwrap();
        assert_eq!(read, (11, 11));
    }
}
