//! Handles: pushing, checking and finalizing native instances.

use std::sync::atomic::{AtomicUsize, Ordering};

use luaglue::mlua::AnyUserData;
use luaglue::prelude::*;

struct Badge {
    id: u32,
}
luaglue::native_class!(Badge);

impl Badge {
    fn id(&self) -> u32 {
        self.id
    }
}

struct Decoy;
luaglue::native_class!(Decoy);

struct Retained;
luaglue::native_class!(Retained);

struct Doubled;
luaglue::native_class!(Doubled);

struct Recycled;
luaglue::native_class!(Recycled);

struct Collected {
    serial: i32,
}
luaglue::native_class!(Collected);

static RETAINED_FREED: AtomicUsize = AtomicUsize::new(0);
static DOUBLED_FREED: AtomicUsize = AtomicUsize::new(0);
static COLLECTED_FREED: AtomicUsize = AtomicUsize::new(0);
static RECYCLED_FREED: AtomicUsize = AtomicUsize::new(0);

fn free_retained(instance: *mut Retained) {
    RETAINED_FREED.fetch_add(1, Ordering::SeqCst);
    drop(unsafe { Box::from_raw(instance) });
}

fn free_doubled(instance: *mut Doubled) {
    DOUBLED_FREED.fetch_add(1, Ordering::SeqCst);
    drop(unsafe { Box::from_raw(instance) });
}

// Counts only: the slot is reused for the next instance.
fn recycle(_instance: *mut Recycled) {
    RECYCLED_FREED.fetch_add(1, Ordering::SeqCst);
}

fn free_collected(instance: *mut Collected) {
    COLLECTED_FREED.fetch_add(1, Ordering::SeqCst);
    drop(unsafe { Box::from_raw(instance) });
}

fn badge_vm() -> Lua {
    let lua = Lua::new();
    ClassBuilder::<Badge>::new(&lua, "Badge")
        .unwrap()
        .add("id", method(Badge::id))
        .unwrap();
    ClassBuilder::<Decoy>::new(&lua, "Decoy").unwrap();
    lua
}

// =============================================================================
// Push / check
// =============================================================================

#[test]
fn test_check_returns_the_pushed_instance() {
    let lua = badge_vm();
    let mut badge = Badge { id: 7 };
    let raw: *mut Badge = &mut badge;

    let value = unsafe { push(&lua, raw, false) }.unwrap();
    let found = check::<Badge>(&value).expect("a Badge handle");
    assert_eq!(found.as_ptr(), raw);

    lua.globals().set("badge", value).unwrap();
    let id: u32 = lua.load("return badge:id()").eval().unwrap();
    assert_eq!(id, 7);
}

#[test]
fn test_null_pushes_nil() {
    let lua = badge_vm();
    let value = unsafe { push(&lua, std::ptr::null_mut::<Badge>(), true) }.unwrap();
    assert!(value.is_nil());
}

#[test]
fn test_check_rejects_other_values() {
    let lua = badge_vm();
    let mut decoy = Decoy;
    let value = unsafe { push(&lua, &mut decoy as *mut Decoy, false) }.unwrap();

    assert!(check::<Badge>(&value).is_none());
    assert!(check::<Badge>(&Value::Nil).is_none());
    assert!(check::<Badge>(&Value::Integer(3)).is_none());
    assert!(check::<Decoy>(&value).is_some());
}

#[test]
fn test_tostring_shows_name_and_address() {
    let lua = badge_vm();
    let mut badge = Badge { id: 1 };
    let value = unsafe { push(&lua, &mut badge as *mut Badge, false) }.unwrap();
    lua.globals().set("badge", value).unwrap();

    let text: String = lua.load("return tostring(badge)").eval().unwrap();
    assert!(text.starts_with("Badge (0x"), "{text}");
}

#[test]
fn test_handles_of_one_instance_compare_equal() {
    let lua = badge_vm();
    let mut first = Badge { id: 1 };
    let mut second = Badge { id: 2 };
    let globals = lua.globals();
    globals
        .set("a", unsafe { push(&lua, &mut first as *mut Badge, false) }.unwrap())
        .unwrap();
    globals
        .set("b", unsafe { push(&lua, &mut first as *mut Badge, false) }.unwrap())
        .unwrap();
    globals
        .set("c", unsafe { push(&lua, &mut second as *mut Badge, false) }.unwrap())
        .unwrap();

    let (same, different): (bool, bool) = lua.load("return a == b, a == c").eval().unwrap();
    assert!(same);
    assert!(!different);
}

#[test]
fn test_missing_operator_is_a_runtime_error() {
    let lua = badge_vm();
    let mut badge = Badge { id: 1 };
    let value = unsafe { push(&lua, &mut badge as *mut Badge, false) }.unwrap();
    lua.globals().set("badge", value).unwrap();

    let err = lua.load("return badge + badge").exec().unwrap_err();
    assert!(err.to_string().contains("no __add operator"), "{err}");
}

// =============================================================================
// Ownership
// =============================================================================

#[test]
fn test_retained_instance_is_never_finalized() {
    let lua = Lua::new();
    ClassBuilder::<Retained>::new(&lua, "Retained")
        .unwrap()
        .destructor(free_retained);

    let raw = Box::into_raw(Box::new(Retained));
    let value = unsafe { push(&lua, raw, false) }.unwrap();
    lua.globals().set("retained", value).unwrap();
    lua.load("retained = nil").exec().unwrap();
    lua.gc_collect().unwrap();
    drop(lua);

    assert_eq!(RETAINED_FREED.load(Ordering::SeqCst), 0);
    drop(unsafe { Box::from_raw(raw) });
}

#[test]
fn test_two_owning_handles_finalize_once() {
    let lua = Lua::new();
    ClassBuilder::<Doubled>::new(&lua, "Doubled")
        .unwrap()
        .destructor(free_doubled);

    let raw = Box::into_raw(Box::new(Doubled));
    let first = unsafe { push(&lua, raw, true) }.unwrap();
    let second = unsafe { push(&lua, raw, true) }.unwrap();

    let ud: AnyUserData = first.as_userdata().cloned().expect("userdata");
    assert!(ud.borrow::<Handle>().unwrap().is_owned());
    drop(ud);

    lua.globals().set("first", first).unwrap();
    lua.globals().set("second", second).unwrap();
    drop(lua);

    assert_eq!(DOUBLED_FREED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_constructed_instances_are_collected() {
    let lua = Lua::new();
    ClassBuilder::<Collected>::new(&lua, "Collected")
        .unwrap()
        .constructor(|serial: i32| Collected { serial })
        .unwrap()
        .add_readonly("serial", luaglue::field!(Collected, serial))
        .unwrap()
        .destructor(free_collected);

    let total: i32 = lua
        .load(
            r#"
            local total = 0
            for i = 1, 5 do
                total = total + Collected(i).serial
            end
            return total
            "#,
        )
        .eval()
        .unwrap();
    assert_eq!(total, 15);

    drop(lua);
    assert_eq!(COLLECTED_FREED.load(Ordering::SeqCst), 5);
}

fn collect_global(lua: &Lua, name: &str) {
    lua.globals().set(name, Value::Nil).unwrap();
    lua.gc_collect().unwrap();
    lua.gc_collect().unwrap();
}

#[test]
fn test_stale_owner_spares_reused_address() {
    let lua = Lua::new();
    ClassBuilder::<Recycled>::new(&lua, "Recycled")
        .unwrap()
        .destructor(recycle);

    let slot = Box::into_raw(Box::new(Recycled));
    let first = unsafe { push(&lua, slot, true) }.unwrap();
    let second = unsafe { push(&lua, slot, true) }.unwrap();
    lua.globals().set("first", first).unwrap();
    lua.globals().set("second", second).unwrap();

    collect_global(&lua, "first");
    assert_eq!(RECYCLED_FREED.load(Ordering::SeqCst), 1);

    // A new instance lands in the same slot with its own owner.
    let third = unsafe { push(&lua, slot, true) }.unwrap();
    lua.globals().set("third", third).unwrap();

    collect_global(&lua, "second");
    assert_eq!(RECYCLED_FREED.load(Ordering::SeqCst), 1);

    collect_global(&lua, "third");
    assert_eq!(RECYCLED_FREED.load(Ordering::SeqCst), 2);

    drop(lua);
    assert_eq!(RECYCLED_FREED.load(Ordering::SeqCst), 2);
    drop(unsafe { Box::from_raw(slot) });
}
