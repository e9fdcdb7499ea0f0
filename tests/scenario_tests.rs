//! End-to-end scripts driving bound classes.

use luaglue::prelude::*;

struct Point {
    x: f64,
    y: f64,
}
luaglue::native_class!(Point);

impl Point {
    fn new(x: f64) -> Point {
        Point { x, y: 0.0 }
    }

    fn scale(&mut self, by: f64) {
        self.x *= by;
        self.y *= by;
    }
}

#[derive(Default)]
struct Counter {
    count: i32,
}
luaglue::native_class!(Counter);

impl Counter {
    fn bump(&mut self) {
        self.count += 1;
    }
}

fn bind_point(lua: &Lua) -> Result<(), BindError> {
    ClassBuilder::<Point>::new(lua, "Point")?
        .constructor(Point::new)?
        .add("scale", method(Point::scale))?
        .add("x", luaglue::field!(Point, x))?
        .add("y", luaglue::field!(Point, y))?;
    Ok(())
}

fn bind_counter(lua: &Lua) -> Result<(), BindError> {
    ClassBuilder::<Counter>::new(lua, "Counter")?
        .default_constructor()?
        .add("bump", method(Counter::bump))?
        .add_readonly("count", luaglue::field!(Counter, count))?;
    Ok(())
}

#[test]
fn test_point_scale() {
    let lua = Lua::new();
    bind_point(&lua).unwrap();
    lua.load("local p = Point(3.0); p:scale(2.0); assert(p.x == 6.0)")
        .exec()
        .unwrap();
}

#[test]
fn test_point_fields_are_writable() {
    let lua = Lua::new();
    bind_point(&lua).unwrap();
    let (x, y): (f64, f64) = lua
        .load("local p = Point(1.0); p.y = 2.0; p:scale(3.0); return p.x, p.y")
        .eval()
        .unwrap();
    assert_eq!((x, y), (3.0, 6.0));
}

#[test]
fn test_bump_counter_from_script() {
    let lua = Lua::new();
    bind_counter(&lua).unwrap();
    let count: i32 = lua
        .load("local c = Counter(); c:bump(); c:bump(); c:bump(); return c.count")
        .eval()
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_bump_native_counter() {
    let lua = Lua::new();
    bind_counter(&lua).unwrap();

    let mut counter = Counter::default();
    let value = unsafe { push(&lua, &mut counter as *mut Counter, false) }.unwrap();
    lua.globals().set("counter", value).unwrap();
    lua.load("for _ = 1, 3 do counter:bump() end").exec().unwrap();

    assert_eq!(counter.count, 3);
}

#[test]
fn test_builder_errors_surface_through_the_vm() {
    let lua = Lua::new();
    let bind = lua
        .create_function(|lua, ()| {
            bind_counter(lua)?;
            Ok(())
        })
        .unwrap();
    lua.globals().set("bind_counter", bind).unwrap();

    let count: i32 = lua
        .load("bind_counter(); local c = Counter(); c:bump(); return c.count")
        .eval()
        .unwrap();
    assert_eq!(count, 1);
}
