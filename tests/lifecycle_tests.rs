//! Process-wide init/quit and the binding doc.
//!
//! Lifecycle state is global, so this binary holds a single test.

use std::fs;

use luaglue::core::{BoundType, binding_doc, is_recording};
use luaglue::prelude::*;

#[derive(Default)]
struct Lamp {
    on: bool,
}
luaglue::native_class!(Lamp);

impl Lamp {
    fn toggle(&mut self) {
        self.on = !self.on;
    }
}

struct Unrecorded {
    level: i32,
}
luaglue::native_class!(Unrecorded);

impl Unrecorded {
    fn level(&self) -> i32 {
        self.level
    }
}

#[test]
fn test_init_records_and_quit_releases() {
    let doc = std::env::temp_dir().join(format!("luaglue_doc_{}.txt", std::process::id()));
    init_with(GlueConfig::default().with_binding_doc(&doc));
    assert!(is_recording());

    let lua = Lua::new();
    ClassBuilder::<Lamp>::new(&lua, "Lamp")
        .unwrap()
        .default_constructor()
        .unwrap()
        .add("toggle", method(Lamp::toggle))
        .unwrap()
        .add("on", luaglue::field!(Lamp, on))
        .unwrap();
    let lamp = BoundType::of::<Lamp>();
    assert_eq!(lamp.cached_binding_count(), 2);

    let rendered = binding_doc();
    assert!(rendered.contains("class Lamp (Lamp_mt)"), "{rendered}");
    assert!(rendered.contains("    constructor Lamp() -> Lamp"), "{rendered}");
    assert!(rendered.contains("    method toggle()"), "{rendered}");
    assert!(rendered.contains("    field on: bool [read, write]"), "{rendered}");

    lua.load("lamp = Lamp()").exec().unwrap();
    quit().unwrap();
    assert!(!is_recording());
    assert_eq!(lamp.cached_binding_count(), 0);
    assert!(lamp.members().is_empty());

    // Closures already installed in the VM outlive the released cache.
    let on: bool = lua.load("lamp:toggle(); return lamp.on").eval().unwrap();
    assert!(on);

    let written = fs::read_to_string(&doc).unwrap();
    assert!(written.contains("class Lamp (Lamp_mt)"));
    assert!(written.contains("method toggle()"));
    fs::remove_file(&doc).unwrap();

    // Without init nothing is queued; releasing is up to the caller.
    let lua = Lua::new();
    ClassBuilder::<Unrecorded>::new(&lua, "Unrecorded")
        .unwrap()
        .add("level", method(Unrecorded::level))
        .unwrap();
    quit().unwrap();
    let unrecorded = BoundType::of::<Unrecorded>();
    assert_eq!(unrecorded.cached_binding_count(), 1);

    deallocate_bindings::<Unrecorded>();
    assert_eq!(unrecorded.cached_binding_count(), 0);
}
