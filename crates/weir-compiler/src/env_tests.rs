use weir_core::Value;
use weir_ir::NamedPat;
use weir_types::Type;

use super::builtin_env::{builtin_type, initial_environment};
use super::env::{Binding, BindingKind, Environment};

fn np(name: &str, ordinal: u32) -> NamedPat {
    NamedPat::new(name, ordinal, Type::int())
}

#[test]
fn lookup_finds_most_recent() {
    let env = Environment::empty()
        .bind(Binding::val(np("x", 0), Value::Int(1)))
        .bind(Binding::val(np("y", 0), Value::Int(2)));
    assert_eq!(env.get("x").unwrap().pat.ordinal, 0);
    assert_eq!(env.get("y").unwrap().runtime_value(), Some(&Value::Int(2)));
    assert!(env.get("z").is_none());
}

#[test]
fn head_shadowing_rebinds_against_parent() {
    let env = Environment::empty()
        .bind(Binding::val(np("x", 0), Value::Int(1)))
        .bind(Binding::val(np("x", 1), Value::Int(2)));
    // The chain stays one deep: redefining the head value collapses it.
    assert_eq!(env.len(), 1);
    assert_eq!(env.get("x").unwrap().runtime_value(), Some(&Value::Int(2)));
}

#[test]
fn ordinal_lookup_reaches_shadowed_bindings() {
    let env = Environment::empty()
        .bind(Binding::val(np("x", 0), Value::Int(1)))
        .bind(Binding::val(np("y", 0), Value::Int(9)))
        .bind(Binding::val(np("x", 1), Value::Int(2)));
    assert_eq!(
        env.get_ordinal("x", 0).unwrap().runtime_value(),
        Some(&Value::Int(1))
    );
    assert_eq!(
        env.get_ordinal("x", 1).unwrap().runtime_value(),
        Some(&Value::Int(2))
    );
}

#[test]
fn instances_collect_until_the_over_header() {
    let env = Environment::empty()
        .bind(Binding::over(np("plus", 0)))
        .bind(Binding::inst(np("plus", 1), Value::Int(1)))
        .bind(Binding::inst(np("plus", 2), Value::Int(2)));
    let instances = env.instances("plus");
    assert_eq!(instances.len(), 2);
    // Most recent first.
    assert_eq!(instances[0].pat.ordinal, 2);
    assert_eq!(instances[1].pat.ordinal, 1);
}

#[test]
fn inner_over_hides_outer_instances() {
    // An enclosing scope's overload of the same name must not leak its
    // instances into an inner `over`.
    let env = Environment::empty()
        .bind(Binding::over(np("f", 0)))
        .bind(Binding::inst(np("f", 1), Value::Int(1)))
        .bind(Binding::over(np("f", 2)))
        .bind(Binding::inst(np("f", 3), Value::Int(3)));
    let instances = env.instances("f");
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].pat.ordinal, 3);
}

#[test]
fn initial_environment_binds_every_builtin() {
    let env = initial_environment();
    for b in weir_core::BuiltIn::all() {
        let binding = env
            .get(b.name())
            .unwrap_or_else(|| panic!("missing builtin {}", b.name()));
        assert_eq!(binding.kind, BindingKind::Val);
        assert_eq!(binding.runtime_value(), Some(&Value::Builtin(b)));
    }
}

#[test]
fn builtin_types_are_shaped_as_expected() {
    assert_eq!(
        builtin_type(weir_core::BuiltIn::Add).to_string(),
        "int * int -> int and real * real -> real"
    );
    assert_eq!(
        builtin_type(weir_core::BuiltIn::Not).to_string(),
        "bool -> bool"
    );
    assert_eq!(
        builtin_type(weir_core::BuiltIn::Cons).to_string(),
        "forall 'a. 'a * 'a list -> 'a list"
    );
    assert_eq!(
        builtin_type(weir_core::BuiltIn::Substring).to_string(),
        "string * int * int -> string"
    );
}
