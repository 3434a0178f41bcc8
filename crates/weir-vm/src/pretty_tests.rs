use weir_core::Value;
use weir_types::{Type, TypeSystem};

use super::pretty::{PrettyConfig, format_typed, print_binding};

#[test]
fn single_line_binding() {
    let config = PrettyConfig::default();
    let lines = print_binding(
        "it",
        &Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        &Type::list(Type::int()),
        &config,
    );
    assert_eq!(lines, vec!["val it = [1,2,3] : int list".to_owned()]);
}

#[test]
fn records_render_with_labels() {
    let ts = TypeSystem::new();
    let row = ts.record(vec![
        ("x".to_owned(), Type::int()),
        ("y".to_owned(), Type::int()),
    ]);
    let config = PrettyConfig::default();
    let value = Value::list(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(
        format_typed(&value, &row, config.print_depth, &config),
        "{x=1,y=2}"
    );
}

#[test]
fn long_lists_truncate_at_print_length() {
    let config = PrettyConfig {
        print_length: 3,
        ..PrettyConfig::default()
    };
    let value = Value::list((0..10).map(Value::Int).collect());
    assert_eq!(
        format_typed(&value, &Type::list(Type::int()), config.print_depth, &config),
        "[0,1,2,...]"
    );
}

#[test]
fn deep_nesting_collapses() {
    let config = PrettyConfig {
        print_depth: 2,
        ..PrettyConfig::default()
    };
    let value = Value::list(vec![Value::list(vec![Value::list(vec![Value::Int(1)])])]);
    let ty = Type::list(Type::list(Type::list(Type::int())));
    assert_eq!(
        format_typed(&value, &ty, config.print_depth, &config),
        "[[...]]"
    );
}

#[test]
fn wide_values_wrap_with_continuation_indent() {
    let config = PrettyConfig {
        line_width: 24,
        ..PrettyConfig::default()
    };
    let value = Value::list((100..110).map(Value::Int).collect());
    let lines = print_binding("xs", &value, &Type::list(Type::int()), &config);
    assert_eq!(lines[0], "val xs =");
    assert!(lines.len() > 2, "value must wrap: {lines:?}");
    assert_eq!(lines.last().unwrap(), "  : int list");
    for line in &lines[1..] {
        assert!(line.len() <= config.line_width, "overlong line {line:?}");
    }
}

#[test]
fn functions_render_opaquely() {
    let config = PrettyConfig::default();
    assert_eq!(
        format_typed(
            &Value::Builtin(weir_core::BuiltIn::Add),
            &Type::func(Type::int(), Type::int()),
            config.print_depth,
            &config
        ),
        "fn"
    );
}

#[test]
fn strings_truncate_at_string_size() {
    let config = PrettyConfig {
        string_size: 4,
        ..PrettyConfig::default()
    };
    assert_eq!(
        format_typed(
            &Value::string("abcdefgh"),
            &Type::string(),
            config.print_depth,
            &config
        ),
        "\"abcd\"..."
    );
}
