use weir_core::Span;

use super::{Diagnostics, Severity, Stage};

#[test]
fn collects_and_counts() {
    let mut diags = Diagnostics::new();
    assert!(diags.is_empty());

    diags
        .warning("match is not exhaustive", Span::new(0, 5))
        .stage(Stage::Coverage)
        .emit();
    diags.error("unbound identifier x", Span::new(6, 7)).emit();

    assert_eq!(diags.len(), 2);
    assert!(diags.has_errors());
    assert!(diags.has_warnings());
}

#[test]
fn plain_rendering_without_source() {
    let mut diags = Diagnostics::new();
    diags
        .warning("redundant match arm", Span::new(2, 4))
        .stage(Stage::Coverage)
        .emit();
    let out = diags.printer().render();
    assert_eq!(out, "warning at 2..4: redundant match arm [coverage]");
}

#[test]
fn annotated_rendering_with_source() {
    let source = "val x = y + 1";
    let mut diags = Diagnostics::new();
    diags
        .error("unbound identifier y", Span::new(8, 9))
        .emit();
    let out = diags.printer().source(source).path("session").render();
    assert!(out.contains("unbound identifier y"), "got: {out}");
    assert!(out.contains("val x = y + 1"), "got: {out}");
}

#[test]
fn annotated_rendering_spans_later_lines() {
    let source = indoc::indoc! {"
        val xs = [1,2,3]
        val n = size xs
    "};
    let offset = source.find("size").expect("fixture mentions size") as u32;
    let mut diags = Diagnostics::new();
    diags
        .error(
            "cannot unify string with int list",
            Span::new(offset, offset + 4),
        )
        .emit();
    let out = diags.printer().source(source).render();
    assert!(out.contains("val n = size xs"), "got: {out}");
    assert!(out.contains("cannot unify"), "got: {out}");
}

#[test]
fn severity_displays() {
    assert_eq!(Severity::Error.to_string(), "error");
    assert_eq!(Severity::Warning.to_string(), "warning");
}

#[test]
fn related_info_renders_in_plain_form() {
    let mut diags = Diagnostics::new();
    diags
        .error("duplicate label x in group", Span::new(10, 11))
        .related_to("first use", Span::new(3, 4))
        .emit();
    let out = diags.printer().render();
    assert!(out.contains("duplicate label"), "got: {out}");
    assert!(out.contains("first use"), "got: {out}");
}
