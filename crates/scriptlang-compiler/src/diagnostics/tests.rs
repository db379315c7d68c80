use super::*;
use scriptlang_core::{FileId, Position, Span};

fn span(start: u32, end: u32) -> Span {
    Span::new(
        FileId::from_raw(0),
        Position::new(1, start + 1),
        Position::new(1, end + 1),
        (start, end),
    )
}

#[test]
fn collection_tracks_error_and_warning_counts() {
    let mut diags = Diagnostics::new();
    diags.push(DiagnosticMessage::error(Kind::UndeclaredName, span(0, 3), "undeclared `foo`"));
    diags.push(DiagnosticMessage::warning(Kind::DuplicateImport, span(4, 8), "already imported"));

    assert_eq!(diags.len(), 2);
    assert_eq!(diags.error_count(), 1);
    assert_eq!(diags.warning_count(), 1);
    assert!(diags.has_errors());
    assert!(diags.has_warnings());
}

#[test]
fn empty_collection_has_no_errors() {
    let diags = Diagnostics::new();
    assert!(diags.is_empty());
    assert!(!diags.has_errors());
}

#[test]
fn plain_render_matches_file_line_col_format() {
    let mut diags = Diagnostics::new();
    diags.push(DiagnosticMessage::error(Kind::TypeMismatch, span(2, 5), "expected INT, found BOOL"));

    let rendered = diags.printer().path("script.sc").render();
    assert_eq!(rendered, "script.sc(1,3): error: expected INT, found BOOL");
}

#[test]
fn multiple_diagnostics_render_one_per_line() {
    let mut diags = Diagnostics::new();
    diags.push(DiagnosticMessage::error(Kind::UndeclaredName, span(0, 1), "first"));
    diags.push(DiagnosticMessage::warning(Kind::DuplicateImport, span(2, 3), "second"));

    let rendered = diags.printer().path("x.sc").render();
    assert_eq!(rendered.lines().count(), 2);
}

#[test]
fn colored_snippet_render_includes_message_and_path() {
    let source = "PROC MAIN()\nENDPROC\n";
    let mut diags = Diagnostics::new();
    diags.push(DiagnosticMessage::error(Kind::SyntaxError, span(0, 4), "unexpected token"));

    let rendered = diags.printer().source(source).path("script.sc").colored(false).render();
    assert!(rendered.contains("unexpected token"));
    assert!(rendered.contains("script.sc"));
}

#[test]
fn fix_is_attached_and_displayed() {
    let diag = DiagnosticMessage::error(Kind::UndeclaredName, span(0, 3), "undeclared `foo`")
        .with_fix(Fix::new("bar", "did you mean `bar`?"));
    let text = format!("{diag}");
    assert!(text.contains("did you mean"));
}
