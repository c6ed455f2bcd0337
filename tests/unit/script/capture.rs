use super::*;
use crate::draw::{FillStyle, Shape};
use crate::foundation::core::{Point, Rgba8};

const CANVAS: Canvas = Canvas {
    width: 1280,
    height: 720,
};

#[test]
fn one_command_per_primitive_in_call_order() {
    let code = r#"
        // header
        rect(10, 10, 100, 50)
        square(0, 0, 20); circle(50, 50, 30)
        ellipse(100, 100, 40, 20)
        line(0, 0, 10, 10)
        polygon(0, 0, 10, 0, 5, 8)
        arrow(0, 0, 100, 0)
        curve(0, 0, 100, 0, bend: -0.2)
        text("Boil\nwater", 640, 360, size: 24)
    "#;
    let list = capture(code, CANVAS).unwrap();
    let kinds: Vec<_> = list.iter().map(DrawCommand::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "rect", "rect", "ellipse", "ellipse", "line", "polygon", "arrow", "curve", "text"
        ]
    );
}

#[test]
fn let_bindings_and_predefined_canvas_size() {
    let list = capture(
        "let cx = width / 2\nlet s = min(height, 100)\nsquare(cx - s / 2, 10, s)",
        CANVAS,
    )
    .unwrap();
    match &list.as_slice()[0] {
        DrawCommand::Shape {
            shape: Shape::Rect {
                origin,
                width,
                height,
            },
            ..
        } => {
            assert_eq!(*origin, Point::new(590.0, 10.0));
            assert_eq!((*width, *height), (100.0, 100.0));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn named_style_args_apply() {
    let list = capture(
        r##"rect(0, 0, 10, 10, fill: "#a5d8ff", fill_style: "solid", stroke: "red", stroke_width: 3, roughness: 0)"##,
        CANVAS,
    )
    .unwrap();
    let DrawCommand::Shape { style, .. } = &list.as_slice()[0] else {
        panic!("expected shape");
    };
    assert_eq!(style.fill, Some(Rgba8::rgb(0xa5, 0xd8, 0xff)));
    assert_eq!(style.fill_style, FillStyle::Solid);
    assert_eq!(style.stroke, Rgba8::parse("red").unwrap());
    assert_eq!(style.stroke_width, 3.0);
    assert_eq!(style.roughness, 0.0);
}

#[test]
fn string_concatenation_builds_labels() {
    let list = capture("let n = 3\ntext(\"Step \" + n + '!', 0, 0)", CANVAS).unwrap();
    match &list.as_slice()[0] {
        DrawCommand::Text {
            text, size, color, ..
        } => {
            assert_eq!(text, "Step 3!");
            assert_eq!(*size, DEFAULT_TEXT_SIZE);
            assert_eq!(*color, Rgba8::INK);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn wrapped_calls_span_lines() {
    let list = capture("rect(\n  10,\n  10,\n  20,\n  20,\n)\n", CANVAS).unwrap();
    assert_eq!(list.len(), 1);
}

#[test]
fn recapture_is_equal_but_fresh() {
    let code = "circle(10, 10, 5)\narrow(0, 0, 5, 5)";
    let a = capture(code, CANVAS).unwrap();
    let b = capture(code, CANVAS).unwrap();
    assert_eq!(a, b);
    assert!(!a.ptr_eq(&b));
}

#[test]
fn syntax_errors_carry_line_and_offset() {
    let code = "rect(0, 0, 1, 1)\nline(0, 0,, 1)";
    let err = capture(code, CANVAS).unwrap_err();
    assert_eq!(err.phase, CapturePhase::Syntax);
    assert_eq!(err.line, 2);
    assert_eq!(err.offset, code.find(",,").unwrap() + 1);
}

#[test]
fn runtime_errors_are_rejected() {
    let cases = [
        ("blob(1, 2)", "unknown primitive"),
        ("rect(1, 2, 3)", "expects 4"),
        ("rect(1, 2, 3, 4, glow: 1)", "unknown argument"),
        ("rect(1, 2, 3, 4, fill: \"red\", fill: \"blue\")", "duplicate"),
        ("rect(1, 2, 3, 4, fill: \"#zzz\")", "invalid color"),
        ("rect(1, 2, 3, 4, fill_style: \"dots\")", "fill_style"),
        ("circle(x, 1, 2)", "unknown variable 'x'"),
        ("polygon(0, 0, 1, 1)", "at least 3 points"),
        ("line(\"a\", 0, 1, 1)", "expected a number"),
        ("text(\"a\", 1, 2, bend: 1)", "unknown argument"),
        ("rect(fill: \"red\", 1, 2, 3, 4)", "positional argument after named"),
        ("let rect = 1", "built-in"),
        ("min(1, 2)", "cannot be a statement"),
    ];
    for (code, needle) in cases {
        let err = capture(code, CANVAS).unwrap_err();
        assert_eq!(err.phase, CapturePhase::Runtime, "{code}");
        assert!(err.message.contains(needle), "{code}: {}", err.message);
        assert_eq!(err.line, 1);
    }
}

#[test]
fn capture_or_notice_never_fails() {
    let list = capture_or_notice("rect(", CANVAS);
    assert_eq!(list.len(), 1);
    match &list.as_slice()[0] {
        DrawCommand::Notice { message } => assert!(message.contains("syntax error")),
        other => panic!("unexpected command: {other:?}"),
    }

    let ok = capture_or_notice("line(0, 0, 1, 1)", CANVAS);
    assert_eq!(ok.as_slice()[0].kind(), "line");
}

#[test]
fn empty_code_captures_nothing() {
    assert!(capture("", CANVAS).unwrap().is_empty());
    assert!(capture("// only a comment\n\n;", CANVAS).unwrap().is_empty());
}

#[test]
fn deeply_nested_code_is_a_syntax_error() {
    let cases = [
        format!("let a = {}1{}", "(".repeat(2000), ")".repeat(2000)),
        format!("let a = {}1", "-".repeat(5000)),
        format!("let a = 1{}", " + 1".repeat(100_000)),
        format!("let a = {}1{}", "min(1, ".repeat(500), ")".repeat(500)),
    ];
    for code in &cases {
        let err = capture(code, CANVAS).unwrap_err();
        assert_eq!(err.phase, CapturePhase::Syntax);
        assert!(err.message.contains("nested too deeply"), "{}", err.message);

        let list = capture_or_notice(code, CANVAS);
        assert!(matches!(list.as_slice(), [DrawCommand::Notice { .. }]));
    }

    let reasonable = format!("let a = {}2{}\nsquare(a, a, a)", "(".repeat(40), ")".repeat(40));
    assert_eq!(capture(&reasonable, CANVAS).unwrap().len(), 1);
    let long_sum = format!("let a = 1{}\nsquare(a, a, a)", " + 1".repeat(200));
    assert_eq!(capture(&long_sum, CANVAS).unwrap().len(), 1);
}
