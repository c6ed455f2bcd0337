use super::*;
use crate::foundation::core::Canvas;

fn surface() -> Surface {
    Surface::new(
        Canvas {
            width: 160,
            height: 120,
        },
        Rgba8::WHITE,
    )
    .unwrap()
}

fn rect(seed: u64, fill: Option<Rgba8>, fill_style: FillStyle) -> DrawCommand {
    DrawCommand::Shape {
        shape: Shape::Rect {
            origin: Point::new(20.0, 20.0),
            width: 80.0,
            height: 50.0,
        },
        style: Style {
            fill,
            fill_style,
            seed,
            ..Style::default()
        },
    }
}

#[test]
fn execute_is_deterministic_per_seed() {
    let mut a = surface();
    let mut b = surface();
    rect(11, None, FillStyle::Hachure).execute(&mut a).unwrap();
    rect(11, None, FillStyle::Hachure).execute(&mut b).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());

    let mut c = surface();
    rect(12, None, FillStyle::Hachure).execute(&mut c).unwrap();
    assert_ne!(a.fingerprint(), c.fingerprint());
}

#[test]
fn every_shape_kind_marks_the_surface() {
    let style = Style::default();
    let commands = vec![
        DrawCommand::Shape {
            shape: Shape::Ellipse {
                center: Point::new(80.0, 60.0),
                width: 60.0,
                height: 40.0,
            },
            style: style.clone(),
        },
        DrawCommand::Shape {
            shape: Shape::Line {
                from: Point::new(10.0, 10.0),
                to: Point::new(150.0, 110.0),
            },
            style: style.clone(),
        },
        DrawCommand::Shape {
            shape: Shape::Polygon(vec![
                Point::new(10.0, 100.0),
                Point::new(50.0, 20.0),
                Point::new(90.0, 100.0),
            ]),
            style: style.clone(),
        },
        DrawCommand::Arrow {
            from: Point::new(10.0, 60.0),
            to: Point::new(140.0, 60.0),
            style: style.clone(),
        },
        DrawCommand::Curve {
            from: Point::new(10.0, 100.0),
            to: Point::new(140.0, 100.0),
            bend: 0.3,
            style,
        },
    ];
    for cmd in &commands {
        let mut s = surface();
        let blank = s.fingerprint();
        cmd.execute(&mut s).unwrap();
        assert_ne!(s.fingerprint(), blank, "{} drew nothing", cmd.kind());
    }
}

#[test]
fn solid_and_hachure_fill_differ() {
    let mut solid = surface();
    rect(3, Some(Rgba8::rgb(0xa5, 0xd8, 0xff)), FillStyle::Solid)
        .execute(&mut solid)
        .unwrap();
    let mut hatch = surface();
    rect(3, Some(Rgba8::rgb(0xa5, 0xd8, 0xff)), FillStyle::Hachure)
        .execute(&mut hatch)
        .unwrap();
    assert_ne!(solid.fingerprint(), hatch.fingerprint());

    // Center of a solid-filled rect carries the fill color.
    let frame = solid.snapshot();
    let idx = ((45 * 160 + 60) * 4) as usize;
    let px = &frame.data[idx..idx + 4];
    for (got, want) in px.iter().zip([0xa5u8, 0xd8, 0xff, 0xff]) {
        assert!(got.abs_diff(want) <= 1, "{px:?}");
    }
}

#[test]
fn invalid_geometry_is_an_execution_error_and_leaves_surface_alone() {
    let mut s = surface();
    let blank = s.fingerprint();
    let bad = vec![
        DrawCommand::Shape {
            shape: Shape::Rect {
                origin: Point::new(f64::NAN, 0.0),
                width: 10.0,
                height: 10.0,
            },
            style: Style::default(),
        },
        DrawCommand::Shape {
            shape: Shape::Ellipse {
                center: Point::new(10.0, 10.0),
                width: -4.0,
                height: 10.0,
            },
            style: Style::default(),
        },
        DrawCommand::Shape {
            shape: Shape::Polygon(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]),
            style: Style::default(),
        },
        DrawCommand::Arrow {
            from: Point::new(0.0, 0.0),
            to: Point::new(10.0, 10.0),
            style: Style {
                stroke_width: 0.0,
                ..Style::default()
            },
        },
        DrawCommand::Text {
            text: "shrunk".to_owned(),
            at: Point::new(40.0, 40.0),
            size: -5.0,
            color: Rgba8::INK,
        },
        DrawCommand::Text {
            text: "empty".to_owned(),
            at: Point::new(40.0, 40.0),
            size: 0.0,
            color: Rgba8::INK,
        },
        DrawCommand::Text {
            text: "nan".to_owned(),
            at: Point::new(40.0, 40.0),
            size: f64::NAN,
            color: Rgba8::INK,
        },
    ];
    for cmd in &bad {
        let err = cmd.execute(&mut s).unwrap_err();
        assert!(matches!(err, ReelError::CommandExecution(_)), "{err}");
    }
    assert_eq!(s.fingerprint(), blank);
}

#[test]
fn huge_hachure_fill_is_clipped_to_the_surface() {
    let mut s = Surface::new(
        Canvas {
            width: 64,
            height: 64,
        },
        Rgba8::WHITE,
    )
    .unwrap();
    let blank = s.fingerprint();
    let huge = DrawCommand::Shape {
        shape: Shape::Rect {
            origin: Point::new(0.0, 0.0),
            width: 4.0e6,
            height: 4.0e6,
        },
        style: Style {
            fill: Some(Rgba8::parse("#ff0000").unwrap()),
            ..Style::default()
        },
    };
    let started = std::time::Instant::now();
    huge.execute(&mut s).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert_ne!(s.fingerprint(), blank);

    let far = DrawCommand::Shape {
        shape: Shape::Rect {
            origin: Point::new(1.0e17, 1.0e17),
            width: 10.0,
            height: 10.0,
        },
        style: Style {
            fill: Some(Rgba8::INK),
            ..Style::default()
        },
    };
    let before = s.fingerprint();
    far.execute(&mut s).unwrap();
    assert_eq!(s.fingerprint(), before);
}

#[test]
fn notice_draws_without_fonts_failing() {
    let mut s = surface();
    let blank = s.fingerprint();
    DrawCommand::Notice {
        message: "capture error: unknown primitive 'blob'".to_owned(),
    }
    .execute(&mut s)
    .unwrap();
    assert_ne!(s.fingerprint(), blank);
}

#[test]
fn command_list_shares_storage_on_clone() {
    let list = CommandList::from(vec![rect(1, None, FillStyle::Hachure)]);
    let copy = list.clone();
    assert!(list.ptr_eq(&copy));
    assert_eq!(copy.len(), 1);
    let other = CommandList::from(vec![rect(1, None, FillStyle::Hachure)]);
    assert!(!list.ptr_eq(&other));
    assert_eq!(list, other);
}

#[test]
fn fill_style_parse() {
    assert_eq!(FillStyle::parse("solid"), Some(FillStyle::Solid));
    assert_eq!(FillStyle::parse("hachure"), Some(FillStyle::Hachure));
    assert_eq!(FillStyle::parse("dots"), None);
}
