use super::*;

#[test]
fn fps_rejects_zero() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    let fps = Fps::new(30, 1).unwrap();
    assert!((fps.frames_to_secs(45) - 1.5).abs() < 1e-9);
}

#[test]
fn canvas_validation_bounds() {
    assert!(Canvas { width: 0, height: 10 }.validate().is_err());
    assert!(Canvas { width: 70_000, height: 10 }.validate().is_err());
    assert!(Canvas { width: 64, height: 48 }.validate().is_ok());
}

#[test]
fn parses_hex_and_named_colors() {
    assert_eq!(Rgba8::parse("#fff").unwrap(), Rgba8::WHITE);
    assert_eq!(Rgba8::parse("#1e1e1e").unwrap(), Rgba8::INK);
    assert_eq!(
        Rgba8::parse("#ff000080").unwrap(),
        Rgba8 {
            r: 255,
            g: 0,
            b: 0,
            a: 128
        }
    );
    assert_eq!(Rgba8::parse("Black").unwrap(), Rgba8::rgb(0, 0, 0));
    assert_eq!(Rgba8::parse("none").unwrap().a, 0);
    assert!(Rgba8::parse("#12").is_err());
    assert!(Rgba8::parse("#gggggg").is_err());
    assert!(Rgba8::parse("chartreuse-ish").is_err());
}

#[test]
fn premul_scales_channels() {
    let c = Rgba8 {
        r: 255,
        g: 0,
        b: 0,
        a: 128,
    };
    assert_eq!(c.to_premul(), [128, 0, 0, 128]);
    assert_eq!(Rgba8::WHITE.to_premul(), [255, 255, 255, 255]);
}
