use super::*;

#[test]
fn defaults_are_valid() {
    let cfg = Config::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.canvas.width, 1280);
    assert_eq!(cfg.canvas.height, 720);
    assert_eq!(cfg.fps.as_f64(), 30.0);
    assert_eq!(cfg.stagger, Duration::from_millis(200));
    assert_eq!(cfg.prefetch_debounce, Duration::from_millis(1500));
    assert_eq!(cfg.pcm.sample_rate, 24_000);
    assert_eq!(cfg.pcm.channels, 1);
    assert_eq!(cfg.background_color().unwrap(), Rgba8::WHITE);
}

#[test]
fn partial_json_keeps_defaults() {
    let cfg = Config::from_json_str(r#"{"stagger_ms": 50, "canvas": {"width": 640, "height": 360}}"#)
        .unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.stagger, Duration::from_millis(50));
    assert_eq!(cfg.canvas.width, 640);
    assert_eq!(cfg.history_cap, 20);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = Config::from_json_str(r#"{"stager_ms": 50}"#).unwrap_err();
    assert!(err.to_string().contains("validation error:"));
}

#[test]
fn validate_catches_bad_values() {
    let odd = Config {
        canvas: Canvas {
            width: 641,
            height: 360,
        },
        ..Config::default()
    };
    assert!(odd.validate().is_err());

    let translucent = Config {
        background: "#ffffff80".to_owned(),
        ..Config::default()
    };
    assert!(translucent.validate().is_err());

    let no_breaker = Config {
        quota_breaker_threshold: 0,
        ..Config::default()
    };
    assert!(no_breaker.validate().is_err());
}

#[test]
fn env_overrides_fill_service_settings() {
    let mut cfg = Config::default();
    cfg.planner.api_key = Some("explicit".to_owned());
    cfg.apply_env(|key| match key {
        ENV_SYNTH_URL => Some("http://synth.local/tts".to_owned()),
        ENV_PLANNER_URL => Some("   ".to_owned()),
        ENV_API_KEY => Some("from-env".to_owned()),
        _ => None,
    });
    assert_eq!(cfg.synth.url.as_deref(), Some("http://synth.local/tts"));
    assert_eq!(cfg.planner.url, None);
    assert_eq!(cfg.synth.api_key.as_deref(), Some("from-env"));
    assert_eq!(cfg.planner.api_key.as_deref(), Some("explicit"));
}

#[test]
fn serializes_durations_as_millis() {
    let json = serde_json::to_value(Config::default()).unwrap();
    assert_eq!(json["stagger_ms"], 200);
    assert_eq!(json["export"]["fallback_hold_ms"], 3000);
}
