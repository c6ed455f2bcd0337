use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReelError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        ReelError::command("x")
            .to_string()
            .contains("command execution error:")
    );
    assert!(
        ReelError::synthesis("x")
            .to_string()
            .contains("synthesis failed:")
    );
    assert!(
        ReelError::export_setup("x")
            .to_string()
            .contains("export setup error:")
    );
    assert!(
        ReelError::planning("x")
            .to_string()
            .contains("planning failed:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ReelError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn capture_errors_convert() {
    let err: ReelError = CaptureError::syntax(3, 1, "unexpected token").into();
    assert!(err.to_string().starts_with("capture error:"));
    assert!(err.to_string().contains("unexpected token"));
}
