use std::path::PathBuf;

use sketchreel::Step;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_sketchreel")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "sketchreel.exe"
            } else {
                "sketchreel"
            });
            p
        })
}

fn write_steps(dir: &PathBuf, name: &str, steps: &[Step]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let f = std::fs::File::create(&path).unwrap();
    serde_json::to_writer_pretty(f, steps).unwrap();
    path
}

#[test]
fn cli_check_reports_command_counts() {
    let dir = PathBuf::from("target").join("cli_smoke");
    let steps = write_steps(
        &dir,
        "good.json",
        &[
            Step::new("Pot", "Fill a pot.", "rect(10, 10, 100, 60)\ncircle(60, 40, 30)"),
            Step::new("Heat", "Turn it on.", "arrow(0, 0, 50, 50)"),
        ],
    );

    let output = std::process::Command::new(exe())
        .args(["check", "--steps"])
        .arg(&steps)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("step 0 'Pot': 2 commands"), "{stdout}");
    assert!(stdout.contains("step 1 'Heat': 1 commands"), "{stdout}");
}

#[test]
fn cli_check_fails_on_bad_code() {
    let dir = PathBuf::from("target").join("cli_smoke");
    let steps = write_steps(
        &dir,
        "bad.json",
        &[Step::new("Broken", "Nope.", "rect(1, 2,\nsquiggle(3)")],
    );

    let output = std::process::Command::new(exe())
        .args(["check", "--steps"])
        .arg(&steps)
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("step 0 'Broken':"), "{stdout}");
    assert!(stdout.contains("error at line"), "{stdout}");
}

#[test]
fn cli_preview_writes_png() {
    let dir = PathBuf::from("target").join("cli_smoke");
    let steps = write_steps(
        &dir,
        "preview.json",
        &[Step::new("Box", "A box.", "rect(8, 8, 48, 32, fill: \"#a5d8ff\")")],
    );
    let config = dir.join("small.json");
    std::fs::write(&config, r#"{"canvas": {"width": 64, "height": 48}}"#).unwrap();
    let out = dir.join("preview.png");
    let _ = std::fs::remove_file(&out);

    let status = std::process::Command::new(exe())
        .arg("--config")
        .arg(&config)
        .args(["preview", "--step", "0", "--steps"])
        .arg(&steps)
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();

    assert!(status.success());
    let img = image::open(&out).unwrap();
    assert_eq!((img.width(), img.height()), (64, 48));
}
