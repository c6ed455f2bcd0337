use super::*;
use crate::draw::{DrawCommand, Shape, Style, TextRenderer};
use crate::foundation::core::{Canvas, Fps, Point, Rgba8};

fn scheduler(stagger_ms: u64) -> AnimationScheduler {
    let stage = Stage::new(
        Canvas {
            width: 96,
            height: 64,
        },
        Rgba8::WHITE,
        Fps::new(30, 1).unwrap(),
        TextRenderer::default(),
    )
    .unwrap();
    AnimationScheduler::new(stage, Duration::from_millis(stagger_ms))
}

fn boxes(n: usize) -> CommandList {
    (0..n)
        .map(|i| DrawCommand::Shape {
            shape: Shape::Rect {
                origin: Point::new(4.0 + 8.0 * i as f64, 8.0),
                width: 6.0,
                height: 40.0,
            },
            style: Style {
                seed: i as u64,
                ..Style::default()
            },
        })
        .collect::<Vec<_>>()
        .into()
}

#[tokio::test(start_paused = true)]
async fn replay_draws_every_command_after_stagger() {
    let sched = scheduler(200);
    let start = Instant::now();
    let handle = sched.play(boxes(5));
    let outcome = handle.finished().await;
    assert_eq!(
        outcome,
        ReplayOutcome {
            executed: 5,
            failed: 0,
            cancelled: false
        }
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(800), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(800) + Duration::from_millis(40), "{elapsed:?}");
    assert_eq!(sched.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn replays_are_deterministic_and_match_immediate_render() {
    let sched = scheduler(50);
    let list = boxes(4);

    sched.play(list.clone()).finished().await;
    let first = sched.stage().fingerprint();
    sched.play(list.clone()).finished().await;
    assert_eq!(sched.stage().fingerprint(), first);

    let outcome = sched.render_immediately(&list);
    assert_eq!(outcome.executed, 4);
    assert_eq!(sched.stage().fingerprint(), first);
}

#[tokio::test(start_paused = true)]
async fn nothing_draws_after_cancel() {
    let sched = scheduler(200);
    let handle = sched.play(boxes(10));
    tokio::time::sleep(Duration::from_millis(450)).await;
    handle.cancel();
    let frozen = sched.stage().fingerprint();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sched.stage().fingerprint(), frozen);
    let outcome = handle.finished().await;
    assert!(outcome.cancelled);
    assert_eq!(outcome.executed, 3);
}

#[tokio::test(start_paused = true)]
async fn new_play_cancels_previous_replay() {
    let sched = scheduler(200);
    let first = sched.play(boxes(10));
    tokio::time::sleep(Duration::from_millis(250)).await;
    let second = sched.play(boxes(1));

    assert!(first.finished().await.cancelled);
    assert_eq!(second.finished().await.executed, 1);

    // Only the second list's single box remains on the cleared surface.
    let expected = {
        let other = scheduler(0);
        other.render_immediately(&boxes(1));
        other.stage().fingerprint()
    };
    assert_eq!(sched.stage().fingerprint(), expected);
}

#[tokio::test(start_paused = true)]
async fn scheduler_cancel_stops_live_replay() {
    let sched = scheduler(100);
    let handle = sched.play(boxes(6));
    tokio::time::sleep(Duration::from_millis(150)).await;
    sched.cancel();
    assert_eq!(sched.state(), PlaybackState::Idle);
    let outcome = handle.finished().await;
    assert!(outcome.cancelled);
    assert!(outcome.executed <= 2);
}

#[tokio::test(start_paused = true)]
async fn failing_commands_are_skipped() {
    let sched = scheduler(10);
    let mut cmds: Vec<DrawCommand> = boxes(2).iter().cloned().collect();
    cmds.insert(
        1,
        DrawCommand::Shape {
            shape: Shape::Polygon(vec![Point::new(0.0, 0.0)]),
            style: Style::default(),
        },
    );
    let outcome = sched.play(cmds.into()).finished().await;
    assert_eq!(outcome.executed, 2);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.cancelled);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_detaches() {
    let sched = scheduler(20);
    let blank = sched.stage().fingerprint();
    let mut states = sched.subscribe_state();
    drop(sched.play(boxes(3)));
    assert!(matches!(
        *states.borrow_and_update(),
        PlaybackState::Playing { total: 3, .. }
    ));
    states
        .wait_for(|s| *s == PlaybackState::Idle)
        .await
        .unwrap();
    assert_ne!(sched.stage().fingerprint(), blank);
}

#[tokio::test(start_paused = true)]
async fn empty_list_finishes_immediately_on_cleared_surface() {
    let sched = scheduler(200);
    sched.render_immediately(&boxes(2));
    let outcome = sched.play(Vec::<DrawCommand>::new().into()).finished().await;
    assert_eq!(outcome, ReplayOutcome::default());

    let blank = scheduler(0).stage().fingerprint();
    assert_eq!(sched.stage().fingerprint(), blank);
}
