//! End-to-end engine scenarios: cooldown timing across identities,
//! subscriber join semantics, and cold start from persisted storage.

use std::time::{Duration, Instant};

use canvas::core::color::Color;
use canvas::core::connection::ConnectionState;
use canvas::core::types::{Cell, MutationEvent, MutationRequest, Rejection};
use canvas::engine::Engine;
use canvas::pipeline::AdmissionMode;
use canvas::test_support::{memory_config, recording_engine, temp_file_config};

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

/// 2x2 board, 5s cooldown.
///
/// Sequence (t relative to a fixed origin):
/// 1. t=0.0  a paints (0,0) red     -> accepted, broadcast
/// 2. t=0.1  b paints (0,0) green   -> accepted (independent cooldown)
/// 3. t=2.0  a paints (1,1) blue    -> rejected, ~3.0s remaining
/// 4. t=6.0  a paints (1,1) blue    -> accepted
///
/// Final (0,0) is green because b was admitted after a.
#[test]
fn two_identities_share_board_with_independent_cooldowns() {
    let (engine, durability) = recording_engine(memory_config(2, 2, 5_000));
    let (viewer, initial) = engine.subscribe("viewer");
    assert!(initial.iter().all(|(_, cell)| *cell == Cell::blank(Color::White)));

    let t0 = Instant::now();
    let enforced = AdmissionMode::Enforced;

    let accepted = engine
        .apply_at(&MutationRequest::new("a", 0, 0, "red"), enforced, t0)
        .expect("a at t=0");
    assert_eq!(
        *accepted.event,
        MutationEvent {
            x: 0,
            y: 0,
            color: Color::Red,
            editor: "a".to_string()
        }
    );
    assert_eq!(engine.get(0, 0).expect("get").color, Color::Red);

    engine
        .apply_at(&MutationRequest::new("b", 0, 0, "green"), enforced, t0 + secs(0.1))
        .expect("b at t=0.1");

    let err = engine
        .apply_at(&MutationRequest::new("a", 1, 1, "blue"), enforced, t0 + secs(2.0))
        .expect_err("a at t=2 is cooling down");
    let remaining = err.remaining_secs().expect("cooldown rejection");
    assert!((remaining - 3.0).abs() < 1e-6, "remaining {remaining}");
    assert_eq!(engine.get(1, 1).expect("get"), Cell::blank(Color::White));

    engine
        .apply_at(&MutationRequest::new("a", 1, 1, "blue"), enforced, t0 + secs(6.0))
        .expect("a at t=6");

    assert_eq!(engine.get(0, 0).expect("get"), Cell::painted(Color::Green, "b"));
    assert_eq!(engine.get(1, 1).expect("get"), Cell::painted(Color::Blue, "a"));

    let seen: Vec<(u32, u32, Color, String)> = std::iter::from_fn(|| viewer.try_recv())
        .map(|e| (e.x, e.y, e.color, e.editor.clone()))
        .collect();
    assert_eq!(
        seen,
        vec![
            (0, 0, Color::Red, "a".to_string()),
            (0, 0, Color::Green, "b".to_string()),
            (1, 1, Color::Blue, "a".to_string()),
        ]
    );
    assert_eq!(durability.writes(), seen);
}

#[test]
fn rejection_exactly_at_boundary_is_lifted() {
    let (engine, _) = recording_engine(memory_config(2, 2, 5_000));
    let t0 = Instant::now();
    let req = MutationRequest::new("a", 0, 0, "red");

    engine
        .apply_at(&req, AdmissionMode::Enforced, t0)
        .expect("first");
    assert!(matches!(
        engine.apply_at(&req, AdmissionMode::Enforced, t0 + secs(4.999)),
        Err(Rejection::CooldownActive { .. })
    ));
    engine
        .apply_at(&req, AdmissionMode::Enforced, t0 + secs(5.0))
        .expect("at exactly the cooldown duration");
}

/// A subscriber that joins after a publish does not receive that event, but
/// the board it receives on join already reflects it.
#[test]
fn late_subscriber_gets_snapshot_not_history() {
    let (engine, _) = recording_engine(memory_config(2, 2, 5_000));
    let (early, _) = engine.subscribe("early");

    engine
        .apply_exempt(&MutationRequest::new("a", 1, 0, "yellow"))
        .expect("accepted");

    let (late, board) = engine.subscribe("late");
    assert_eq!(board.get(1, 0), Some(&Cell::painted(Color::Yellow, "a")));
    assert!(late.try_recv().is_none());
    assert_eq!(early.try_recv().map(|e| e.color), Some(Color::Yellow));
    assert_eq!(engine.subscriber_count(), 2);

    drop(late);
    assert_eq!(engine.subscriber_count(), 1);
}

#[test]
fn invalid_requests_leave_board_and_viewers_untouched() {
    let (engine, durability) = recording_engine(memory_config(2, 2, 5_000));
    let (viewer, before) = engine.subscribe("viewer");

    for req in [
        MutationRequest::new("a", 0, 0, "chartreuse"),
        MutationRequest::new("a", -1, 0, "red"),
        MutationRequest::new("a", 0, 2, "red"),
    ] {
        let err = engine.apply(&req).expect_err("rejected");
        assert!(!err.is_retryable());
    }

    assert_eq!(engine.snapshot(), before);
    assert!(viewer.try_recv().is_none());
    assert!(durability.writes().is_empty());
}

#[test]
fn shutdown_closes_live_subscriptions() {
    let (engine, _) = recording_engine(memory_config(2, 2, 5_000));
    let (first, _) = engine.subscribe("one");
    let (second, _) = engine.subscribe("two");

    assert_eq!(engine.shutdown(), 2);
    assert_eq!(first.state(), ConnectionState::Closed);
    assert_eq!(second.state(), ConnectionState::Closed);
    assert_eq!(engine.subscriber_count(), 0);
}

#[tokio::test]
async fn subscriber_receives_events_asynchronously() {
    let (engine, _) = recording_engine(memory_config(2, 2, 5_000));
    let (subscription, _) = engine.subscribe("viewer");

    let reader = tokio::spawn(async move {
        let event = subscription.recv().await.expect("event");
        (event.x, event.y, event.color)
    });

    tokio::task::yield_now().await;
    engine
        .apply(&MutationRequest::new("a", 1, 1, "black"))
        .expect("accepted");

    let received = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("delivered in time")
        .expect("reader task");
    assert_eq!(received, (1, 1, Color::Black));
}

/// Writes survive a restart through the file store; cooldowns do not.
#[test]
fn file_backed_engine_restores_board_on_cold_start() {
    let (_temp, config) = temp_file_config(3, 3, 5_000);

    {
        let engine = Engine::open(config.clone()).expect("open");
        engine
            .apply(&MutationRequest::new("a", 2, 1, "red"))
            .expect("accepted");
        engine
            .apply(&MutationRequest::new("b", 2, 1, "blue"))
            .expect("accepted");
        engine
            .apply(&MutationRequest::new("c", 0, 0, "green"))
            .expect("accepted");
    }

    let engine = Engine::open(config.clone()).expect("reopen");
    assert_eq!(engine.get(2, 1).expect("get"), Cell::painted(Color::Blue, "b"));
    assert_eq!(engine.get(0, 0).expect("get"), Cell::painted(Color::Green, "c"));
    assert_eq!(engine.get(1, 1).expect("get"), Cell::blank(Color::White));

    // Startup compaction left one line per painted cell.
    let contents = std::fs::read_to_string(&config.storage.path).expect("read log");
    assert_eq!(contents.lines().count(), 2);

    engine
        .apply(&MutationRequest::new("a", 1, 1, "black"))
        .expect("cooldown records are not persisted");
}
