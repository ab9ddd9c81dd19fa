//! End-to-end supervision tests against real child processes

use std::time::{Duration, Instant};

use pcmd_core::{
    acquire_or_report, spawn_dispatcher, ChildCommand, CleanupTrigger, Direction, Identity,
    LockOutcome, SessionPaths, StopReason, StopSignal, Supervisor, Termination,
};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn sh(script: &str) -> ChildCommand {
    ChildCommand::new("sh", ["-c", script])
}

#[tokio::test]
async fn echo_round_trip_then_input_close() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::spawn(
        &ChildCommand::new("cat", Vec::<String>::new()),
        &dir.path().join("cat.log"),
    )
    .unwrap();

    let (mut source, input) = tokio::io::duplex(256);
    let (output, sink) = tokio::io::duplex(256);

    let session = tokio::spawn(async move {
        supervisor
            .run(input, output, Duration::from_secs(5), &StopSignal::never())
            .await
    });

    source.write_all(b"ping\n").await.unwrap();
    let mut lines = BufReader::new(sink).lines();
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.as_deref(), Some("ping"));

    drop(source);
    let report = session.await.unwrap().unwrap();
    assert_eq!(
        report.trigger,
        Some(CleanupTrigger::StreamClosed(Direction::Input))
    );
    assert!(!report.termination.was_killed());
    assert_eq!(report.stream(Direction::Input).map(|s| s.bytes), Some(5));
}

#[tokio::test]
async fn grace_period_bounds_a_stubborn_child() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::spawn(
        &sh("trap '' TERM INT HUP PIPE; sleep 5"),
        &dir.path().join("stubborn.log"),
    )
    .unwrap();

    let (source, input) = tokio::io::duplex(64);
    let (output, _sink) = tokio::io::duplex(64);
    drop(source);

    let grace = Duration::from_secs(1);
    let started = Instant::now();
    let report = supervisor
        .run(input, output, grace, &StopSignal::never())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(report.termination, Termination::Killed(_)));
    assert!(elapsed >= grace);
    assert!(elapsed < grace + Duration::from_millis(1500));
}

#[tokio::test]
async fn child_that_exits_during_grace_is_not_killed() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::spawn(
        &sh("cat >/dev/null; sleep 0.2; exit 7"),
        &dir.path().join("polite.log"),
    )
    .unwrap();

    let (source, input) = tokio::io::duplex(64);
    let (output, _sink) = tokio::io::duplex(64);
    drop(source);

    let report = supervisor
        .run(input, output, Duration::from_secs(5), &StopSignal::never())
        .await
        .unwrap();

    match report.termination {
        Termination::ExitedDuringGrace(status) => assert_eq!(status.code(), Some(7)),
        other => panic!("unexpected termination {:?}", other),
    }
    assert!(report.cleanup_elapsed.unwrap() < Duration::from_secs(5));
}

#[tokio::test]
async fn stop_request_kills_after_grace_and_fires_cleanup_signal() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::spawn(
        &sh("trap '' TERM INT HUP PIPE; echo started >&2; sleep 5"),
        &dir.path().join("stop.log"),
    )
    .unwrap();
    let cleanup = supervisor.cleanup_signal();

    let (_source, input) = tokio::io::duplex(64);
    let (output, _sink) = tokio::io::duplex(64);
    let (stop, dispatcher) = spawn_dispatcher(
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            StopReason::HangUp
        },
        |_| {},
    );

    let report = supervisor
        .run(input, output, Duration::from_millis(500), &stop)
        .await
        .unwrap();

    assert_eq!(dispatcher.await.unwrap(), StopReason::HangUp);
    assert_eq!(report.trigger, Some(CleanupTrigger::Stopped));
    assert!(report.termination.was_killed());
    assert!(cleanup.is_cancelled());

    let log = std::fs::read_to_string(dir.path().join("stop.log")).unwrap();
    assert!(log.contains("started"));
}

#[tokio::test]
async fn locked_session_removes_lock_file_when_done() {
    let dir = TempDir::new().unwrap();
    let identity = Identity::new("bob", "h1", 22);
    let paths = SessionPaths::locking(dir.path(), &identity);
    paths.ensure_files_dir().unwrap();

    let guard = match acquire_or_report(&paths.lock).unwrap() {
        LockOutcome::Acquired(guard) => guard,
        LockOutcome::Contended => panic!("lock should be free"),
    };
    assert!(matches!(
        acquire_or_report(&paths.lock).unwrap(),
        LockOutcome::Contended
    ));

    let supervisor = Supervisor::spawn(&sh("exit 0"), &paths.log).unwrap();
    let (_source, input) = tokio::io::duplex(64);
    let (output, _sink) = tokio::io::duplex(64);
    let report = supervisor
        .run(input, output, Duration::from_secs(2), &StopSignal::never())
        .await
        .unwrap();
    assert!(!report.termination.was_killed());

    guard.release().unwrap();
    assert!(!paths.lock.exists());
    assert!(paths.log.exists());
}
