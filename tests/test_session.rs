//! Integration tests for `ProcessSession`
//!
//! Drives real `sh`/`cat` processes through the session state machine

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use claude_bridge::{
    BridgeError, ClassifiedEvent, EventKind, EventSubscription, ExitReport, ProcessHandle,
    ProcessSession, SessionId, SessionOptions, SessionState, SpawnSpec, SpawnedProcess, Spawner,
    StreamKind,
};
use futures::FutureExt;
use futures::future::BoxFuture;

const WAIT: Duration = Duration::from_secs(5);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn shell_session(script: &str) -> ProcessSession {
    let options = SessionOptions::builder()
        .program("sh")
        .args(["-c", script])
        .stop_grace(Duration::from_millis(500))
        .build();
    ProcessSession::new(SessionId::generate(), options)
}

fn cat_session() -> ProcessSession {
    let options = SessionOptions::builder()
        .program("cat")
        .args(Vec::<String>::new())
        .stop_grace(Duration::from_millis(500))
        .build();
    ProcessSession::new(SessionId::generate(), options)
}

async fn next_event(events: &mut EventSubscription) -> ClassifiedEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("subscription closed")
}

async fn next_error(events: &mut EventSubscription) -> ClassifiedEvent {
    loop {
        let event = next_event(events).await;
        if event.kind() == EventKind::Error {
            return event;
        }
    }
}

async fn wait_for_state(session: &ProcessSession, target: SessionState) {
    let mut state = session.watch_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("session never reached {target:?}"))
        .expect("state channel closed");
}

#[tokio::test]
async fn test_send_while_idle_fails() {
    init_logger();
    let session = cat_session();

    let err = session.send("hello").unwrap_err();
    assert!(matches!(err, BridgeError::NotRunning(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.pid(), None);
}

#[tokio::test]
async fn test_echo_round_trip() {
    init_logger();
    let session = cat_session();
    let mut events = session.subscribe();

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.pid().is_some());

    session.send("<thinking>hello").unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::Thinking);
    assert_eq!(event.text(), "<thinking>hello");
    assert_eq!(event.stream(), Some(StreamKind::Stdout));

    session.send("plain answer").unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::Result);
    assert_eq!(event.text(), "plain answer");

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.pid(), None);
    assert!(matches!(
        session.send("late"),
        Err(BridgeError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_blank_lines_are_dropped() {
    init_logger();
    let session = cat_session();
    let mut events = session.subscribe();
    session.start().await.unwrap();

    session.send("").unwrap();
    session.send("   ").unwrap();
    session.send("<result>after blanks").unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.text(), "<result>after blanks");

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_double_start_rejected() {
    init_logger();
    let session = cat_session();

    session.start().await.unwrap();
    let pid = session.pid();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyRunning(_)), "got {err:?}");
    assert_eq!(session.pid(), pid);
    assert_eq!(session.state(), SessionState::Running);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_launch_error_marks_failed() {
    init_logger();
    let options = SessionOptions::builder()
        .program("/nonexistent/claude-bridge-missing-program")
        .build();
    let session = ProcessSession::new(SessionId::generate(), options);
    let mut events = session.subscribe();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::LaunchError { .. }), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.pid(), None);

    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::Error);
    assert_eq!(event.stream(), Some(StreamKind::Session));

    // Failed is not a rest state; stop settles it
    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
}

struct RefusingSpawner;

impl Spawner for RefusingSpawner {
    fn spawn(&self, _spec: &SpawnSpec) -> std::io::Result<SpawnedProcess> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "spawning disabled",
        ))
    }
}

#[tokio::test]
async fn test_custom_spawner_failure() {
    init_logger();
    let session = ProcessSession::with_spawner(
        SessionId::new("refused"),
        SessionOptions::default(),
        Arc::new(RefusingSpawner),
    );

    match session.start().await {
        Err(BridgeError::LaunchError { program, source }) => {
            assert_eq!(program, "claude");
            assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
        }
        other => panic!("expected launch error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);

    // A failed session may be started again
    let err = session.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::LaunchError { .. }));
}

#[tokio::test]
async fn test_stderr_lines_are_errors() {
    init_logger();
    let session = shell_session("echo oops >&2; exec cat");
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::Error);
    assert_eq!(event.text(), "oops");
    assert_eq!(event.stream(), Some(StreamKind::Stderr));

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_crash_marks_failed() {
    init_logger();
    let session = shell_session("echo bye; exit 3");
    let mut events = session.subscribe();
    session.start().await.unwrap();

    wait_for_state(&session, SessionState::Failed).await;
    assert_eq!(session.pid(), None);

    let error = next_error(&mut events).await;
    assert!(error.text().contains("exit code 3"), "got {:?}", error.text());
    assert_eq!(error.stream(), Some(StreamKind::Session));

    assert!(matches!(session.send("x"), Err(BridgeError::NotRunning(_))));
}

#[tokio::test]
async fn test_clean_exit_marks_stopped() {
    init_logger();
    let session = shell_session("echo done");
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.text(), "done");

    wait_for_state(&session, SessionState::Stopped).await;
    assert_eq!(session.pid(), None);

    // Stopped is a rest state
    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_unterminated_output_is_flushed_at_exit() {
    init_logger();
    let session = shell_session("printf 'no newline'");
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.text(), "no newline");
}

#[tokio::test]
async fn test_stop_is_noop_when_idle() {
    init_logger();
    let session = cat_session();

    session.stop().await.unwrap();
    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_no_events_after_stop() {
    init_logger();
    let session = shell_session("while true; do echo tick; sleep 0.02; done");
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.text(), "tick");

    session.stop().await.unwrap();
    let _ = events.drain();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(events.try_recv().is_none(), "event delivered after stop()");
}

#[tokio::test]
async fn test_restart_after_stop() {
    init_logger();
    let session = cat_session();
    let mut events = session.subscribe();

    session.start().await.unwrap();
    let first_pid = session.pid();
    session.stop().await.unwrap();

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_ne!(session.pid(), first_pid);

    session.send("<execute>again").unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.kind(), EventKind::Command);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    init_logger();
    let options = SessionOptions::builder()
        .program("sh")
        .args(["-c", "trap '' TERM; exec sleep 30"])
        .stop_grace(Duration::from_millis(300))
        .build();
    let session = ProcessSession::new(SessionId::generate(), options);
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    session.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(session.state(), SessionState::Stopped);
}

/// A process that ignores every signal and never exits
struct UnkillableHandle;

impl ProcessHandle for UnkillableHandle {
    fn id(&self) -> Option<u32> {
        None
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn kill(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitReport>> {
        Ok(None)
    }

    fn wait(&mut self) -> BoxFuture<'_, std::io::Result<ExitReport>> {
        futures::future::pending().boxed()
    }
}

struct UnkillableSpawner;

impl Spawner for UnkillableSpawner {
    fn spawn(&self, _spec: &SpawnSpec) -> std::io::Result<SpawnedProcess> {
        Ok(SpawnedProcess {
            stdin: None,
            stdout: None,
            stderr: None,
            handle: Box::new(UnkillableHandle),
        })
    }
}

#[tokio::test]
async fn test_unreaped_process_times_out() {
    init_logger();
    let options = SessionOptions::builder()
        .stop_grace(Duration::from_millis(100))
        .build();
    let session = ProcessSession::with_spawner(
        SessionId::new("unkillable"),
        options,
        Arc::new(UnkillableSpawner),
    );
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let started = Instant::now();
    let err = session.stop().await.unwrap_err();
    assert!(matches!(err, BridgeError::TimedOut(_)), "got {err:?}");
    assert_eq!(err.code(), "timed_out");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(session.state(), SessionState::Failed);

    let event = next_error(&mut events).await;
    assert!(event.text().contains("did not exit after kill"));
}

#[tokio::test]
async fn test_start_stop_race() {
    init_logger();
    for _ in 0..10 {
        let session = Arc::new(cat_session());

        let (started, stopped) = tokio::join!(session.start(), session.stop());
        started.unwrap();
        stopped.unwrap();

        let state = session.state();
        assert!(
            matches!(state, SessionState::Running | SessionState::Stopped),
            "unexpected state {state:?}"
        );
        assert_eq!(state == SessionState::Running, session.pid().is_some());

        session.stop().await.unwrap();
        assert_eq!(session.pid(), None);
    }
}

#[tokio::test]
async fn test_close_refuses_restart() {
    init_logger();
    let session = cat_session();
    session.start().await.unwrap();

    session.close().await.unwrap();
    assert!(session.is_closed());
    assert_eq!(session.state(), SessionState::Stopped);

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::SessionClosed(_)), "got {err:?}");
}

#[tokio::test]
async fn test_working_directory() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let options = SessionOptions::builder()
        .program("sh")
        .args(["-c", "pwd"])
        .cwd(dir.path())
        .build();
    let session = ProcessSession::new(SessionId::generate(), options);
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let event = next_event(&mut events).await;
    let name = dir.path().file_name().unwrap().to_str().unwrap();
    assert!(event.text().ends_with(name), "got {:?}", event.text());
}

#[tokio::test]
async fn test_dangerous_env_is_filtered() {
    init_logger();
    let options = SessionOptions::builder()
        .program("sh")
        .args(["-c", r#"echo "${NODE_OPTIONS:-unset} $BRIDGE_TEST_VAR""#])
        .env("NODE_OPTIONS", "--require /tmp/evil.js")
        .env("BRIDGE_TEST_VAR", "hello")
        .build();
    let session = ProcessSession::new(SessionId::generate(), options);
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.text(), "unset hello");
}

#[tokio::test]
async fn test_every_subscriber_gets_every_event() {
    init_logger();
    let session = cat_session();
    let mut first = session.subscribe();
    let mut second = session.subscribe();
    session.start().await.unwrap();

    for line in ["one", "two", "three"] {
        session.send(line).unwrap();
    }
    for events in [&mut first, &mut second] {
        for expected in ["one", "two", "three"] {
            assert_eq!(next_event(events).await.text(), expected);
        }
    }

    drop(second);
    session.send("four").unwrap();
    assert_eq!(next_event(&mut first).await.text(), "four");

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_state_changes_are_observable() {
    init_logger();
    let session = cat_session();
    let mut state = session.watch_state();
    assert_eq!(*state.borrow_and_update(), SessionState::Idle);

    session.start().await.unwrap();
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), SessionState::Running);

    session.stop().await.unwrap();
    assert_eq!(*state.borrow_and_update(), SessionState::Stopped);
}

#[tokio::test]
async fn test_overlong_line_is_split_and_reported() {
    init_logger();
    let options = SessionOptions::builder()
        .program("sh")
        .args(["-c", "head -c 3000 /dev/zero | tr '\\000' a; echo; exec cat"])
        .stop_grace(Duration::from_millis(500))
        .max_line_length(1000)
        .build();
    let session = ProcessSession::new(SessionId::generate(), options);
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let mut received = 0;
    let mut reported = false;
    while received < 3000 || !reported {
        let event = next_event(&mut events).await;
        assert_eq!(event.stream(), Some(StreamKind::Stdout));
        if event.kind() == EventKind::Error {
            assert!(event.text().contains("exceeded 1000 bytes"), "got {:?}", event.text());
            reported = true;
        } else {
            assert!(event.text().len() <= 1000);
            assert!(event.text().bytes().all(|b| b == b'a'));
            received += event.text().len();
        }
    }
    assert_eq!(received, 3000);

    session.stop().await.unwrap();
}
