//! Integration tests for the PTY command runner

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;

use mdemon_core::Error;
use mdemon_daemon::{run_tty, run_tty_stream};

fn sh() -> PathBuf {
    PathBuf::from("/bin/sh")
}

fn args(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[test]
fn test_streamed_chunks_arrive_in_order_and_match_capture() {
    let chunks: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&chunks);

    let out = run_tty_stream(
        &sh(),
        &args("printf one; sleep 0.2; printf two; sleep 0.2; printf three"),
        Duration::from_secs(5),
        move |chunk| sink.lock().unwrap().push(chunk.to_string()),
    )
    .expect("command should run");

    assert!(out.success());
    let streamed: String = chunks.lock().unwrap().concat();
    assert_eq!(streamed, out.text);

    // Order is preserved: "one" was forwarded before "three".
    let one = streamed.find("one").expect("first chunk");
    let three = streamed.find("three").expect("last chunk");
    assert!(one < three);
}

#[test]
fn test_timeout_kills_and_reaps_child() {
    let dir = TempDir::new().expect("tempdir");
    let pid_file = dir.path().join("pid");
    let script = format!("echo $$ > {}; sleep 5", pid_file.display());

    let started = Instant::now();
    let err = run_tty(&sh(), &args(&script), Duration::from_secs(1)).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Timeout { seconds: 1, .. }));
    assert!(elapsed >= Duration::from_secs(1));
    // Deadline plus poll granularity and kill overhead.
    assert!(
        elapsed < Duration::from_millis(1500),
        "child should be killed shortly after the deadline, took {:?}",
        elapsed
    );

    let pid: i32 = fs::read_to_string(&pid_file)
        .expect("pid file written before the timeout")
        .trim()
        .parse()
        .expect("pid file holds a pid");
    // Signal 0 probes existence; a reaped child is no longer signalable.
    assert!(
        kill(Pid::from_raw(pid), None).is_err(),
        "child {} should not remain running after the timeout",
        pid
    );
}

#[test]
fn test_output_flushed_at_exit_is_not_lost() {
    let out = run_tty(
        &sh(),
        &args("printf 'line one\\n'; printf 'no newline at end'"),
        Duration::from_secs(5),
    )
    .expect("command should run");

    assert!(out.text.contains("line one"));
    assert!(out.text.contains("no newline at end"));
}

#[test]
fn test_multiline_output_captured_completely() {
    let out = run_tty(
        &sh(),
        &args("for i in 1 2 3 4 5; do echo line-$i; done"),
        Duration::from_secs(5),
    )
    .expect("command should run");

    assert!(out.success());
    for i in 1..=5 {
        assert!(out.text.contains(&format!("line-{}", i)));
    }
}
