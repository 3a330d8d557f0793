use std::{path::Path, time::Duration};

use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{LineReceiver, LineSource};
use crate::{config::ProxyConfig, test_support::append};

struct Running {
    lines: LineReceiver,
    fatal: mpsc::UnboundedReceiver<anyhow::Error>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

async fn start(input: &Path, poll: Option<Duration>) -> Running {
    let mut builder = ProxyConfig::builder()
        .rpc_url("http://127.0.0.1:8080/rpc")
        .input_path(input)
        .output_path(input.with_extension("out"))
        .lock_poll_interval(Duration::from_millis(20));
    if let Some(interval) = poll {
        builder = builder.poll_interval(interval);
    }
    let config = builder.build().unwrap();

    let file = tokio::fs::File::open(input).await.unwrap();
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();
    let (fatal_tx, fatal) = mpsc::unbounded_channel();
    let lines = LineSource::new(&config).spawn(file, &tracker, cancel.clone(), fatal_tx);
    tracker.close();

    // let the watcher subscribe and skip existing content
    tokio::time::sleep(Duration::from_millis(200)).await;
    Running {
        lines,
        fatal,
        cancel,
        tracker,
    }
}

async fn next_lines(lines: &mut LineReceiver, n: usize) -> Vec<String> {
    let mut out = Vec::new();
    while out.len() < n {
        let line = tokio::time::timeout(Duration::from_secs(10), lines.recv())
            .await
            .expect("timed out waiting for a line")
            .expect("line channel closed");
        out.push(line);
    }
    out
}

async fn assert_tails_in_order(poll: Option<Duration>) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.pipe");
    tokio::fs::write(&input, "{\"id\":0}\n").await.unwrap();

    let mut running = start(&input, poll).await;

    append(&input, "{\"id\":1}\n{\"id\":").await;
    append(&input, "2}\n").await;
    append(&input, "{\"id\":3}\n{\"id\":4}\n").await;

    let lines = next_lines(&mut running.lines, 4).await;
    assert_eq!(
        lines,
        vec![r#"{"id":1}"#, r#"{"id":2}"#, r#"{"id":3}"#, r#"{"id":4}"#]
    );

    running.cancel.cancel();
    running.tracker.wait().await;
    assert!(running.lines.recv().await.is_none());
    assert!(running.fatal.try_recv().is_err());
}

#[tokio::test]
async fn test_poll_tails_in_order_without_replay() {
    assert_tails_in_order(Some(Duration::from_millis(20))).await;
}

#[tokio::test]
async fn test_notify_tails_in_order_without_replay() {
    assert_tails_in_order(None).await;
}

#[tokio::test]
async fn test_poll_partial_line_waits_for_terminator() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.pipe");
    tokio::fs::write(&input, "").await.unwrap();

    let mut running = start(&input, Some(Duration::from_millis(20))).await;

    append(&input, r#"{"id":9}"#).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(running.lines.try_recv().is_err());

    append(&input, "\n").await;
    assert_eq!(next_lines(&mut running.lines, 1).await, vec![r#"{"id":9}"#]);
    running.cancel.cancel();
}

#[tokio::test]
async fn test_poll_deleted_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.pipe");
    tokio::fs::write(&input, "").await.unwrap();

    let mut running = start(&input, Some(Duration::from_millis(20))).await;
    tokio::fs::remove_file(&input).await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(10), running.fatal.recv())
        .await
        .unwrap()
        .expect("fatal error");
    assert!(format!("{:#}", err).contains("stat input"), "{:#}", err);
    assert!(running.lines.recv().await.is_none());
}

#[tokio::test]
async fn test_notify_waits_for_lock_marker() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.pipe");
    let lock = dir.path().join("request.pipe.lock");
    tokio::fs::write(&input, "").await.unwrap();

    let mut running = start(&input, None).await;

    tokio::fs::write(&lock, "").await.unwrap();
    append(&input, "locked\n").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(running.lines.try_recv().is_err());

    tokio::fs::remove_file(&lock).await.unwrap();
    assert_eq!(next_lines(&mut running.lines, 1).await, vec!["locked"]);
    running.cancel.cancel();
}

#[tokio::test]
async fn test_cancel_interrupts_lock_wait() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("request.pipe");
    tokio::fs::write(&input, "").await.unwrap();
    tokio::fs::write(dir.path().join("request.pipe.lock"), "")
        .await
        .unwrap();

    let mut running = start(&input, None).await;
    append(&input, "never\n").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), running.tracker.wait())
        .await
        .expect("source did not stop while waiting on the lock marker");
    assert!(running.lines.recv().await.is_none());
}
