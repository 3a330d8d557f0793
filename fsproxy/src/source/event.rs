use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use notify::{
    EventKind, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{LineSender, forward, reader::LineReader};

/// Event-driven tailing: scan the input whenever the OS reports a write.
pub(super) async fn watch(
    mut reader: LineReader,
    path: &Path,
    lock_path: &Path,
    lock_poll_interval: Duration,
    tx: LineSender,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = fs_tx.send(res);
    })
    .context("new watcher")?;
    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .with_context(|| format!("watch {}", path.display()))?;

    // subscribe before seeking so no append slips between the two
    reader.skip_existing().await.context("seek input")?;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            event = fs_rx.recv() => match event {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(anyhow::Error::new(e).context("watcher errors")),
                None => return Ok(()),
            },
        };

        if !is_write(&event.kind) {
            continue;
        }

        if !wait_for_unlock(lock_path, lock_poll_interval, &cancel).await {
            return Ok(());
        }

        let lines = reader.read_lines().await.context("read input")?;
        if !forward(&tx, lines, &cancel).await {
            return Ok(());
        }
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_)
            | EventKind::Create(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Block while an external writer holds the lock marker. Returns false if
/// cancelled while waiting.
pub(super) async fn wait_for_unlock(
    lock_path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    loop {
        if !tokio::fs::try_exists(lock_path).await.unwrap_or(false) {
            return true;
        }
        log::debug!("LineSource: waiting for {} to clear", lock_path.display());
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
