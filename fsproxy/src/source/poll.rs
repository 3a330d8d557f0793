use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use super::{LineSender, forward, reader::LineReader};

/// Polling tailing: stat the input every `interval` and scan when its size changed.
pub(super) async fn watch(
    mut reader: LineReader,
    path: &Path,
    interval: Duration,
    tx: LineSender,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut size = reader.skip_existing().await.context("seek input")?;

    loop {
        let current = input_size(path).await?;
        if current == size {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(interval) => continue,
            }
        }
        size = current;

        let lines = reader.read_lines().await.context("read input")?;
        if !forward(&tx, lines, &cancel).await {
            return Ok(());
        }
    }
}

async fn input_size(path: &Path) -> anyhow::Result<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("stat input {}", path.display()))?;
    Ok(metadata.len())
}
