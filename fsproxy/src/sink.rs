use std::path::Path;

use anyhow::Context;
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    sync::Mutex,
};

/// Append-only output file shared by all in-flight requests.
///
/// The lock is held for one response at a time, so bodies never interleave.
pub struct OutputSink {
    file: Mutex<Option<File>>,
}

impl OutputSink {
    /// Open `path` for appending, creating it if absent.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open output file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(Some(File::from_std(file))),
        })
    }

    pub async fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("output file is closed"))?;
        file.write_all(data).await.context("write response")?;
        file.flush().await.context("flush response")?;
        Ok(())
    }

    /// Flush and release the file handle. Calling it again is a no-op.
    pub async fn close(&self) -> anyhow::Result<()> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await.context("close output file")?;
        }
        Ok(())
    }
}
