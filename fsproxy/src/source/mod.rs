use std::path::PathBuf;
use std::time::Duration;

use tokio::{fs::File, sync::mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::{ProxyConfig, WatchStrategy};

mod event;
mod poll;
pub(crate) mod reader;

use reader::LineReader;

pub type LineReceiver = mpsc::Receiver<String>;
pub type LineSender = mpsc::Sender<String>;
/// Fatal errors of background tasks, observed by the proxy run loop.
pub type FatalSender = mpsc::UnboundedSender<anyhow::Error>;

const LINE_CHANNEL_CAPACITY: usize = 1024;

/// Produces the lines appended to the input file after it was started.
pub struct LineSource {
    path: PathBuf,
    lock_path: PathBuf,
    lock_poll_interval: Duration,
    strategy: WatchStrategy,
}

impl LineSource {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            path: config.input_path().to_path_buf(),
            lock_path: config.lock_path(),
            lock_poll_interval: config.lock_poll_interval(),
            strategy: config.strategy(),
        }
    }

    /// Start watching on `tracker`. The returned channel closes when the
    /// source stops: cancelled, notifications ended, or a fatal error was
    /// reported on `fatal`.
    pub fn spawn(
        self,
        file: File,
        tracker: &TaskTracker,
        cancel: CancellationToken,
        fatal: FatalSender,
    ) -> LineReceiver {
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let reader = LineReader::new(file);

        tracker.spawn(async move {
            log::info!(
                "LineSource: watching {} ({:?})",
                self.path.display(),
                self.strategy
            );
            let result = match self.strategy {
                WatchStrategy::Notify => {
                    event::watch(
                        reader,
                        &self.path,
                        &self.lock_path,
                        self.lock_poll_interval,
                        tx,
                        cancel,
                    )
                    .await
                }
                WatchStrategy::Poll(interval) => {
                    poll::watch(reader, &self.path, interval, tx, cancel).await
                }
            };

            match result {
                Ok(()) => log::info!("LineSource: stopped watching {}", self.path.display()),
                Err(e) => {
                    log::error!("LineSource: {:#}", e);
                    let _ = fatal.send(e);
                }
            }
        });

        rx
    }
}

/// Push lines to the dispatcher in file order. Returns false once the
/// source should stop: cancelled or nobody is listening anymore.
async fn forward(tx: &LineSender, lines: Vec<String>, cancel: &CancellationToken) -> bool {
    for line in lines {
        log::debug!("LineSource: new line {}", line);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            sent = tx.send(line) => {
                if sent.is_err() {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
