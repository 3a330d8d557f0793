use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{invoker::Invoker, sink::OutputSink, source::LineReceiver};

/// Fans lines out to concurrent invocations and writes their responses.
pub struct Dispatcher<I> {
    invoker: Arc<I>,
    sink: Arc<OutputSink>,
    tracker: TaskTracker,
    // None = unbounded fan-out
    limit: Option<Arc<Semaphore>>,
}

impl<I: Invoker> Dispatcher<I> {
    pub fn new(
        invoker: Arc<I>,
        sink: Arc<OutputSink>,
        tracker: TaskTracker,
        max_in_flight: Option<usize>,
    ) -> Self {
        Self {
            invoker,
            sink,
            tracker,
            limit: max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Run the intake loop on the tracker. Every dispatched line is tracked
    /// there as well, so waiting on the tracker waits for the full drain.
    pub fn spawn(self, lines: LineReceiver, cancel: CancellationToken) {
        let tracker = self.tracker.clone();
        tracker.spawn(async move { self.intake(lines, cancel).await });
    }

    async fn intake(self, mut lines: LineReceiver, cancel: CancellationToken) {
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Dispatcher: cancelled, {} task(s) still tracked", self.tracker.len());
                    break;
                },
                line = lines.recv() => match line {
                    Some(line) => line,
                    None => {
                        log::info!("Dispatcher: line source closed");
                        break;
                    }
                },
            };

            let permit = match self.acquire(&cancel).await {
                Some(permit) => permit,
                None => break,
            };
            self.dispatch(line, permit);
        }
    }

    /// Wait for a free slot when fan-out is bounded. `None` means cancelled.
    async fn acquire(&self, cancel: &CancellationToken) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(limit) = &self.limit else {
            return Some(None);
        };
        tokio::select! {
            _ = cancel.cancelled() => None,
            permit = Arc::clone(limit).acquire_owned() => permit.ok().map(Some),
        }
    }

    fn dispatch(&self, line: String, permit: Option<OwnedSemaphorePermit>) {
        let invoker = Arc::clone(&self.invoker);
        let sink = Arc::clone(&self.sink);
        self.tracker.spawn(async move {
            process_line(invoker.as_ref(), &sink, &line).await;
            drop(permit);
        });
    }
}

/// One unit of work. Failures end here: they are logged and never abort the run.
async fn process_line<I: Invoker>(invoker: &I, sink: &OutputSink, line: &str) {
    let body = match invoker.invoke(line).await {
        Ok(body) => body,
        Err(e) => {
            log::error!("Dispatcher: request failed for line {}: {:#}", line, e);
            return;
        }
    };
    log::debug!("Dispatcher: got response {}", String::from_utf8_lossy(&body));

    if let Err(e) = sink.write(&body).await {
        log::error!("Dispatcher: failed to write response: {:#}", e);
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod dispatcher_test;
