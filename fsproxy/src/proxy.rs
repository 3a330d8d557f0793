use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::ProxyConfig,
    dispatcher::Dispatcher,
    invoker::{HttpInvoker, Invoker},
    sink::OutputSink,
    source::LineSource,
};

/// Lifecycle of one [`Proxy::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyState {
    Idle,
    Running,
    /// Intake stopped, in-flight requests are finishing
    Draining,
    Stopped,
    Failed,
}

/// Tail-and-forward engine: lines appended to the input file are sent to the
/// RPC endpoint and the response bodies appended to the output file.
pub struct Proxy<I = HttpInvoker> {
    config: ProxyConfig,
    invoker: Arc<I>,
    input: Mutex<Option<std::fs::File>>,
    sink: Arc<OutputSink>,
    started: AtomicBool,
    // token of the current run, cancelled by close()
    stop: Mutex<Option<CancellationToken>>,
    state: watch::Sender<ProxyState>,
}

impl Proxy<HttpInvoker> {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        let invoker = HttpInvoker::new(config.rpc_url().clone())?;
        Self::with_invoker(config, invoker)
    }
}

impl<I: Invoker> Proxy<I> {
    /// Open (or create) the input and output files. Failures here are fatal.
    pub fn with_invoker(config: ProxyConfig, invoker: I) -> anyhow::Result<Self> {
        let input_path = config.input_path();
        if !input_path.exists() {
            std::fs::File::create(input_path)
                .with_context(|| format!("create input file {}", input_path.display()))?;
        }
        let input = std::fs::File::open(input_path)
            .with_context(|| format!("open input file {}", input_path.display()))?;
        let sink = OutputSink::open(config.output_path())?;

        let (state, _) = watch::channel(ProxyState::Idle);
        Ok(Self {
            config,
            invoker: Arc::new(invoker),
            input: Mutex::new(Some(input)),
            sink: Arc::new(sink),
            started: AtomicBool::new(false),
            stop: Mutex::new(None),
            state,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn state(&self) -> ProxyState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProxyState> {
        self.state.subscribe()
    }

    /// Tail the input until `cancel` fires and all in-flight requests are done,
    /// or until a background task reports a fatal error.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            anyhow::bail!("proxy already started");
        }

        let input = self.input_handle()?;
        let stop = cancel.child_token();
        *self.lock_stop() = Some(stop.clone());

        let tracker = TaskTracker::new();
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<anyhow::Error>();

        self.state.send_replace(ProxyState::Running);
        log::info!(
            "Proxy: forwarding {} -> {} -> {}",
            self.config.input_path().display(),
            self.config.rpc_url(),
            self.config.output_path().display()
        );

        let lines = LineSource::new(&self.config).spawn(input, &tracker, stop.clone(), fatal_tx);
        Dispatcher::new(
            Arc::clone(&self.invoker),
            Arc::clone(&self.sink),
            tracker.clone(),
            self.config.max_in_flight(),
        )
        .spawn(lines, stop.clone());
        // nothing else is spawned from outside the tracked tasks
        tracker.close();

        let mut draining = false;
        let result = loop {
            tokio::select! {
                // an error sent before the last task exited must win over the drain
                biased;
                Some(err) = fatal_rx.recv() => {
                    self.state.send_replace(ProxyState::Failed);
                    stop.cancel();
                    break Err(err);
                },
                _ = tracker.wait() => {
                    self.state.send_replace(ProxyState::Stopped);
                    break Ok(());
                },
                _ = stop.cancelled(), if !draining => {
                    draining = true;
                    self.state.send_replace(ProxyState::Draining);
                    log::info!("Proxy: draining {} task(s)", tracker.len());
                },
            }
        };

        self.lock_stop().take();
        match &result {
            Ok(()) => log::info!("Proxy: stopped"),
            Err(e) => log::error!("Proxy: failed: {:#}", e),
        }
        result
    }

    /// Release the file handles and stop a running pipeline. Idempotent.
    pub async fn close(&self) -> anyhow::Result<()> {
        if let Some(stop) = self.lock_stop().take() {
            stop.cancel();
        }
        drop(
            self.input
                .lock()
                .map_err(|_| anyhow::anyhow!("input file lock poisoned"))?
                .take(),
        );
        self.sink.close().await
    }

    fn input_handle(&self) -> anyhow::Result<tokio::fs::File> {
        let guard = self
            .input
            .lock()
            .map_err(|_| anyhow::anyhow!("input file lock poisoned"))?;
        let file = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("proxy is closed"))?
            .try_clone()
            .context("clone input file handle")?;
        Ok(tokio::fs::File::from_std(file))
    }

    fn lock_stop(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.stop.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod proxy_test;
