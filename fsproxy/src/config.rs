use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;

/// Default interval between checks for the `<input>.lock` marker.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the line source notices that the input file grew.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WatchStrategy {
    /// Filesystem change notifications
    #[default]
    Notify,
    /// Stat the input file every interval
    Poll(Duration),
}

/// Validated configuration of a [`crate::proxy::Proxy`].
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    rpc_url: Url,
    input_path: PathBuf,
    output_path: PathBuf,
    strategy: WatchStrategy,
    // None = unbounded fan-out
    max_in_flight: Option<usize>,
    lock_poll_interval: Duration,
}

impl ProxyConfig {
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn strategy(&self) -> WatchStrategy {
        self.strategy
    }

    pub fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight
    }

    pub fn lock_poll_interval(&self) -> Duration {
        self.lock_poll_interval
    }

    /// Sibling path whose presence means "do not read the input now".
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.input_path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }
}

#[derive(Default)]
pub struct ProxyConfigBuilder {
    rpc_url: Option<String>,
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    poll_interval: Option<Duration>,
    max_in_flight: Option<usize>,
    lock_poll_interval: Option<Duration>,
}

impl ProxyConfigBuilder {
    pub fn rpc_url(mut self, url: &str) -> Self {
        self.rpc_url = Some(url.to_string());
        self
    }

    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Switch to the polling strategy with the given interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = Some(interval);
        self
    }

    pub fn build(self) -> anyhow::Result<ProxyConfig> {
        let raw_url = self
            .rpc_url
            .ok_or_else(|| anyhow::anyhow!("rpc url is required"))?;
        let rpc_url =
            Url::parse(&raw_url).map_err(|e| anyhow::anyhow!("invalid rpc url {}: {}", raw_url, e))?;
        if !matches!(rpc_url.scheme(), "http" | "https") {
            anyhow::bail!("unsupported rpc url scheme: {}", rpc_url.scheme());
        }

        let input_path = non_empty_path(self.input_path, "input")?;
        let output_path = non_empty_path(self.output_path, "output")?;
        if input_path == output_path {
            anyhow::bail!(
                "input and output must be different files: {}",
                input_path.display()
            );
        }

        let strategy = match self.poll_interval {
            Some(interval) if interval.is_zero() => {
                anyhow::bail!("poll interval must be greater than zero")
            }
            Some(interval) => WatchStrategy::Poll(interval),
            None => WatchStrategy::Notify,
        };

        if self.max_in_flight == Some(0) {
            anyhow::bail!("max in-flight requests must be greater than zero");
        }

        let lock_poll_interval = self
            .lock_poll_interval
            .unwrap_or(DEFAULT_LOCK_POLL_INTERVAL);
        if lock_poll_interval.is_zero() {
            anyhow::bail!("lock poll interval must be greater than zero");
        }

        Ok(ProxyConfig {
            rpc_url,
            input_path,
            output_path,
            strategy,
            max_in_flight: self.max_in_flight,
            lock_poll_interval,
        })
    }
}

fn non_empty_path(path: Option<PathBuf>, name: &str) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(anyhow::anyhow!("{} path is required", name)),
    }
}
