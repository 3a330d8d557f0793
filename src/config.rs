use std::{path::PathBuf, time::Duration};

use clap::Parser;
use fsproxy::ProxyConfig;

/// Forward lines appended to a file as JSON-RPC requests and append the
/// responses to another file.
#[derive(Parser, Debug)]
#[command(name = "jsonrpc-fsproxy", version)]
pub(crate) struct Args {
    /// File watched for appended requests, one per line.
    #[arg(value_name = "INPUT_FILE_PATH", default_value = "request.pipe")]
    pub(crate) input: PathBuf,
    /// File the response bodies are appended to.
    #[arg(value_name = "OUTPUT_FILE_PATH", default_value = "response.pipe")]
    pub(crate) output: PathBuf,
    /// Endpoint every request is POSTed to.
    #[arg(value_name = "RPC_URL", default_value = "http://127.0.0.1:8080/rpc")]
    pub(crate) rpc_url: String,
    /// Poll the input file every MS milliseconds instead of using change notifications.
    #[arg(long, value_name = "MS")]
    pub(crate) poll_interval_ms: Option<u64>,
    /// Maximum number of requests in flight; unbounded when omitted.
    #[arg(long, value_name = "N")]
    pub(crate) max_in_flight: Option<usize>,
    /// How often to re-check the `<input>.lock` marker.
    #[arg(long, value_name = "MS", default_value_t = 100)]
    pub(crate) lock_poll_ms: u64,
}

impl Args {
    pub(crate) fn into_proxy_config(self) -> anyhow::Result<ProxyConfig> {
        let mut builder = ProxyConfig::builder()
            .rpc_url(&self.rpc_url)
            .input_path(self.input)
            .output_path(self.output)
            .lock_poll_interval(Duration::from_millis(self.lock_poll_ms));
        if let Some(ms) = self.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(limit) = self.max_in_flight {
            builder = builder.max_in_flight(limit);
        }
        builder.build()
    }
}
