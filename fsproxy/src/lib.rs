//! Tail-and-forward engine: bridges a line-oriented file to a JSON-RPC endpoint.
//!
//! Lines appended to the input file are POSTed to the configured URL and each
//! response body is appended to the output file.

pub mod config;
pub mod dispatcher;
pub mod invoker;
pub mod proxy;
pub mod sink;
pub mod source;

pub use config::{ProxyConfig, WatchStrategy};
pub use invoker::{HttpInvoker, Invoker};
pub use proxy::{Proxy, ProxyState};

#[cfg(test)]
mod test_support;
