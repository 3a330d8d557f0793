use std::future::Future;

use bytes::Bytes;
use reqwest::{StatusCode, Url, header::CONTENT_TYPE};

/// Performs the remote call for one line.
///
/// Errors are per-line: the dispatcher logs them and drops the line.
pub trait Invoker: Send + Sync + 'static {
    fn invoke(&self, line: &str) -> impl Future<Output = anyhow::Result<Bytes>> + Send;
}

/// POSTs each line as a JSON body to a fixed URL.
pub struct HttpInvoker {
    client: reqwest::Client,
    url: Url,
}

impl HttpInvoker {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("build http client: {}", e))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Invoker for HttpInvoker {
    async fn invoke(&self, line: &str) -> anyhow::Result<Bytes> {
        let resp = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(line.to_string())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("send request: {}", e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            anyhow::bail!("response status code not OK: {}", status);
        }

        resp.bytes()
            .await
            .map_err(|e| anyhow::anyhow!("read response body: {}", e))
    }
}

#[cfg(test)]
#[path = "invoker_test.rs"]
mod invoker_test;
