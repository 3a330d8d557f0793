use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::Bytes,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use reqwest::Url;
use tokio::{io::AsyncWriteExt, net::TcpListener, sync::Semaphore};

use crate::invoker::Invoker;

/// Local JSON-RPC stand-in: `/rpc` echoes the body, `/fail` answers 500.
pub(crate) async fn spawn_echo_server() -> Url {
    let app = Router::new()
        .route("/rpc", post(echo))
        .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}/rpc", addr)).unwrap()
}

async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if content_type != Some("application/json") {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected application/json").into_response();
    }
    body.into_response()
}

/// A URL nobody listens on.
pub(crate) async fn refused_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}/rpc", addr)).unwrap()
}

/// Echoes `line\n`, fails lines starting with `fail`, and can hold calls
/// until the test releases them.
#[derive(Default)]
pub(crate) struct MockInvoker {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockInvoker {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let invoker = Self {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        (invoker, gate)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Invoker for MockInvoker {
    async fn invoke(&self, line: &str) -> anyhow::Result<bytes::Bytes> {
        self.calls.lock().unwrap().push(line.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if line.starts_with("fail") {
            anyhow::bail!("refused: {}", line);
        }
        Ok(bytes::Bytes::from(format!("{}\n", line)))
    }
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub(crate) async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

pub(crate) async fn append(path: &Path, data: &str) {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .unwrap();
    file.write_all(data.as_bytes()).await.unwrap();
    file.flush().await.unwrap();
}

pub(crate) fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
