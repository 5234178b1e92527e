//! Scripted local HTTP server for driving the fetch and paging loops in tests.
//!
//! Every accepted connection gets the next scripted response and the request
//! target is recorded. Once the script runs out the server answers 404.

use reqwest::StatusCode;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body:   String,
    pub delay:  Duration,
}

impl StubResponse {
    pub fn json(body: &Value) -> Self {
        Self { status: 200, body: body.to_string(), delay: Duration::ZERO }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string(), delay: Duration::ZERO }
    }

    /// Hold the response back, e.g. to outlast a client timeout.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct StubServer {
    base: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub async fn start(script: Vec<StubResponse>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base = format!("http://{}", listener.local_addr()?);
        let hits = Arc::new(Mutex::new(Vec::new()));

        let log = hits.clone();
        tokio::spawn(async move {
            let mut script = script.into_iter();
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let req = String::from_utf8_lossy(&buf[..n]);
                let target = req.split_whitespace().nth(1).unwrap_or_default().to_string();
                if let Ok(mut h) = log.lock() {
                    h.push(target);
                }

                let resp = script
                    .next()
                    .unwrap_or_else(|| StubResponse::status(404, "script exhausted"));
                tokio::spawn(async move {
                    tokio::time::sleep(resp.delay).await;
                    let reason = StatusCode::from_u16(resp.status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("Unknown");
                    let raw = format!(
                        "HTTP/1.1 {} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        resp.status,
                        resp.body.len(),
                        resp.body
                    );
                    let _ = stream.write_all(raw.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Ok(Self { base, hits })
    }

    /// `http://127.0.0.1:<port>`
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Request targets (path + query) in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().map(|h| h.clone()).unwrap_or_default()
    }
}
