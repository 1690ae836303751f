//! # Upload Module
//!
//! Ships flushed batches to the configured endpoint.
//!
//! This module handles:
//! - Encoding a batch as the `{"Result": [...]}` JSON envelope
//! - POSTing it over HTTP/HTTPS
//! - Optional bounded retry with exponential backoff (off by default)
//!
//! Outcomes are reported to the caller but never re-queued: a batch that
//! fails to upload is dropped.

pub mod client;
pub mod envelope;

use async_trait::async_trait;

use crate::error::Result;
use crate::source::Observation;

pub use client::{HttpUploader, RetryPolicy};

/// Summary of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    /// HTTP status code (always 2xx)
    pub status: u16,
    /// Response body, if it parsed as JSON
    pub response: Option<serde_json::Value>,
    /// Number of POSTs issued, including the successful one
    pub attempts: u32,
}

/// Sends one batch of observations to the endpoint
#[async_trait]
pub trait BatchUploader: Send + Sync {
    async fn send(&self, batch: Vec<Observation>) -> Result<UploadReport>;
}


#[cfg(test)]
pub mod test_server {
    //! Minimal HTTP/1.1 responder for exercising the real uploader.

    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    /// A request as seen by the server
    #[derive(Debug, Clone)]
    pub struct CapturedRequest {
        pub head: String,
        pub body: Vec<u8>,
    }

    impl CapturedRequest {
        pub fn header(&self, name: &str) -> Option<String> {
            self.head.lines().skip(1).find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
        }

        pub fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or_default()
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Server answering every request with a fixed status and body
    pub struct TestServer {
        pub addr: SocketAddr,
        pub requests: mpsc::UnboundedReceiver<CapturedRequest>,
        response: Arc<Mutex<(u16, String)>>,
    }

    impl TestServer {
        pub async fn start(status: u16, body: &str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, requests) = mpsc::unbounded_channel();
            let response = Arc::new(Mutex::new((status, body.to_string())));

            let shared = response.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let tx = tx.clone();
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        let _ = handle(stream, tx, shared).await;
                    });
                }
            });

            Self {
                addr,
                requests,
                response,
            }
        }

        pub fn url(&self) -> String {
            format!("http://{}/telemetry", self.addr)
        }

        pub fn set_response(&self, status: u16, body: &str) {
            *self.response.lock().unwrap() = (status, body.to_string());
        }
    }

    async fn handle(
        mut stream: TcpStream,
        tx: mpsc::UnboundedSender<CapturedRequest>,
        response: Arc<Mutex<(u16, String)>>,
    ) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut request = CapturedRequest {
            head,
            body: Vec::new(),
        };
        let content_length: usize = request
            .header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut body = buf[head_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        request.body = body;

        // Pick the reply before reporting the request so a test reacting
        // to the request only affects later ones.
        let (status, payload) = response.lock().unwrap().clone();
        let _ = tx.send(request);
        let reply = format!(
            "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await
    }
}
