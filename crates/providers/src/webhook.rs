//! Outbound webhook for finished responses.
//!
//! The body arrives already rendered from the persona's template; this
//! client only posts it. Delivery is best effort: the caller logs failures
//! and never retries.

use async_trait::async_trait;
use parlor_core::event::CompletionNotifier;
use parlor_core::{Error, PersonaId};
use std::time::Duration;
use tracing::debug;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> parlor_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| Error::Notify(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn notify(&self, persona: PersonaId, endpoint: &str, body: String) -> parlor_core::Result<()> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!("webhook returned {status}: {text}")));
        }

        debug!(persona = %persona, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn capture_one(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}/hook"), handle)
    }

    #[tokio::test]
    async fn posts_rendered_body() {
        let (url, server) = capture_one("204 No Content").await;
        let notifier = WebhookNotifier::new().unwrap();
        notifier
            .notify(PersonaId(1), &url, r#"{"content":"hello"}"#.into())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.ends_with(r#"{"content":"hello"}"#));
    }

    #[tokio::test]
    async fn non_success_is_an_error() {
        let (url, _server) = capture_one("500 Internal Server Error").await;
        let notifier = WebhookNotifier::new().unwrap();
        let err = notifier.notify(PersonaId(1), &url, "{}".into()).await.unwrap_err();
        assert!(matches!(err, Error::Notify(_)));
    }
}
