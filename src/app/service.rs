// MedScan - app/service.rs
//
// The remote analysis contract and its HTTP implementation.
//
// `analyze` either rejects (`AnalysisError`) or resolves with the raw,
// ambiguous `UnifiedAnalysisResult`; classification of a resolved response
// belongs to `core::reconcile`, not here.

use crate::core::model::{EncodedImage, UnifiedAnalysisResult};
use crate::util::constants;
use crate::util::error::AnalysisError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// The sole network dependency of a scan session.
#[async_trait]
pub trait AnalysisService: Send + Sync + fmt::Debug {
    async fn analyze(&self, image: &EncodedImage)
        -> Result<UnifiedAnalysisResult, AnalysisError>;
}

/// `data:<mime>;base64,<payload>` form of an encoded image.
pub fn data_url(image: &EncodedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type,
        STANDARD.encode(&image.bytes)
    )
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image: String,
    width: u32,
    height: u32,
    #[serde(rename = "fileName")]
    file_name: &'a str,
}

/// JSON-over-HTTP analysis client.
pub struct HttpAnalysisService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAnalysisService {
    /// Build a client for `endpoint`. `timeout` of `None` waits indefinitely.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, AnalysisError> {
        let endpoint = endpoint.into();
        let mut builder = reqwest::Client::builder().user_agent(format!(
            "{}/{}",
            constants::APP_NAME,
            constants::APP_VERSION
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|source| AnalysisError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// API key is never printed.
impl fmt::Debug for HttpAnalysisService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAnalysisService")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(
        &self,
        image: &EncodedImage,
    ) -> Result<UnifiedAnalysisResult, AnalysisError> {
        let transport = |source| AnalysisError::Transport {
            endpoint: self.endpoint.clone(),
            source,
        };

        let body = AnalyzeRequest {
            image: data_url(image),
            width: image.width,
            height: image.height,
            file_name: &image.label,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            image = %image.label,
            bytes = image.bytes.len(),
            "Dispatching analysis request"
        );

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(AnalysisError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: preview(&text),
            });
        }

        serde_json::from_str(&text).map_err(|source| AnalysisError::InvalidResponse {
            endpoint: self.endpoint.clone(),
            source,
        })
    }
}

/// First `MAX_ERROR_BODY_PREVIEW` characters of an error body, trimmed.
fn preview(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(constants::MAX_ERROR_BODY_PREVIEW) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn payload() -> EncodedImage {
        EncodedImage {
            label: "pill.jpg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff],
            width: 2,
            height: 1,
            mime_type: "image/jpeg",
        }
    }

    #[test]
    fn test_data_url_encodes_payload() {
        assert_eq!(data_url(&payload()), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_request_body_shape() {
        let img = payload();
        let body = AnalyzeRequest {
            image: data_url(&img),
            width: img.width,
            height: img.height,
            file_name: &img.label,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["fileName"], "pill.jpg");
        assert_eq!(value["width"], 2);
        assert!(value["image"].as_str().unwrap().starts_with("data:image/jpeg"));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let svc = HttpAnalysisService::new(
            "https://scan.example.org/analyze",
            Some("secret-token".to_string()),
            None,
        )
        .unwrap();
        let dbg = format!("{svc:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("authenticated: true"));
    }

    #[test]
    fn test_blank_api_key_is_dropped() {
        let svc = HttpAnalysisService::new("https://x.test", Some("  ".to_string()), None).unwrap();
        assert!(svc.api_key.is_none());
    }

    /// Answer one request on a local port with a canned response. Yields the
    /// endpoint URL and a handle resolving to the raw request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}/analyze"), handle)
    }

    /// Read headers plus the declared body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_status_error() {
        let (url, request) = serve_once("503 Service Unavailable", "overloaded").await;
        let svc = HttpAnalysisService::new(&url, Some("k-123".to_string()), None).unwrap();

        let err = svc.analyze(&payload()).await.unwrap_err();
        match err {
            AnalysisError::Status { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected Status, got {other:?}"),
        }

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /analyze"), "{request}");
        assert!(request.to_ascii_lowercase().contains("authorization: bearer k-123"));
        assert!(request.contains("data:image/jpeg;base64,/9j/"));
    }

    #[tokio::test]
    async fn test_undecodable_body_maps_to_invalid_response() {
        let (url, _request) = serve_once("200 OK", "<html>oops</html>").await;
        let svc = HttpAnalysisService::new(&url, None, None).unwrap();

        let err = svc.analyze(&payload()).await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::InvalidResponse { .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_json_body_is_returned_unclassified() {
        let (url, request) =
            serve_once("200 OK", r#"{"score": 88, "verdict": "Authentic", "error": "blurry"}"#)
                .await;
        let svc = HttpAnalysisService::new(&url, None, None).unwrap();

        let result = svc.analyze(&payload()).await.unwrap();
        assert_eq!(result.score, Some(88.0));
        assert_eq!(result.verdict.as_deref(), Some("Authentic"));
        assert_eq!(result.error.as_deref(), Some("blurry"));
        assert!(!request
            .await
            .unwrap()
            .to_ascii_lowercase()
            .contains("authorization:"));
    }

    #[tokio::test]
    async fn test_closed_port_maps_to_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let svc = HttpAnalysisService::new(format!("http://{addr}/analyze"), None, None).unwrap();
        let err = svc.analyze(&payload()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transport { .. }), "{err:?}");
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[test]
    fn test_preview_truncates_long_bodies() {
        let long = "x".repeat(constants::MAX_ERROR_BODY_PREVIEW + 50);
        let p = preview(&long);
        assert_eq!(p.chars().count(), constants::MAX_ERROR_BODY_PREVIEW + 1);
        assert!(p.ends_with('…'));
        assert_eq!(preview("  short  "), "short");
    }
}
