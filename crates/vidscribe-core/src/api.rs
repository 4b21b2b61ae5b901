//! Client for the remote video API.
//!
//! Two endpoints are used, always in this order:
//! - `POST /videos`: multipart upload with a `file` field, answers
//!   `{"video": {"id": ...}}`
//! - `POST /videos/{id}/transcription`: JSON `{"prompt": ...}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::{AudioArtifact, RemoteVideoId};

/// The two remote calls a submission makes.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Register an audio artifact and return the id the server assigned.
    async fn upload_video(&self, audio: &AudioArtifact) -> Result<RemoteVideoId>;

    /// Ask the server to transcribe a previously uploaded video.
    async fn request_transcription(&self, id: &RemoteVideoId, prompt: Option<&str>) -> Result<()>;
}

#[derive(Deserialize)]
struct UploadResponse {
    video: UploadedVideo,
}

#[derive(Deserialize)]
struct UploadedVideo {
    id: serde_json::Value,
}

#[derive(Serialize)]
struct TranscriptionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
}

/// `VideoApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpVideoApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVideoApi {
    /// `base_url` must already be normalized (no trailing slash), see
    /// [`crate::settings::normalize_api_url`].
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn videos_url(&self) -> String {
        format!("{}/videos", self.base_url)
    }

    fn transcription_url(&self, id: &RemoteVideoId) -> String {
        format!("{}/videos/{}/transcription", self.base_url, id)
    }
}

#[async_trait]
impl VideoApi for HttpVideoApi {
    async fn upload_video(&self, audio: &AudioArtifact) -> Result<RemoteVideoId> {
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(audio.bytes().to_vec())
                .file_name(audio.file_name())
                .mime_str(audio.mime_type())?,
        );

        crate::verbose!(
            "Uploading {} ({:.1} KB) to {}",
            audio.file_name(),
            audio.len() as f64 / 1024.0,
            self.videos_url()
        );

        let response = self
            .client
            .post(self.videos_url())
            .multipart(form)
            .send()
            .await
            .context("Failed to send upload request")?;

        let text = checked_body(response).await?;
        parse_upload_response(&text)
    }

    async fn request_transcription(&self, id: &RemoteVideoId, prompt: Option<&str>) -> Result<()> {
        crate::verbose!("Requesting transcription for video {}", id);

        let response = self
            .client
            .post(self.transcription_url(id))
            .json(&TranscriptionBody { prompt })
            .send()
            .await
            .context("Failed to send transcription request")?;

        checked_body(response).await?;
        Ok(())
    }
}

/// Read the body of a response, turning non-2xx statuses into errors.
async fn checked_body(response: reqwest::Response) -> Result<String> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        anyhow::bail!("API error ({status}): {error_text}");
    }

    response
        .text()
        .await
        .context("Failed to get response text")
}

fn parse_upload_response(text: &str) -> Result<RemoteVideoId> {
    let resp: UploadResponse =
        serde_json::from_str(text).context("Failed to parse upload response")?;

    let id = match resp.video.id {
        serde_json::Value::String(id) => id,
        serde_json::Value::Number(n) => n.to_string(),
        other => anyhow::bail!("Unexpected video id in upload response: {other}"),
    };

    RemoteVideoId::new(id).context("Upload response contained an empty video id")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A request as seen by the test server
    #[derive(Debug, Clone)]
    struct Recorded {
        request_line: String,
        headers: String,
        body: Vec<u8>,
    }

    /// Serve canned `(status, body)` responses, one per connection, in order.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let log = recorded.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);

                let reply = format!(
                    "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), recorded)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers ended");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers = lines.collect::<Vec<_>>().join("\n").to_lowercase();

        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap());
        let chunked = headers.contains("transfer-encoding: chunked");

        let mut body = buf[header_end..].to_vec();
        loop {
            let done = match content_length {
                Some(len) => body.len() >= len,
                None if chunked => body.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if done {
                break;
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Recorded {
            request_line,
            headers,
            body,
        }
    }

    fn api(base: &str) -> HttpVideoApi {
        HttpVideoApi::new(reqwest::Client::new(), base)
    }

    #[test]
    fn test_parse_upload_response() {
        let id = parse_upload_response(r#"{"video":{"id":"c0a8-42","name":"audio.mp3"}}"#).unwrap();
        assert_eq!(id.as_str(), "c0a8-42");

        let id = parse_upload_response(r#"{"video":{"id":17}}"#).unwrap();
        assert_eq!(id.as_str(), "17");

        assert!(parse_upload_response(r#"{"video":{"id":""}}"#).is_err());
        assert!(parse_upload_response(r#"{"video":{"id":null}}"#).is_err());
        assert!(parse_upload_response(r#"{"id":"flat"}"#).is_err());
        assert!(parse_upload_response("<html>").is_err());
    }

    #[test]
    fn test_transcription_body_omits_missing_prompt() {
        let body = serde_json::to_string(&TranscriptionBody { prompt: None }).unwrap();
        assert_eq!(body, "{}");
        let body = serde_json::to_string(&TranscriptionBody {
            prompt: Some("rust, tokio"),
        })
        .unwrap();
        assert_eq!(body, r#"{"prompt":"rust, tokio"}"#);
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_audio() {
        let (base, recorded) = serve(vec![(200, r#"{"video":{"id":"vid-1"}}"#)]).await;

        let audio = AudioArtifact::new(b"ID3-fake-mp3".to_vec());
        let id = api(&base).upload_video(&audio).await.unwrap();
        assert_eq!(id.as_str(), "vid-1");

        let requests = recorded.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].request_line.starts_with("POST /videos HTTP/1.1"));
        assert!(requests[0].headers.contains("multipart/form-data"));

        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains(r#"name="file""#));
        assert!(body.contains(r#"filename="audio.mp3""#));
        assert!(body.to_lowercase().contains("content-type: audio/mpeg"));
        assert!(body.contains("ID3-fake-mp3"));
    }

    #[tokio::test]
    async fn test_upload_server_error() {
        let (base, _recorded) = serve(vec![(500, r#"{"message":"boom"}"#)]).await;

        let err = api(&base)
            .upload_video(&AudioArtifact::new(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_transcription_request_path_and_body() {
        let (base, recorded) = serve(vec![(200, r#"{"transcription":"..."}"#)]).await;

        let id = RemoteVideoId::new("vid-9").unwrap();
        api(&base).request_transcription(&id, None).await.unwrap();

        let requests = recorded.lock().unwrap().clone();
        assert!(
            requests[0]
                .request_line
                .starts_with("POST /videos/vid-9/transcription HTTP/1.1")
        );
        assert!(requests[0].headers.contains("application/json"));
        assert_eq!(requests[0].body, b"{}");
    }

    #[tokio::test]
    async fn test_transcription_request_failure() {
        let (base, _recorded) = serve(vec![(404, "not found")]).await;

        let id = RemoteVideoId::new("missing").unwrap();
        let err = api(&base)
            .request_transcription(&id, Some("keywords"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
