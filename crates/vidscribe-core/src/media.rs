//! Media values passed between the form, the transcoder and the API.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// MIME type accepted at file selection time.
pub const ACCEPTED_VIDEO_MIME: &str = "video/mp4";

/// File name of every uploaded audio artifact, whatever the input was called.
pub const AUDIO_FILE_NAME: &str = "audio.mp3";

/// MIME type of every uploaded audio artifact.
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// A video chosen by the user, held by the form until submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMedia {
    file_name: String,
    mime_type: String,
    data: Vec<u8>,
}

impl SelectedMedia {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a video from disk.
    ///
    /// Only `.mp4` files are accepted, mirroring a file picker filtered to
    /// `video/mp4`. No further validation happens here.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some("mp4") => {}
            Some(ext) => anyhow::bail!("Unsupported video format: .{ext}\nSupported: mp4"),
            None => anyhow::bail!("File has no extension. Please provide an MP4 video."),
        }

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read video file {}", path.display()))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        Ok(Self::new(file_name, ACCEPTED_VIDEO_MIME, data))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Compressed audio produced by the transcoder, consumed by the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    data: Vec<u8>,
}

impl AudioArtifact {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn file_name(&self) -> &'static str {
        AUDIO_FILE_NAME
    }

    pub fn mime_type(&self) -> &'static str {
        AUDIO_MIME_TYPE
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Identifier assigned by the remote API to an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteVideoId(String);

impl RemoteVideoId {
    /// Wrap a server-issued id. Blank ids are rejected.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteVideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
