//! The submission form: one selected video, a prompt read at submit time.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vidscribe_core::{CancellationToken, RemoteVideoId, SelectedMedia, SubmissionPipeline};

/// Local reference to the selected file, shown before submitting.
///
/// Rebuilt only when a different file is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    url: String,
    size_bytes: usize,
}

impl Preview {
    fn new(path: &Path, size_bytes: usize) -> Self {
        Self {
            url: format!("file://{}", path.display()),
            size_bytes,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.1} MB)",
            self.url,
            self.size_bytes as f64 / 1_000_000.0
        )
    }
}

struct Selection {
    path: PathBuf,
    media: SelectedMedia,
    preview: Preview,
}

pub struct FormView {
    pipeline: Arc<SubmissionPipeline>,
    selection: Option<Selection>,
}

impl FormView {
    pub fn new(pipeline: Arc<SubmissionPipeline>) -> Self {
        Self {
            pipeline,
            selection: None,
        }
    }

    /// Select a video. Re-selecting the current file keeps the loaded media
    /// and its preview.
    pub async fn select_file(&mut self, path: &Path) -> Result<()> {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.selection.as_ref().is_some_and(|s| s.path == path) {
            return Ok(());
        }

        let media = SelectedMedia::from_path(&path).await?;
        let preview = Preview::new(&path, media.len());
        // Replacing the selection releases the previous media and preview.
        self.selection = Some(Selection {
            path,
            media,
            preview,
        });
        Ok(())
    }

    pub fn media(&self) -> Option<&SelectedMedia> {
        self.selection.as_ref().map(|s| &s.media)
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.selection.as_ref().map(|s| &s.preview)
    }

    /// Submitting is only offered while the pipeline is idle.
    pub fn submit_enabled(&self) -> bool {
        self.pipeline.can_submit()
    }

    /// Submit the selected video.
    ///
    /// `read_prompt` is only called once a submission can actually start.
    pub async fn submit<P, F>(
        &self,
        read_prompt: P,
        cancel: &CancellationToken,
        on_uploaded: F,
    ) -> Result<Option<RemoteVideoId>>
    where
        P: FnOnce() -> Result<Option<String>>,
        F: FnOnce(&RemoteVideoId),
    {
        let Some(media) = self.media() else {
            return Ok(None);
        };
        if !self.submit_enabled() {
            return Err(vidscribe_core::PipelineError::NotIdle(self.pipeline.state()).into());
        }

        let prompt = read_prompt()?;
        let id = self
            .pipeline
            .submit(Some(media), prompt.as_deref(), cancel, on_uploaded)
            .await?;
        Ok(id)
    }
}
