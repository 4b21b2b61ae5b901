//! Submission pipeline: convert, upload, request transcription.
//!
//! ```text
//! Idle --submit--> Converting --> Uploading --> Generating --> Succeeded
//!   ^                  |              |              |
//!   +------------------+--------------+--------------+  (any failure)
//! ```
//!
//! Stages run strictly in order and each one is a single `.await`. Any failure
//! is returned to the caller and puts the pipeline back in `Idle`, so the same
//! media can be submitted again. `Succeeded` is terminal until [`reset`].
//!
//! [`reset`]: SubmissionPipeline::reset

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::api::VideoApi;
use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::media::{RemoteVideoId, SelectedMedia};
use crate::transcoder::TranscoderCell;

/// Buffered state transitions per subscriber
const TRANSITION_BUFFER: usize = 16;

/// Phase of the current submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Converting,
    Uploading,
    Generating,
    Succeeded,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Converting => "converting",
            PipelineState::Uploading => "uploading",
            PipelineState::Generating => "generating",
            PipelineState::Succeeded => "succeeded",
        }
    }

    /// Label for the submit control in this state
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Upload video",
            PipelineState::Converting => "Converting...",
            PipelineState::Uploading => "Uploading...",
            PipelineState::Generating => "Transcribing...",
            PipelineState::Succeeded => "Success!",
        }
    }

    /// A submission is running and must not be re-entered.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PipelineState::Converting | PipelineState::Uploading | PipelineState::Generating
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one submission at a time through the transcoder and the API.
pub struct SubmissionPipeline {
    transcoder: Arc<TranscoderCell>,
    api: Arc<dyn VideoApi>,
    state: Mutex<PipelineState>,
    transitions: broadcast::Sender<PipelineState>,
}

impl SubmissionPipeline {
    pub fn new(transcoder: Arc<TranscoderCell>, api: Arc<dyn VideoApi>) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            transcoder,
            api,
            state: Mutex::new(PipelineState::Idle),
            transitions,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineState> {
        self.transitions.subscribe()
    }

    /// The transcoder this pipeline converts with.
    pub fn transcoder(&self) -> &Arc<TranscoderCell> {
        &self.transcoder
    }

    /// Whether a new submission would be accepted.
    pub fn can_submit(&self) -> bool {
        self.state() == PipelineState::Idle
    }

    /// Return a finished pipeline to `Idle`. In-flight submissions are not
    /// affected.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_in_flight() && *state != PipelineState::Idle {
            *state = PipelineState::Idle;
            let _ = self.transitions.send(PipelineState::Idle);
        }
    }

    /// Run one submission to completion.
    ///
    /// Returns `Ok(None)` without doing anything when `media` is absent. On
    /// success `on_uploaded` is called exactly once with the remote id, which
    /// is also returned. A blank prompt is sent as no prompt.
    pub async fn submit<F>(
        &self,
        media: Option<&SelectedMedia>,
        prompt: Option<&str>,
        cancel: &CancellationToken,
        on_uploaded: F,
    ) -> Result<Option<RemoteVideoId>, PipelineError>
    where
        F: FnOnce(&RemoteVideoId),
    {
        let Some(media) = media else {
            crate::verbose!("Submit ignored: no media selected");
            return Ok(None);
        };

        self.begin()?;

        match self.drive(media, prompt, cancel).await {
            Ok(id) => {
                self.transition(PipelineState::Succeeded);
                on_uploaded(&id);
                Ok(Some(id))
            }
            Err(e) => {
                crate::verbose!("Submission of {} failed: {}", media.file_name(), e);
                self.transition(PipelineState::Idle);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        media: &SelectedMedia,
        prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RemoteVideoId, PipelineError> {
        // Blank prompts are omitted; anything else is sent exactly as typed.
        let prompt = prompt.filter(|p| !p.trim().is_empty());

        // Converting (Idle -> Converting happened in begin())
        let audio = cancellable(cancel, async {
            let transcoder = self.transcoder.acquire().await?;
            transcoder.convert(media.bytes()).await
        })
        .await?;

        self.transition(PipelineState::Uploading);
        let id = cancellable(cancel, async {
            self.api
                .upload_video(&audio)
                .await
                .map_err(|e| PipelineError::UploadFailed(format!("{e:#}")))
        })
        .await?;
        drop(audio);
        crate::verbose!("Uploaded as video {}", id);

        self.transition(PipelineState::Generating);
        cancellable(cancel, async {
            self.api
                .request_transcription(&id, prompt)
                .await
                .map_err(|e| PipelineError::TranscriptionRequestFailed(format!("{e:#}")))
        })
        .await?;

        Ok(id)
    }

    /// Atomically move `Idle -> Converting`, refusing any other start state.
    fn begin(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != PipelineState::Idle {
            return Err(PipelineError::NotIdle(*state));
        }
        *state = PipelineState::Converting;
        let _ = self.transitions.send(PipelineState::Converting);
        Ok(())
    }

    fn transition(&self, next: PipelineState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        crate::verbose!("Pipeline {} -> {}", *state, next);
        *state = next;
        // No subscribers is fine.
        let _ = self.transitions.send(next);
    }
}

/// Run `fut` unless `cancel` fires first, in which case `fut` is dropped.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = fut => result,
    }
}
