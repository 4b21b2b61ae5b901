//! Failure taxonomy of a submission.

use crate::pipeline::PipelineState;

/// Every way a submission can end without reaching `Succeeded`.
///
/// Each variant is fatal for the submission that produced it. Nothing is
/// retried; the caller decides whether to submit again.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// The media engine could not be loaded.
    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// The engine rejected the input. `diagnostics` holds its output, if any.
    #[error("conversion failed: {diagnostics}")]
    ConversionFailed { diagnostics: String },

    /// The audio upload did not produce a remote video id.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// The transcription request for an uploaded video failed.
    #[error("transcription request failed: {0}")]
    TranscriptionRequestFailed(String),

    /// A submission was attempted while another one is in flight or finished.
    #[error("pipeline is not idle (currently {0})")]
    NotIdle(PipelineState),

    #[error("submission cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Short stage name for status rendering.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::TranscoderUnavailable(_) | PipelineError::ConversionFailed { .. } => {
                "converting"
            }
            PipelineError::UploadFailed(_) => "uploading",
            PipelineError::TranscriptionRequestFailed(_) => "generating",
            PipelineError::NotIdle(_) => "submit",
            PipelineError::Cancelled => "cancelled",
        }
    }
}
