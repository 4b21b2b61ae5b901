pub mod api;
pub mod cancel;
pub mod error;
pub mod http;
pub mod media;
pub mod pipeline;
pub mod settings;
pub mod transcoder;
pub mod verbose;

pub use api::{HttpVideoApi, VideoApi};
pub use cancel::{CancellationHandle, CancellationToken};
pub use error::PipelineError;
pub use media::{AudioArtifact, RemoteVideoId, SelectedMedia};
pub use pipeline::{PipelineState, SubmissionPipeline};
pub use settings::Settings;
pub use transcoder::{EngineResources, MediaEngine, Transcoder, TranscoderCell};
pub use verbose::set_verbose;
