//! Transcoder adapter: video in, compressed audio out.
//!
//! ```text
//! TranscoderCell   - loads the engine at most once, hands out Arc<Transcoder>
//!   └── Transcoder - convert(), progress channel
//!         └── MediaEngine (trait)
//!               └── FfmpegEngine - ffmpeg program in a private scratch dir
//! ```
//!
//! The process-wide cell lives behind [`shared`] / [`acquire`].

mod ffmpeg;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell as SyncOnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, watch};

use crate::error::PipelineError;
use crate::media::AudioArtifact;

pub use ffmpeg::FfmpegEngine;

/// Name the input is written under inside the engine's filesystem
pub const INPUT_FILE: &str = "input.mp4";

/// Name the engine writes its output to
pub const OUTPUT_FILE: &str = "output.mp3";

/// Fixed engine arguments: drop video, keep the audio stream, 20 kbit/s MP3.
pub const CONVERT_ARGS: &[&str] = &[
    "-i",
    INPUT_FILE,
    "-map",
    "0:a",
    "-b:a",
    "20k",
    "-acodec",
    "libmp3lame",
    OUTPUT_FILE,
];

/// Where the engine is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResources {
    /// Path or name of the engine program
    pub program: String,
}

impl EngineResources {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for EngineResources {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// A media-processing engine with its own isolated filesystem.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// One-time, potentially expensive initialization.
    async fn load(&self) -> Result<()>;

    /// Place `bytes` in the engine's filesystem under `name`.
    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Invoke the engine, publishing progress in `0.0..=1.0` on `progress`.
    ///
    /// Errors carry the engine's diagnostic output.
    async fn run(&self, args: &[&str], progress: &watch::Sender<f32>) -> Result<()>;

    /// Read `name` back from the engine's filesystem.
    async fn read_output(&self, name: &str) -> Result<Vec<u8>>;

    /// Delete `name` from the engine's filesystem. A missing file is not an error.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Tear down the engine's filesystem. Nothing can be converted afterwards.
    fn release(&self);
}

/// Builds a not-yet-loaded engine.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn MediaEngine> + Send + Sync>;

/// A loaded engine, shared by every caller of [`TranscoderCell::acquire`].
pub struct Transcoder {
    engine: Box<dyn MediaEngine>,
    progress: Arc<watch::Sender<f32>>,
    // Input and output names are fixed, so conversions must not interleave.
    run_lock: Mutex<()>,
}

impl Transcoder {
    fn new(engine: Box<dyn MediaEngine>, progress: Arc<watch::Sender<f32>>) -> Self {
        Self {
            engine,
            progress,
            run_lock: Mutex::new(()),
        }
    }

    /// Observe conversion progress. Advisory only.
    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    /// Convert a video to the fixed-name MP3 artifact.
    ///
    /// The input copy and any output are removed from the engine's filesystem
    /// before this returns, whether the conversion worked or not.
    pub async fn convert(&self, input: &[u8]) -> Result<AudioArtifact, PipelineError> {
        let _guard = self.run_lock.lock().await;
        self.progress.send_replace(0.0);

        crate::verbose!("Convert started ({:.1} MB)", input.len() as f64 / 1_000_000.0);

        let result = self.convert_locked(input).await;
        for name in [INPUT_FILE, OUTPUT_FILE] {
            if let Err(e) = self.engine.remove(name).await {
                crate::verbose!("Failed to remove {}: {:#}", name, e);
            }
        }
        let data = result.map_err(conversion_failed)?;

        self.progress.send_replace(1.0);
        crate::verbose!("Convert finished ({:.1} KB)", data.len() as f64 / 1024.0);

        Ok(AudioArtifact::new(data))
    }

    async fn convert_locked(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.engine.write_input(INPUT_FILE, input).await?;
        self.engine.run(CONVERT_ARGS, &self.progress).await?;
        self.engine.read_output(OUTPUT_FILE).await
    }

    fn release(&self) {
        self.engine.release();
    }
}

fn conversion_failed(e: anyhow::Error) -> PipelineError {
    PipelineError::ConversionFailed {
        diagnostics: format!("{e:#}"),
    }
}

/// Memoizes engine initialization: the first `acquire()` loads, concurrent
/// callers wait for that same load and share its outcome, later callers get
/// the cached handle.
///
/// A failed load is handed to every caller that was waiting on it but is not
/// cached; the next `acquire()` after it tries again.
pub struct TranscoderCell {
    factory: EngineFactory,
    progress: Arc<watch::Sender<f32>>,
    handle: OnceLock<Arc<Transcoder>>,
    // Held for the whole load attempt. Keeps the error of the last failed one.
    load: Mutex<Option<PipelineError>>,
    failed_loads: AtomicU64,
}

impl TranscoderCell {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            progress: Arc::new(watch::Sender::new(0.0)),
            handle: OnceLock::new(),
            load: Mutex::new(None),
            failed_loads: AtomicU64::new(0),
        }
    }

    /// Cell backed by the ffmpeg program described by `resources`.
    pub fn ffmpeg(resources: EngineResources) -> Self {
        Self::new(Arc::new(move || {
            Box::new(FfmpegEngine::new(resources.clone())) as Box<dyn MediaEngine>
        }))
    }

    pub async fn acquire(&self) -> Result<Arc<Transcoder>, PipelineError> {
        if let Some(transcoder) = self.get() {
            return Ok(transcoder);
        }

        let seen = self.failed_loads.load(Ordering::Acquire);
        let mut last_failure = self.load.lock().await;

        if let Some(transcoder) = self.get() {
            return Ok(transcoder);
        }
        // The attempt this caller queued behind has failed.
        if self.failed_loads.load(Ordering::Acquire) != seen {
            if let Some(e) = last_failure.as_ref() {
                return Err(e.clone());
            }
        }

        crate::verbose!("Loading media engine");
        let engine = (self.factory)();
        match engine.load().await {
            Ok(()) => {
                crate::verbose!("Media engine loaded");
                let transcoder = Arc::new(Transcoder::new(engine, self.progress.clone()));
                // Only ever set while `load` is held, so this cannot race.
                let _ = self.handle.set(transcoder.clone());
                *last_failure = None;
                Ok(transcoder)
            }
            Err(e) => {
                let err = PipelineError::TranscoderUnavailable(format!("{e:#}"));
                *last_failure = Some(err.clone());
                self.failed_loads.fetch_add(1, Ordering::AcqRel);
                Err(err)
            }
        }
    }

    /// The loaded handle, without triggering a load.
    pub fn get(&self) -> Option<Arc<Transcoder>> {
        self.handle.get().cloned()
    }

    /// Observe conversion progress of whichever engine this cell loads.
    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    /// Whether a loaded handle is cached.
    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Tear down the loaded engine's filesystem, if any.
    ///
    /// The process-wide cell is never dropped, so callers about to exit use
    /// this to clean up. Conversions fail after it.
    pub fn release(&self) {
        if let Some(transcoder) = self.handle.get() {
            crate::verbose!("Releasing media engine");
            transcoder.release();
        }
    }
}

static SHARED: SyncOnceCell<Arc<TranscoderCell>> = SyncOnceCell::new();

/// The process-wide transcoder cell.
///
/// `resources` is only consulted on the first call; the engine location is
/// fixed for the lifetime of the process after that.
pub fn shared(resources: EngineResources) -> Arc<TranscoderCell> {
    SHARED
        .get_or_init(|| Arc::new(TranscoderCell::ffmpeg(resources)))
        .clone()
}

/// Acquire the process-wide transcoder, loading it on first use.
pub async fn acquire(resources: EngineResources) -> Result<Arc<Transcoder>, PipelineError> {
    shared(resources).acquire().await
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory engine used by the transcoder and pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    #[derive(Default)]
    pub struct FakeEngineState {
        pub loads: AtomicUsize,
        pub runs: StdMutex<Vec<Vec<String>>>,
        /// The engine filesystem, shared so tests can see what is left behind.
        pub files: StdMutex<HashMap<String, Vec<u8>>>,
        pub released: AtomicBool,
    }

    /// Writes the input bytes reversed to `output.mp3`.
    pub struct FakeEngine {
        pub state: Arc<FakeEngineState>,
        pub fail_load: bool,
        pub fail_run: bool,
        pub load_delay: Duration,
        pub run_delay: Duration,
    }

    impl FakeEngine {
        pub fn new(state: Arc<FakeEngineState>) -> Self {
            Self {
                state,
                fail_load: false,
                fail_run: false,
                load_delay: Duration::ZERO,
                run_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        async fn load(&self) -> Result<()> {
            self.state.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.load_delay).await;
            if self.fail_load {
                anyhow::bail!("failed to fetch engine core");
            }
            Ok(())
        }

        async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()> {
            self.state
                .files
                .lock()
                .unwrap()
                .insert(name.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn run(&self, args: &[&str], progress: &watch::Sender<f32>) -> Result<()> {
            self.state
                .runs
                .lock()
                .unwrap()
                .push(args.iter().map(|a| a.to_string()).collect());
            progress.send_replace(0.5);
            tokio::time::sleep(self.run_delay).await;
            let mut files = self.state.files.lock().unwrap();
            if self.fail_run {
                // A crashed run can leave a partial output behind.
                files.insert(OUTPUT_FILE.to_string(), b"partial".to_vec());
                anyhow::bail!("input.mp4: Invalid data found when processing input");
            }
            let mut output = files
                .get(INPUT_FILE)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{INPUT_FILE}: No such file or directory"))?;
            output.reverse();
            files.insert(OUTPUT_FILE.to_string(), output);
            Ok(())
        }

        async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
            self.state
                .files
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{name}: No such file or directory"))
        }

        async fn remove(&self, name: &str) -> Result<()> {
            self.state.files.lock().unwrap().remove(name);
            Ok(())
        }

        fn release(&self) {
            self.state.files.lock().unwrap().clear();
            self.state.released.store(true, Ordering::SeqCst);
        }
    }

    /// A cell whose engines are built by `configure` and share `state`.
    pub fn fake_cell(
        state: Arc<FakeEngineState>,
        configure: impl Fn(&mut FakeEngine) + Send + Sync + 'static,
    ) -> TranscoderCell {
        TranscoderCell::new(Arc::new(move || {
            let mut engine = FakeEngine::new(state.clone());
            configure(&mut engine);
            Box::new(engine) as Box<dyn MediaEngine>
        }))
    }
}
