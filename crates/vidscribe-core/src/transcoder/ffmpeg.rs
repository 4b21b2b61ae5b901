//! `MediaEngine` backed by the ffmpeg program.
//!
//! Each engine owns a private temporary directory that stands in for the
//! engine's isolated filesystem: inputs are written there, ffmpeg runs with it
//! as its working directory, outputs are read back from it. The directory is
//! deleted on [`MediaEngine::release`] or when the engine is dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use super::{EngineResources, MediaEngine};

/// Lines of ffmpeg stderr kept for error diagnostics
const DIAGNOSTIC_LINES: usize = 20;

pub struct FfmpegEngine {
    resources: EngineResources,
    workdir: Mutex<Option<TempDir>>,
}

impl FfmpegEngine {
    pub fn new(resources: EngineResources) -> Self {
        Self {
            resources,
            workdir: Mutex::new(None),
        }
    }

    fn workdir(&self) -> Result<PathBuf> {
        self.workdir
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .context("Media engine used before load() or after release()")
    }

    /// Resolve `name` inside the scratch directory.
    fn scratch_path(&self, name: &str) -> Result<PathBuf> {
        let is_plain = !name.is_empty()
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !is_plain {
            anyhow::bail!("Invalid engine file name: {name:?}");
        }
        Ok(self.workdir()?.join(name))
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn load(&self) -> Result<()> {
        let program = &self.resources.program;

        let output = Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| {
                format!("Failed to execute {program}. Make sure ffmpeg is installed.")
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{program} -version failed: {}", stderr.trim());
        }

        if let Some(version) = String::from_utf8_lossy(&output.stdout).lines().next() {
            crate::verbose!("Using {}", version);
        }

        let mut workdir = self.workdir.lock().unwrap_or_else(|e| e.into_inner());
        // A second load() keeps the first directory.
        if workdir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("vidscribe_")
                .tempdir()
                .context("Failed to create engine scratch directory")?;
            crate::verbose!("Engine scratch directory: {}", dir.path().display());
            *workdir = Some(dir);
        }

        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.scratch_path(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {name} to engine filesystem"))
    }

    async fn run(&self, args: &[&str], progress: &watch::Sender<f32>) -> Result<()> {
        let workdir = self.workdir()?;

        let mut child = Command::new(&self.resources.program)
            .args(["-hide_banner", "-nostdin", "-y", "-progress", "pipe:1", "-nostats"])
            .args(args)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute {}", self.resources.program))?;

        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        let stderr = child.stderr.take().context("ffmpeg stderr not captured")?;

        // Total duration is announced on stderr; progress ticks arrive on stdout.
        let duration_us = Arc::new(Mutex::new(None::<u64>));
        let stderr_task = tokio::spawn(collect_stderr(stderr, duration_us.clone()));

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read ffmpeg output")? {
            // Older builds only emit out_time_ms, which is also in microseconds.
            if let Some(value) = line
                .strip_prefix("out_time_us=")
                .or_else(|| line.strip_prefix("out_time_ms="))
            {
                let total = *duration_us.lock().unwrap_or_else(|e| e.into_inner());
                if let (Ok(done), Some(total)) = (value.trim().parse::<u64>(), total) {
                    progress.send_replace(progress_ratio(done, total));
                }
            } else if line.trim() == "progress=end" {
                progress.send_replace(1.0);
            }
        }

        let status = child.wait().await.context("Failed to wait for ffmpeg")?;
        let diagnostics = stderr_task.await.unwrap_or_default();

        if !status.success() {
            anyhow::bail!("ffmpeg exited with {status}: {diagnostics}");
        }

        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.scratch_path(name)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {name} from engine filesystem"))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.scratch_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove {name} from engine filesystem"))
            }
        }
    }

    fn release(&self) {
        let dir = self.workdir.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(dir) = dir {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Drain ffmpeg's stderr, recording the input duration and keeping the tail.
async fn collect_stderr(
    stderr: tokio::process::ChildStderr,
    duration_us: Arc<Mutex<Option<u64>>>,
) -> String {
    let mut tail: Vec<String> = Vec::new();
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(us) = parse_duration_us(&line) {
            let mut slot = duration_us.lock().unwrap_or_else(|e| e.into_inner());
            slot.get_or_insert(us);
        }
        if tail.len() == DIAGNOSTIC_LINES {
            tail.remove(0);
        }
        tail.push(line);
    }

    tail.join("\n")
}

/// Parse `  Duration: 00:01:02.50, start: ...` into microseconds.
fn parse_duration_us(line: &str) -> Option<u64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();

    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let total = (hours * 3600.0 + minutes * 60.0 + seconds) * 1_000_000.0;
    (total > 0.0).then_some(total as u64)
}

fn progress_ratio(done_us: u64, total_us: u64) -> f32 {
    if total_us == 0 {
        return 0.0;
    }
    (done_us as f64 / total_us as f64).clamp(0.0, 1.0) as f32
}
