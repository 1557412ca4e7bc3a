//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{TrackTags, TranscodeJob, TranscodeResult};

/// Lines of ffmpeg stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

const STEP_EXTRACT: &str = "audio extraction";
const STEP_TAG: &str = "cover and tag mux";

/// How a single ffmpeg run ended.
enum RunOutcome {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
    TimedOut,
    Cancelled,
}

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    fn global_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-y".to_string(),
        ]
    }

    /// First pass: audio only, source metadata dropped, re-encoded to MP3.
    fn build_extract_args(&self, input_path: &Path, audio_path: &Path) -> Vec<String> {
        let mut args = self.global_args();
        args.extend([
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", self.config.bitrate_kbps),
            audio_path.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Second pass: attach the square cover and write ID3v2.3 tags.
    fn build_tag_args(
        &self,
        audio_path: &Path,
        cover_path: &Path,
        output_path: &Path,
        tags: &TrackTags,
    ) -> Vec<String> {
        let mut args = self.global_args();
        args.extend([
            "-i".to_string(),
            audio_path.to_string_lossy().to_string(),
            "-i".to_string(),
            cover_path.to_string_lossy().to_string(),
            "-filter_complex".to_string(),
            self.cover_filter(),
            "-map".to_string(),
            "0:a".to_string(),
            "-map".to_string(),
            "[v]".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-c:v".to_string(),
            "mjpeg".to_string(),
            "-id3v2_version".to_string(),
            "3".to_string(),
        ]);
        args.extend(tags.to_ffmpeg_args());
        args.extend([
            "-metadata:s:v".to_string(),
            "title=Cover".to_string(),
            "-metadata:s:v".to_string(),
            "comment=Cover (Front)".to_string(),
            "-disposition:v".to_string(),
            "attached_pic".to_string(),
            output_path.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Scales the cover to fit the square and pads the rest.
    fn cover_filter(&self) -> String {
        let size = self.config.cover_size;
        format!(
            "[1:v]scale={size}:{size}:force_original_aspect_ratio=decrease,\
             pad={size}:{size}:(ow-iw)/2:(oh-ih)/2[v]"
        )
    }

    /// Runs one ffmpeg invocation, killing the child on timeout or cancel.
    async fn run_ffmpeg(
        &self,
        step: &'static str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), ConverterError> {
        debug!(step, args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        let limit = Duration::from_secs(self.config.timeout_secs);
        let outcome = tokio::select! {
            waited = timeout(limit, child.wait()) => match waited {
                Ok(Ok(status)) => RunOutcome::Exited(status),
                Ok(Err(e)) => RunOutcome::WaitFailed(e),
                Err(_) => RunOutcome::TimedOut,
            },
            _ = cancel.cancelled() => RunOutcome::Cancelled,
        };

        match outcome {
            RunOutcome::Exited(status) => {
                let stderr_lines = match stderr_task {
                    Some(task) => task.await.unwrap_or_default(),
                    None => Vec::new(),
                };
                if status.success() {
                    return Ok(());
                }

                let code = status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                let reason = match stderr_lines.last() {
                    Some(last) => format!("ffmpeg exited with code {}: {}", code, last),
                    None => format!("ffmpeg exited with code {}", code),
                };
                let stderr = (!stderr_lines.is_empty()).then(|| stderr_lines.join("\n"));
                Err(ConverterError::conversion_failed(step, reason, stderr))
            }
            RunOutcome::WaitFailed(e) => {
                abort_reader(stderr_task);
                Err(ConverterError::Io(e))
            }
            RunOutcome::TimedOut => {
                warn!(step, timeout_secs = self.config.timeout_secs, "ffmpeg timed out, killing");
                let _ = child.kill().await;
                abort_reader(stderr_task);
                Err(ConverterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
            RunOutcome::Cancelled => {
                debug!(step, "ffmpeg cancelled, killing");
                let _ = child.kill().await;
                abort_reader(stderr_task);
                Err(ConverterError::Cancelled)
            }
        }
    }
}

fn abort_reader<T>(task: Option<tokio::task::JoinHandle<T>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Failed to remove intermediate file");
        }
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        cancel: &CancellationToken,
    ) -> Result<TranscodeResult, ConverterError> {
        let start = Instant::now();

        if tokio::fs::metadata(&job.input_path).await.is_err() {
            return Err(ConverterError::InputNotFound {
                path: job.input_path.clone(),
            });
        }
        if tokio::fs::metadata(&job.cover_path).await.is_err() {
            return Err(ConverterError::CoverArtMissing {
                path: job.cover_path.clone(),
            });
        }
        if cancel.is_cancelled() {
            return Err(ConverterError::Cancelled);
        }

        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let audio_path = job.intermediate_path();
        let extract = self.build_extract_args(&job.input_path, &audio_path);
        if let Err(e) = self.run_ffmpeg(STEP_EXTRACT, &extract, cancel).await {
            remove_quietly(&audio_path).await;
            return Err(e);
        }

        let tag = self.build_tag_args(&audio_path, &job.cover_path, &job.output_path, &job.tags);
        let tagged = self.run_ffmpeg(STEP_TAG, &tag, cancel).await;
        remove_quietly(&audio_path).await;
        if let Err(e) = tagged {
            remove_quietly(&job.output_path).await;
            return Err(e);
        }

        let output_meta = tokio::fs::metadata(&job.output_path).await.map_err(|_| {
            ConverterError::conversion_failed(STEP_TAG, "output file not created", None)
        })?;

        let result = TranscodeResult {
            output_path: job.output_path.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            output = %result.output_path.display(),
            size = result.output_size_bytes,
            duration_ms = result.duration_ms,
            "Transcode finished"
        );
        Ok(result)
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(ConverterError::conversion_failed(
                "version check",
                format!("ffmpeg -version exited with {:?}", out.status.code()),
                Some(String::from_utf8_lossy(&out.stderr).into_owned()),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConverterError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                })
            }
            Err(e) => Err(ConverterError::Io(e)),
        }
    }
}
