//! The match pipeline.
//!
//! One run takes both cameras' unordered clips to a single output video:
//!
//! 1. Link each camera's clips into recording order.
//! 2. Concatenate them into one file per camera.
//! 3. Extract mono audio and estimate the offset between the cameras.
//! 4. Cut both videos to the synchronized window (narrowed to the requested
//!    time range, if any).
//! 5. Produce the output video (mixer or panorama).
//! 6. Align and mix both audio tracks to stereo, mux, move to the job output.
//!
//! Steps run strictly one after the other. Every step reports STARTED with
//! its share of the overall progress; a failure reports FAILED with the step
//! name and stops the run.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use duocam_media::audio::{self, mix_stereo, normalize_peak, write_stereo, MixRatio, SyncConfig, SyncOutcome, WavEncoding};
use duocam_media::fs_utils::{move_file, working_file};
use duocam_media::production::{check_output_fps, ensure_inputs, producer_for, ProductionRequest, StitcherConfig};
use duocam_media::{
    AudioSignal, BandReporter, ClipLinker, FfmpegBackend, LinkerConfig, MediaBackend, MediaError, MixerConfig,
    ProgressReporter, SyncWindow, VideoInfo,
};
use duocam_models::{format_seconds, Camera, JobOutput, LinkingMethod, MatchJob, OutputOptions, ProductionMode};

use crate::config::WorkerConfig;
use crate::error::{StageContext, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{self, StageTimer};

pub const LINKING_STEP: &str = "Linking clips";
pub const CONCAT_STEP: &str = "Concatenating clips";
pub const AUDIO_STEP: &str = "Extracting audio";
pub const SYNC_STEP: &str = "Synchronizing";
pub const CUT_STEP: &str = "Cutting videos";
pub const PRODUCTION_STEP: &str = "Producing video";
pub const AUDIO_MIX_STEP: &str = "Mixing audio";
pub const MUX_STEP: &str = "Muxing";
pub const DONE_STEP: &str = "Done";
pub const VALIDATION_STEP: &str = "Validating job";

/// Step reported for failures that happen outside any step.
const ERROR_STEP: &str = "Error";

/// Overall progress band handed to the output producer.
const PRODUCTION_BAND: (u8, u8) = (30, 80);

/// Runs match jobs against a media backend.
pub struct MatchPipeline {
    backend: Arc<dyn MediaBackend>,
    config: WorkerConfig,
    stitcher: StitcherConfig,
}

/// Per-run state shared by the steps.
struct RunContext<'a> {
    logger: &'a JobLogger,
    reporter: &'a Arc<dyn ProgressReporter>,
    work_dir: PathBuf,
    options: OutputOptions,
}

impl RunContext<'_> {
    /// Run one step: report it, time it, and tag media errors with its name.
    async fn step<T, F>(&self, stage: &'static str, percent: u8, work: F) -> WorkerResult<T>
    where
        F: Future<Output = WorkerResult<T>>,
    {
        self.logger.stage(stage, percent);
        self.reporter.started(stage, percent);

        let timer = StageTimer::start(stage);
        let result = work.await;
        timer.finish(if result.is_ok() { "ok" } else { "failed" });

        result.map_err(|err| match err {
            WorkerError::Media(source) => WorkerError::stage(stage, source),
            other => other,
        })
    }

    fn file(&self, camera: Option<Camera>, name: &str, ext: &str) -> PathBuf {
        let prefix = match camera {
            Some(Camera::A) => "left",
            Some(Camera::B) => "right",
            None => "match",
        };
        working_file(&self.work_dir, prefix, name, ext)
    }
}

/// What the sync step measured.
struct Synchronized {
    outcome: SyncOutcome,
    window: SyncWindow,
    audio_a: AudioSignal,
    audio_b: AudioSignal,
    info_a: VideoInfo,
}

impl MatchPipeline {
    /// Pipeline driving FFmpeg.
    pub fn new(config: WorkerConfig) -> Self {
        Self::with_backend(Arc::new(FfmpegBackend), config)
    }

    pub fn with_backend(backend: Arc<dyn MediaBackend>, config: WorkerConfig) -> Self {
        Self {
            backend,
            config,
            stitcher: StitcherConfig::from_env(),
        }
    }

    pub fn with_stitcher(mut self, stitcher: StitcherConfig) -> Self {
        self.stitcher = stitcher;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run `job` to completion, reporting progress to `reporter`.
    ///
    /// The job's working directory is removed afterwards unless intermediate
    /// files are kept, whether or not the run succeeded.
    pub async fn run(&self, job: &MatchJob, reporter: Arc<dyn ProgressReporter>) -> WorkerResult<JobOutput> {
        let logger = JobLogger::for_job(job);
        let started = Instant::now();
        let work_dir = self.config.work_dir.join(job.id.as_str());
        let keep = self.config.keep_intermediate || job.options.keep_intermediate;

        logger.accepted(job);

        let result = self
            .execute(job, &logger, &reporter, work_dir.clone())
            .instrument(logger.span())
            .await;

        if !keep {
            remove_work_dir(&work_dir, &logger).await;
        }

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(output) => {
                metrics::record_job("succeeded", elapsed);
                reporter.finished(DONE_STEP, 100);
                logger.completed(
                    &output.file_path,
                    output.offset_seconds,
                    output.synchronized_duration,
                    elapsed,
                );
            }
            Err(err) => {
                metrics::record_job("failed", elapsed);
                let stage = err.stage_name().unwrap_or(if err.is_input_validation() {
                    VALIDATION_STEP
                } else {
                    ERROR_STEP
                });
                logger.failed(stage, err);
                reporter.failed(stage, &err.to_string());
            }
        }
        result
    }

    async fn execute(
        &self,
        job: &MatchJob,
        logger: &JobLogger,
        reporter: &Arc<dyn ProgressReporter>,
        work_dir: PathBuf,
    ) -> WorkerResult<JobOutput> {
        job.validate()?;
        let options = self.config.apply_overrides(&job.options);
        let time_range = options.time_range()?;
        tokio::fs::create_dir_all(&work_dir).await?;

        let ctx = RunContext {
            logger,
            reporter,
            work_dir,
            options,
        };

        let (ordered_a, ordered_b) = ctx
            .step(LINKING_STEP, 5, async {
                let a = self.link(Camera::A, &job.left_clips, ctx.options.linking).await?;
                let b = self.link(Camera::B, &job.right_clips, ctx.options.linking).await?;
                Ok::<_, WorkerError>((a, b))
            })
            .await?;

        let (video_a, video_b) = ctx
            .step(CONCAT_STEP, 10, async {
                let a = self.join_clips(&ctx, Camera::A, ordered_a).await?;
                let b = self.join_clips(&ctx, Camera::B, ordered_b).await?;
                Ok::<_, WorkerError>((a, b))
            })
            .await?;

        let (audio_a, audio_b) = ctx
            .step(AUDIO_STEP, 15, async {
                let a = self
                    .backend
                    .extract_audio(&video_a, &ctx.file(Some(Camera::A), "audio", "wav"))
                    .await?;
                let b = self
                    .backend
                    .extract_audio(&video_b, &ctx.file(Some(Camera::B), "audio", "wav"))
                    .await?;
                Ok::<_, WorkerError>((a, b))
            })
            .await?;

        let Synchronized {
            outcome,
            window: overlap,
            audio_a,
            audio_b,
            info_a,
        } = ctx
            .step(SYNC_STEP, 20, self.synchronize(&ctx, &video_a, &video_b, audio_a, audio_b))
            .await?;

        let window = match overlap
            .adjust_time_range(&time_range)
            .in_stage(CUT_STEP)?
        {
            Some((start, end)) => overlap.restrict(start, end),
            None => overlap,
        };
        metrics::record_sync(outcome.offset_seconds, window.duration);
        ctx.logger.note(
            SYNC_STEP,
            &format!(
                "offset {:.3}s, A from {}, B from {}, {} long",
                outcome.offset_seconds,
                format_seconds(window.a_range().0),
                format_seconds(window.b_range().0),
                format_seconds(window.duration)
            ),
        );

        let input_fps = frame_rate(&info_a).in_stage(VALIDATION_STEP)?;
        let output_fps = ctx.options.output_fps.unwrap_or(input_fps);
        check_output_fps(input_fps, output_fps).in_stage(VALIDATION_STEP)?;

        let (synced_a, synced_b) = ctx
            .step(CUT_STEP, 25, async {
                let ext = extension_of(&video_a);
                let a = ctx.file(Some(Camera::A), "synced", ext);
                let b = ctx.file(Some(Camera::B), "synced", ext);
                let (a_start, a_end) = window.a_range();
                let (b_start, b_end) = window.b_range();
                self.backend.cut(&video_a, a_start, a_end, &a).await?;
                self.backend.cut(&video_b, b_start, b_end, &b).await?;

                // The stitcher renders every input frame.
                if ctx.options.mode == ProductionMode::Panorama && output_fps < input_fps {
                    let fps = output_fps as f64;
                    let a_out = ctx.file(Some(Camera::A), "resampled", ext);
                    let b_out = ctx.file(Some(Camera::B), "resampled", ext);
                    self.backend.resample_fps(&a, fps, &a_out).await?;
                    self.backend.resample_fps(&b, fps, &b_out).await?;
                    return Ok::<_, WorkerError>((a_out, b_out));
                }
                Ok::<_, WorkerError>((a, b))
            })
            .await?;

        let produced = ctx
            .step(PRODUCTION_STEP, PRODUCTION_BAND.0, async {
                let request = ProductionRequest {
                    camera_a: synced_a.clone(),
                    camera_b: synced_b.clone(),
                    output: ctx.file(None, "video", extension_of(&synced_a)),
                    input_fps,
                    output_fps,
                };
                ensure_inputs(&request)?;

                let producer = producer_for(
                    ctx.options.mode,
                    self.backend.clone(),
                    self.mixer_config(&ctx.options, input_fps),
                    self.stitcher.clone(),
                );
                let band: Arc<dyn ProgressReporter> = Arc::new(BandReporter::new(
                    ctx.reporter.clone(),
                    PRODUCTION_BAND.0,
                    PRODUCTION_BAND.1,
                ));
                let result = producer.produce(&request, band).await?;
                if let Some(stats) = &result.mix_stats {
                    ctx.logger.note(PRODUCTION_STEP, &format!(
                        "mixed {} frames ({} from A, {} from B, {} switches)",
                        stats.frames_written, stats.frames_from_a, stats.frames_from_b, stats.switches
                    ));
                }
                Ok::<_, WorkerError>(result.path)
            })
            .await?;

        let mixed_audio = ctx
            .step(AUDIO_MIX_STEP, PRODUCTION_BAND.1, async {
                let path = ctx.file(None, "audio", "wav");
                write_mixed_audio(&window, audio_a, audio_b, path.clone()).await?;
                Ok::<_, WorkerError>(path)
            })
            .await?;

        ctx.step(MUX_STEP, 85, async {
            let muxed = ctx.file(None, "final", &ctx.options.file_type);
            self.backend
                .mux(&produced, &mixed_audio, &muxed, Some(output_fps as f64))
                .await?;
            move_file(&muxed, &job.output).await?;
            Ok::<_, WorkerError>(())
        })
        .await?;

        Ok(JobOutput {
            job_id: job.id.clone(),
            file_path: job.output.clone(),
            offset_seconds: outcome.offset_seconds,
            sync_confidence: outcome.confidence,
            synchronized_duration: window.duration,
        })
    }

    /// Order one camera's clips on a blocking thread.
    async fn link(&self, camera: Camera, clips: &[PathBuf], method: LinkingMethod) -> WorkerResult<Vec<PathBuf>> {
        let backend = self.backend.clone();
        let clips = clips.to_vec();
        let config = LinkerConfig::default().with_method(method);

        let ordered = tokio::task::spawn_blocking(move || {
            let opener = move |path: &Path| backend.open_frames(path);
            ClipLinker::with_opener(opener, config).link(camera, &clips)
        })
        .await
        .map_err(|e| WorkerError::task_failed(format!("linking task failed: {e}")))??;

        Ok(ordered)
    }

    /// One file per camera; a single clip is used as is.
    async fn join_clips(&self, ctx: &RunContext<'_>, camera: Camera, ordered: Vec<PathBuf>) -> WorkerResult<PathBuf> {
        if let [only] = ordered.as_slice() {
            return Ok(only.clone());
        }
        let ext = ordered.first().map_or("mp4", |p| extension_of(p));
        let output = ctx.file(Some(camera), "concat", ext);
        self.backend.concatenate(&ordered, &output).await?;
        Ok(output)
    }

    async fn synchronize(
        &self,
        ctx: &RunContext<'_>,
        video_a: &Path,
        video_b: &Path,
        audio_a: AudioSignal,
        audio_b: AudioSignal,
    ) -> WorkerResult<Synchronized> {
        let info_a = self.backend.probe(video_a).await?;
        let info_b = self.backend.probe(video_b).await?;

        let method = ctx.options.sync_method;
        let config = SyncConfig::default().with_max_compare_seconds(self.config.compare_seconds);
        let (audio_a, audio_b, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = audio::estimate(method, &audio_a, &audio_b, &config);
            (audio_a, audio_b, outcome)
        })
        .await
        .map_err(|e| WorkerError::task_failed(format!("sync task failed: {e}")))?;
        let outcome = outcome?;

        let window = SyncWindow::compute(
            outcome.offset_seconds,
            duration_of(&info_a, &audio_a),
            duration_of(&info_b, &audio_b),
        )?;

        Ok(Synchronized {
            outcome,
            window,
            audio_a,
            audio_b,
            info_a,
        })
    }

    fn mixer_config(&self, options: &OutputOptions, input_fps: u32) -> MixerConfig {
        let mut config = MixerConfig::new(options.mixer, input_fps);
        if let Some(fps) = self.config.flow_fps {
            config = config.with_flow_eval_fps(fps);
        }
        if let Some(length) = self.config.history_length {
            config = config.with_history_length(length);
        }
        if let Some((width, height)) = self.config.output_size {
            config = config.with_output_size(width, height);
        }
        config
    }
}

/// Cut both tracks to the window, mix them to stereo and write a WAV.
async fn write_mixed_audio(
    window: &SyncWindow,
    audio_a: AudioSignal,
    audio_b: AudioSignal,
    path: PathBuf,
) -> WorkerResult<()> {
    let window = *window;
    tokio::task::spawn_blocking(move || {
        let (a, b) = window.align(&audio_a, &audio_b);
        let stereo = mix_stereo(&normalize_peak(&a), &normalize_peak(&b), MixRatio::default())?;
        write_stereo(&path, &stereo, WavEncoding::Pcm16)
    })
    .await
    .map_err(|e| WorkerError::task_failed(format!("audio mix task failed: {e}")))??;
    Ok(())
}

/// Container duration, or the audio length when the container does not say.
fn duration_of(info: &VideoInfo, audio: &AudioSignal) -> f64 {
    if info.duration > 0.0 {
        info.duration
    } else {
        audio.duration()
    }
}

/// Whole-number frame rate the mixer works at.
fn frame_rate(info: &VideoInfo) -> Result<u32, MediaError> {
    let fps = info.fps.round();
    if fps.is_nan() || fps < 1.0 {
        return Err(MediaError::invalid_config(format!("unusable frame rate {}", info.fps)));
    }
    Ok(fps as u32)
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("mp4")
}

async fn remove_work_dir(dir: &Path, logger: &JobLogger) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            logger.cleanup_failed(dir, &err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fps: f64, duration: f64) -> VideoInfo {
        VideoInfo {
            duration,
            width: 16,
            height: 16,
            fps,
            frame_count: None,
            codec: "h264".to_string(),
            container_type: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            has_audio: true,
        }
    }

    #[test]
    fn test_frame_rate_rounds_ntsc() {
        assert_eq!(frame_rate(&info(29.97, 1.0)).unwrap(), 30);
        assert!(frame_rate(&info(0.0, 1.0)).is_err());
        assert!(frame_rate(&info(f64::NAN, 1.0)).is_err());
    }

    #[test]
    fn test_duration_falls_back_to_audio() {
        let audio = AudioSignal::new(vec![0.0; 800], 100);
        assert_eq!(duration_of(&info(30.0, 12.5), &audio), 12.5);
        assert_eq!(duration_of(&info(30.0, 0.0), &audio), 8.0);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/clips/a.MOV")), "MOV");
        assert_eq!(extension_of(Path::new("/clips/noext")), "mp4");
    }
}
