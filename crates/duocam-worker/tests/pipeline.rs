//! End-to-end pipeline runs against an in-memory media backend.
//!
//! Every "file" the pipeline sees is a small text file holding a clip id;
//! the backend keeps the frames and audio for each id in memory. Files can
//! therefore be moved around like real ones while no FFmpeg is needed.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use duocam_media::audio::{estimate_offset, read_mono, AudioSignal};
use duocam_media::core::CallbackReporter;
use duocam_media::frame::{Frame, FrameSink, FrameSource, MemoryFrameSource};
use duocam_media::{MediaBackend, MediaError, MediaResult, VideoInfo};
use duocam_media::production::StitcherConfig;
use duocam_models::{MatchJob, MixerKind, OutputOptions, ProductionMode, ProgressUpdate, TaskStatus};
use duocam_worker::pipeline::{CUT_STEP, DONE_STEP, LINKING_STEP, VALIDATION_STEP};
use duocam_worker::{MatchPipeline, WorkerConfig};

const FPS: f64 = 30.0;
const RATE: u32 = 44_100;
const SAMPLES_PER_FRAME: usize = 1_470;
const WIDTH: u32 = 48;
const HEIGHT: u32 = 32;

#[derive(Clone)]
struct Clip {
    frames: Vec<Frame>,
    audio: Vec<f32>,
}

#[derive(Default)]
struct State {
    clips: HashMap<String, Clip>,
    next_id: usize,
    /// Ids of `cut` outputs, in call order
    cuts: Vec<String>,
    resampled: usize,
}

impl State {
    fn store(&mut self, path: &Path, clip: Clip) -> MediaResult<String> {
        let id = format!("clip-{}", self.next_id);
        self.next_id += 1;
        std::fs::write(path, &id)?;
        self.clips.insert(id.clone(), clip);
        Ok(id)
    }
}

#[derive(Default, Clone)]
struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    fn add(&self, path: &Path, clip: Clip) {
        self.state.lock().unwrap().store(path, clip).unwrap();
    }

    fn load(&self, path: &Path) -> MediaResult<Clip> {
        let id = std::fs::read_to_string(path).map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
        self.state
            .lock()
            .unwrap()
            .clips
            .get(id.trim())
            .cloned()
            .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
    }

    fn cuts(&self) -> Vec<Clip> {
        let state = self.state.lock().unwrap();
        state.cuts.iter().map(|id| state.clips[id].clone()).collect()
    }
}

struct StoreSink {
    state: Arc<Mutex<State>>,
    path: PathBuf,
    frames: Vec<Frame>,
    written: u64,
}

impl FrameSink for StoreSink {
    fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        self.frames.push(frame.clone());
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        let clip = Clip {
            frames: std::mem::take(&mut self.frames),
            audio: Vec::new(),
        };
        self.state.lock().unwrap().store(&self.path, clip)?;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl MediaBackend for MemoryBackend {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        let clip = self.load(path)?;
        let (width, height) = clip.frames.first().map(Frame::dimensions).unwrap_or((0, 0));
        Ok(VideoInfo {
            duration: clip.frames.len() as f64 / FPS,
            width,
            height,
            fps: FPS,
            frame_count: Some(clip.frames.len() as u64),
            codec: "rawvideo".to_string(),
            container_type: "memory".to_string(),
            has_audio: !clip.audio.is_empty(),
        })
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        let mut joined = Clip {
            frames: Vec::new(),
            audio: Vec::new(),
        };
        for input in inputs {
            let clip = self.load(input)?;
            joined.frames.extend(clip.frames);
            joined.audio.extend(clip.audio);
        }
        self.state.lock().unwrap().store(output, joined)?;
        Ok(())
    }

    async fn extract_audio(&self, input: &Path, _scratch: &Path) -> MediaResult<AudioSignal> {
        Ok(AudioSignal::new(self.load(input)?.audio, RATE))
    }

    async fn cut(&self, input: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()> {
        let clip = self.load(input)?;
        let range = |len: usize, per_second: f64| {
            let from = ((start * per_second).round() as usize).min(len);
            let to = ((end * per_second).round() as usize).clamp(from, len);
            from..to
        };
        let cut = Clip {
            frames: clip.frames[range(clip.frames.len(), FPS)].to_vec(),
            audio: clip.audio[range(clip.audio.len(), RATE as f64)].to_vec(),
        };
        let mut state = self.state.lock().unwrap();
        let id = state.store(output, cut)?;
        state.cuts.push(id);
        Ok(())
    }

    async fn resample_fps(&self, input: &Path, fps: f64, output: &Path) -> MediaResult<()> {
        let mut clip = self.load(input)?;
        let kept = (clip.frames.len() as f64 * fps / FPS).round() as usize;
        clip.frames = (0..kept)
            .map(|i| clip.frames[((i as f64 * FPS / fps) as usize).min(clip.frames.len() - 1)].clone())
            .collect();
        let mut state = self.state.lock().unwrap();
        state.store(output, clip)?;
        state.resampled += 1;
        Ok(())
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path, _fps: Option<f64>) -> MediaResult<()> {
        let mut clip = self.load(video)?;
        clip.audio = read_mono(audio)?.into_samples();
        self.state.lock().unwrap().store(output, clip)?;
        Ok(())
    }

    fn open_frames(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let clip = self.load(path)?;
        Ok(Box::new(MemoryFrameSource::new(path.display().to_string(), clip.frames, FPS)))
    }

    fn create_frames(&self, path: &Path, _width: u32, _height: u32, _fps: f64) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(StoreSink {
            state: self.state.clone(),
            path: path.to_path_buf(),
            frames: Vec::new(),
            written: 0,
        }))
    }
}

fn hash(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^ (x >> 16)
}

/// Frame `t` of a scene panning one pixel per frame over 8x8 random blocks.
fn scene_frame(t: usize) -> Frame {
    Frame::new(RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let (bx, by) = ((x + t as u32) / 8, y / 8);
        let v = (hash(bx.wrapping_mul(7919) ^ by.wrapping_mul(104_729)) & 0xff) as u8;
        Rgb([v, v, v])
    }))
}

fn scene_audio(samples: usize) -> Vec<f32> {
    let mut state = 0x2545_f491u32;
    (0..samples)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) - 0.5
        })
        .collect()
}

/// Two cameras over an 11 s scene: A sees seconds 0-10, B seconds 1-11.
struct Recording {
    frames: Vec<Frame>,
    audio: Vec<f32>,
}

impl Recording {
    fn new() -> Self {
        let frames = (0..330).map(scene_frame).collect();
        Self {
            frames,
            audio: scene_audio(330 * SAMPLES_PER_FRAME),
        }
    }

    /// Frames `[from, to)` of the scene with their audio.
    fn clip(&self, from: usize, to: usize) -> Clip {
        Clip {
            frames: self.frames[from..to].to_vec(),
            audio: self.audio[from * SAMPLES_PER_FRAME..to * SAMPLES_PER_FRAME].to_vec(),
        }
    }
}

struct Fixture {
    dir: TempDir,
    backend: MemoryBackend,
    updates: Arc<Mutex<Vec<ProgressUpdate>>>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            backend: MemoryBackend::default(),
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn add_clip(&self, name: &str, clip: Clip) -> PathBuf {
        let path = self.dir.path().join(name);
        self.backend.add(&path, clip);
        path
    }

    /// Camera A split into three clips given out of order, camera B as one clip.
    fn match_job(&self, recording: &Recording) -> MatchJob {
        let a0 = self.add_clip("a0.mp4", recording.clip(0, 100));
        let a1 = self.add_clip("a1.mp4", recording.clip(100, 200));
        let a2 = self.add_clip("a2.mp4", recording.clip(200, 300));
        let b = self.add_clip("b.mp4", recording.clip(30, 330));

        let options = OutputOptions {
            mixer: MixerKind::FrameDifference,
            ..OutputOptions::default()
        };
        MatchJob::new(vec![a2, a0, a1], vec![b], self.output()).with_options(options)
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out").join("match.mp4")
    }

    fn pipeline(&self) -> MatchPipeline {
        let config = WorkerConfig {
            work_dir: self.dir.path().join("work"),
            ..WorkerConfig::default()
        };
        MatchPipeline::with_backend(Arc::new(self.backend.clone()), config)
    }

    async fn run(&self, job: &MatchJob) -> duocam_worker::WorkerResult<duocam_models::JobOutput> {
        self.run_with(self.pipeline(), job).await
    }

    async fn run_with(
        &self,
        pipeline: MatchPipeline,
        job: &MatchJob,
    ) -> duocam_worker::WorkerResult<duocam_models::JobOutput> {
        let updates = self.updates.clone();
        let reporter = CallbackReporter::new(move |u| updates.lock().unwrap().push(u));
        pipeline.run(job, Arc::new(reporter)).await
    }

    fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_two_cameras_are_synced_and_mixed() {
    let fixture = Fixture::new();
    let recording = Recording::new();
    let job = fixture.match_job(&recording);

    let output = fixture.run(&job).await.unwrap();

    assert!((output.offset_seconds - 1.0).abs() <= 1.0 / RATE as f64, "{output:?}");
    assert!((output.synchronized_duration - 9.0).abs() < 1e-9);
    assert_eq!(output.file_path, fixture.output());

    let mixed = fixture.backend.load(&fixture.output()).unwrap();
    assert!(mixed.frames.len().abs_diff(270) <= 1, "{} frames", mixed.frames.len());
    assert_eq!(mixed.frames[0], recording.frames[30]);
    assert!(!mixed.audio.is_empty());

    let cuts = fixture.backend.cuts();
    assert_eq!(cuts.len(), 2);
    assert_eq!(cuts[0].frames[0], cuts[1].frames[0]);
    let residual = estimate_offset(&cuts[0].audio, &cuts[1].audio, RATE, 180.0).unwrap();
    assert!(residual.abs() <= 1.0 / RATE as f64, "residual {residual}");
}

#[tokio::test]
async fn test_progress_ends_finished_and_never_goes_back() {
    let fixture = Fixture::new();
    let job = fixture.match_job(&Recording::new());
    fixture.run(&job).await.unwrap();

    let updates = fixture.updates();
    let last = updates.last().unwrap();
    assert_eq!((last.step.as_str(), last.status, last.percent), (DONE_STEP, TaskStatus::Finished, 100));

    assert!(updates.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert!(updates.iter().any(|u| u.step == "Mixing videos" && (30..=80).contains(&u.percent)));
    assert!(updates.iter().all(|u| u.status != TaskStatus::Failed));
}

#[tokio::test]
async fn test_time_range_narrows_both_cameras() {
    let fixture = Fixture::new();
    let recording = Recording::new();
    let mut job = fixture.match_job(&recording);
    job.options.start_time = Some("00:00:02".to_string());
    job.options.end_time = Some("00:00:05".to_string());

    let output = fixture.run(&job).await.unwrap();
    assert!((output.synchronized_duration - 3.0).abs() < 1e-6);

    let mixed = fixture.backend.load(&fixture.output()).unwrap();
    assert!(mixed.frames.len().abs_diff(90) <= 1, "{} frames", mixed.frames.len());
    assert_eq!(mixed.frames[0], recording.frames[60]);
}

#[tokio::test]
async fn test_working_files_removed_unless_kept() {
    let fixture = Fixture::new();
    let recording = Recording::new();
    let job = fixture.match_job(&recording);
    fixture.run(&job).await.unwrap();
    assert!(!fixture.dir.path().join("work").join(job.id.as_str()).exists());

    let mut job = fixture.match_job(&recording);
    job.options.keep_intermediate = true;
    fixture.run(&job).await.unwrap();
    assert!(fixture.dir.path().join("work").join(job.id.as_str()).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_panorama_stitches_resampled_cameras() {
    let fixture = Fixture::new();
    let recording = Recording::new();
    let mut job = fixture.match_job(&recording);
    job.options.mode = ProductionMode::Panorama;
    job.options.output_fps = Some(15);

    // Stands in for the stitcher: the left input becomes the panorama.
    let stitcher = StitcherConfig::default().with_binary("sh").with_leading_args([
        "-c",
        "echo PROGRESS: 50; cp \"$6\" \"$1/$2\"",
        "stitcher",
    ]);
    let output = fixture
        .run_with(fixture.pipeline().with_stitcher(stitcher), &job)
        .await
        .unwrap();
    assert!((output.synchronized_duration - 9.0).abs() < 1e-9);

    assert_eq!(fixture.backend.state.lock().unwrap().resampled, 2);
    let panorama = fixture.backend.load(&fixture.output()).unwrap();
    assert!(panorama.frames.len().abs_diff(135) <= 1, "{} frames", panorama.frames.len());
    assert_eq!(panorama.frames[0], recording.frames[30]);
    assert!(fixture.updates().iter().any(|u| u.percent == 55));
}

async fn assert_rejects_upsampling(mode: ProductionMode) {
    let fixture = Fixture::new();
    let mut job = fixture.match_job(&Recording::new());
    job.options.mode = mode;
    job.options.output_fps = Some(60);

    let err = fixture.run(&job).await.unwrap_err();
    assert!(err.is_input_validation(), "{err}");
    assert_eq!(err.stage_name(), Some(VALIDATION_STEP));
    assert!(err.to_string().contains("cannot be higher than input fps 30"), "{err}");

    assert!(fixture.backend.cuts().is_empty());
    let updates = fixture.updates();
    assert!(updates.iter().all(|u| u.step != CUT_STEP), "{updates:?}");
    let last = updates.last().unwrap();
    assert_eq!((last.step.as_str(), last.status), (VALIDATION_STEP, TaskStatus::Failed));
    assert!(!fixture.output().exists());
}

#[tokio::test]
async fn test_mixer_rejects_output_fps_above_input_before_cutting() {
    assert_rejects_upsampling(ProductionMode::Mixer).await;
}

#[tokio::test]
async fn test_panorama_rejects_output_fps_above_input_before_cutting() {
    assert_rejects_upsampling(ProductionMode::Panorama).await;
}

#[tokio::test]
async fn test_ambiguous_clips_fail_linking() {
    let fixture = Fixture::new();
    let still = Clip {
        frames: vec![Frame::filled(WIDTH, HEIGHT, [40, 40, 40]); 90],
        audio: scene_audio(90 * SAMPLES_PER_FRAME),
    };
    let left = (0..3)
        .map(|i| fixture.add_clip(&format!("still{i}.mp4"), still.clone()))
        .collect();
    let right = vec![fixture.add_clip("b.mp4", still.clone())];
    let job = MatchJob::new(left, right, fixture.output());

    let err = fixture.run(&job).await.unwrap_err();
    assert!(err.is_linking_failure(), "{err}");
    assert_eq!(err.stage_name(), Some(LINKING_STEP));

    let last = fixture.updates().pop().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(last.step, LINKING_STEP);
    assert!(last.error.unwrap().contains("linking"));
    assert!(!fixture.output().exists());
}

#[tokio::test]
async fn test_job_without_clips_is_rejected() {
    let fixture = Fixture::new();
    let job = MatchJob::new(Vec::new(), vec![PathBuf::from("b.mp4")], fixture.output());

    let err = fixture.run(&job).await.unwrap_err();
    assert!(err.is_input_validation());

    let updates = fixture.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, TaskStatus::Failed);
    assert_eq!(updates[0].step, VALIDATION_STEP);
}
