//! Output production strategies.
//!
//! Once both cameras are synchronized and cut, one [`OutputProducer`] turns
//! the pair into a single video: the motion-driven mixer switches between
//! views, the panorama strategy hands both to the external stitcher.

pub mod stitch;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use duocam_models::ProductionMode;

use crate::backend::MediaBackend;
use crate::core::ProgressReporter;
use crate::error::{MediaError, MediaResult};
use crate::mixer::{CameraMixer, MixStats, MixerConfig};

pub use stitch::{stitch, StitcherConfig, STITCHER_BIN_ENV};

/// Step name used while stitching.
pub const STITCHING_STEP: &str = "Stitching videos";

/// Inputs for one production run.
#[derive(Debug, Clone)]
pub struct ProductionRequest {
    /// Synchronized camera A video
    pub camera_a: PathBuf,
    /// Synchronized camera B video
    pub camera_b: PathBuf,
    pub output: PathBuf,
    /// Rate of the synchronized inputs
    pub input_fps: u32,
    pub output_fps: u32,
}

/// What a producer made.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionResult {
    pub path: PathBuf,
    /// Mixer counters; `None` for the panorama
    pub mix_stats: Option<MixStats>,
}

#[async_trait]
pub trait OutputProducer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn produce(
        &self,
        request: &ProductionRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> MediaResult<ProductionResult>;
}

/// Frame-by-frame camera switching.
pub struct MixerProducer {
    backend: Arc<dyn MediaBackend>,
    config: MixerConfig,
}

impl MixerProducer {
    pub fn new(backend: Arc<dyn MediaBackend>, config: MixerConfig) -> Self {
        Self { backend, config }
    }
}

#[async_trait]
impl OutputProducer for MixerProducer {
    fn name(&self) -> &'static str {
        "mixer"
    }

    async fn produce(
        &self,
        request: &ProductionRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> MediaResult<ProductionResult> {
        let config = self.config.clone().with_output_fps(request.output_fps);
        config.validate()?;

        let backend = self.backend.clone();
        let request = request.clone();
        let stats = tokio::task::spawn_blocking(move || -> MediaResult<(PathBuf, MixStats)> {
            let mut a = backend.open_frames(&request.camera_a)?;
            let mut b = backend.open_frames(&request.camera_b)?;
            let (width, height) = config.output_size.unwrap_or_else(|| a.dimensions());
            let mut sink = backend.create_frames(&request.output, width, height, config.output_fps as f64)?;

            let stats = CameraMixer::new(config).mix(a.as_mut(), b.as_mut(), sink.as_mut(), reporter.as_ref())?;
            Ok((request.output, stats))
        })
        .await
        .map_err(|e| MediaError::internal(format!("mixer task failed: {e}")))?;

        let (path, stats) = stats?;
        Ok(ProductionResult {
            path,
            mix_stats: Some(stats),
        })
    }
}

/// Panorama through the external stitcher.
pub struct PanoramaProducer {
    config: StitcherConfig,
}

impl PanoramaProducer {
    pub fn new(config: StitcherConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OutputProducer for PanoramaProducer {
    fn name(&self) -> &'static str {
        "panorama"
    }

    async fn produce(
        &self,
        request: &ProductionRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> MediaResult<ProductionResult> {
        check_output_fps(request.input_fps, request.output_fps)?;
        reporter.started(STITCHING_STEP, 0);
        let path = stitch(
            &self.config,
            &request.camera_a,
            &request.camera_b,
            &request.output,
            request.output_fps,
            |percent| reporter.running(STITCHING_STEP, percent),
        )
        .await?;
        reporter.finished(STITCHING_STEP, 100);
        Ok(ProductionResult { path, mix_stats: None })
    }
}

/// Producer for a production mode.
pub fn producer_for(
    mode: ProductionMode,
    backend: Arc<dyn MediaBackend>,
    mixer: MixerConfig,
    stitcher: StitcherConfig,
) -> Box<dyn OutputProducer> {
    let producer: Box<dyn OutputProducer> = match mode {
        ProductionMode::Mixer => Box::new(MixerProducer::new(backend, mixer)),
        ProductionMode::Panorama => Box::new(PanoramaProducer::new(stitcher)),
    };
    info!(mode = %mode, producer = producer.name(), "Selected output producer");
    producer
}

/// Neither producer can invent frames: the output rate must not exceed the
/// input rate.
pub fn check_output_fps(input_fps: u32, output_fps: u32) -> MediaResult<()> {
    if output_fps > input_fps {
        return Err(MediaError::invalid_config(format!(
            "output fps {} cannot be higher than input fps {}",
            output_fps, input_fps
        )));
    }
    Ok(())
}

/// Check that both synchronized inputs exist before producing.
pub fn ensure_inputs(request: &ProductionRequest) -> MediaResult<()> {
    for path in [&request.camera_a, &request.camera_b] {
        if !Path::new(path).exists() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSignal;
    use crate::core::NoopReporter;
    use crate::frame::{Frame, FrameSink, FrameSource, MemoryFrameSink, MemoryFrameSource};
    use crate::probe::VideoInfo;
    use duocam_models::MixerKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed frame lists and records how many frames each sink received.
    #[derive(Default)]
    struct FrameStore {
        clips: HashMap<PathBuf, Vec<Frame>>,
        written: Arc<Mutex<HashMap<PathBuf, u64>>>,
    }

    struct CountingSink {
        path: PathBuf,
        inner: MemoryFrameSink,
        written: Arc<Mutex<HashMap<PathBuf, u64>>>,
    }

    impl FrameSink for CountingSink {
        fn write(&mut self, frame: &Frame) -> MediaResult<()> {
            self.inner.write(frame)
        }

        fn finish(&mut self) -> MediaResult<()> {
            self.inner.finish()?;
            self.written
                .lock()
                .unwrap()
                .insert(self.path.clone(), self.inner.frames_written());
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.inner.frames_written()
        }
    }

    #[async_trait]
    impl MediaBackend for FrameStore {
        async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
            Err(MediaError::internal("not used"))
        }
        async fn concatenate(&self, _inputs: &[PathBuf], _output: &Path) -> MediaResult<()> {
            Err(MediaError::internal("not used"))
        }
        async fn extract_audio(&self, _input: &Path, _scratch: &Path) -> MediaResult<AudioSignal> {
            Err(MediaError::internal("not used"))
        }
        async fn cut(&self, _input: &Path, _start: f64, _end: f64, _output: &Path) -> MediaResult<()> {
            Err(MediaError::internal("not used"))
        }
        async fn resample_fps(&self, _input: &Path, _fps: f64, _output: &Path) -> MediaResult<()> {
            Err(MediaError::internal("not used"))
        }
        async fn mux(&self, _video: &Path, _audio: &Path, _output: &Path, _fps: Option<f64>) -> MediaResult<()> {
            Err(MediaError::internal("not used"))
        }
        fn open_frames(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
            let frames = self
                .clips
                .get(path)
                .cloned()
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;
            Ok(Box::new(MemoryFrameSource::new(path.display().to_string(), frames, 30.0)))
        }
        fn create_frames(&self, path: &Path, width: u32, height: u32, _fps: f64) -> MediaResult<Box<dyn FrameSink>> {
            Ok(Box::new(CountingSink {
                path: path.to_path_buf(),
                inner: MemoryFrameSink::with_size(width, height),
                written: self.written.clone(),
            }))
        }
    }

    fn request(fps: u32) -> ProductionRequest {
        ProductionRequest {
            camera_a: PathBuf::from("a.mp4"),
            camera_b: PathBuf::from("b.mp4"),
            output: PathBuf::from("mixed.mp4"),
            input_fps: 30,
            output_fps: fps,
        }
    }

    fn store() -> FrameStore {
        let mut store = FrameStore::default();
        store
            .clips
            .insert(PathBuf::from("a.mp4"), vec![Frame::filled(16, 8, [90, 90, 90]); 30]);
        store
            .clips
            .insert(PathBuf::from("b.mp4"), vec![Frame::filled(16, 8, [20, 20, 20]); 30]);
        store
    }

    #[tokio::test]
    async fn test_mixer_producer_writes_through_backend() {
        let store = Arc::new(store());
        let written = store.written.clone();
        let producer = producer_for(
            ProductionMode::Mixer,
            store,
            MixerConfig::new(MixerKind::FrameDifference, 30),
            StitcherConfig::default(),
        );
        assert_eq!(producer.name(), "mixer");

        let result = producer.produce(&request(15), Arc::new(NoopReporter)).await.unwrap();
        assert_eq!(result.path, PathBuf::from("mixed.mp4"));
        assert_eq!(result.mix_stats.map(|s| s.frames_written), Some(15));
        assert_eq!(written.lock().unwrap().get(Path::new("mixed.mp4")), Some(&15));
    }

    #[tokio::test]
    async fn test_mixer_producer_rejects_upsampling() {
        let producer = MixerProducer::new(Arc::new(store()), MixerConfig::new(MixerKind::FrameDifference, 30));
        let err = producer.produce(&request(60), Arc::new(NoopReporter)).await.unwrap_err();
        assert!(err.is_input_validation());
    }

    #[test]
    fn test_panorama_mode_selects_stitcher() {
        let producer = producer_for(
            ProductionMode::Panorama,
            Arc::new(store()),
            MixerConfig::new(MixerKind::FrameDifference, 30),
            StitcherConfig::default(),
        );
        assert_eq!(producer.name(), "panorama");
    }

    #[tokio::test]
    async fn test_panorama_rejects_upsampling_before_stitching() {
        let stitcher = StitcherConfig::default().with_binary("/nonexistent/stitcher");
        let producer = PanoramaProducer::new(stitcher);
        let err = producer.produce(&request(60), Arc::new(NoopReporter)).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn test_check_output_fps() {
        assert!(check_output_fps(30, 30).is_ok());
        assert!(check_output_fps(30, 15).is_ok());
        assert!(check_output_fps(25, 30).unwrap_err().is_input_validation());
    }

    #[test]
    fn test_ensure_inputs_reports_missing_file() {
        assert!(matches!(ensure_inputs(&request(30)), Err(MediaError::FileNotFound(_))));
    }
}
