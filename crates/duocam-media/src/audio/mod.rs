//! Audio analysis: offset estimation, alignment and stereo mixing.

pub mod align;
pub mod mix;
pub mod signal;
pub mod sync;
pub mod wav;

pub use align::SyncWindow;
pub use mix::{apply_delay, mix_stereo, normalize_peak, overlay, sync_and_mix, MixRatio, StereoSignal, SyncMixResult};
pub use signal::AudioSignal;
pub use sync::{
    estimate, estimate_offset, estimate_offset_robust, resample, RobustSyncConfig, RobustSyncResult, SyncConfig,
    SyncOutcome, DEFAULT_COMPARE_SECONDS,
};
pub use wav::{read_mono, write_mono, write_stereo, WavEncoding};
