//! Motion-driven mixing of two synchronized camera streams.

pub mod config;
pub mod history;
pub mod selector;

pub use config::MixerConfig;
pub use history::{DecisionRule, FlowHistory, MixState};
pub use selector::{ActionHotspotVoter, CameraMixer, FrameDifferenceVoter, MixStats, MotionVoter, MIXING_STEP};
