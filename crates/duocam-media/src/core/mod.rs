//! Interfaces shared by the processing stages.

pub mod progress;

pub use progress::{
    channel as progress_channel, BandReporter, CallbackReporter, LogReporter, NoopReporter, ProgressCallback,
    ProgressReceiver, ProgressReporter, ProgressSender,
};
