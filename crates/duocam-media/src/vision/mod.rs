//! Frame analysis used to pick a camera.

pub mod field_mask;
pub mod flow;
pub mod motion;

pub use field_mask::{mask_field, FieldMaskConfig};
#[cfg(not(feature = "opencv"))]
pub use flow::block_matching_flow;
pub use flow::{action_hotspot, dense_flow, player_mask, FlowConfig, FlowField};
pub use motion::{absolute_difference_flow, motion_score, prepare_frame};
