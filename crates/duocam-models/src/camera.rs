//! Camera side definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two cameras recording the match.
///
/// Camera A is the "left" camera and the reference timeline: offsets are
/// expressed relative to it and user start/end times are read from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Camera {
    /// Left camera (history value 0)
    #[default]
    A,
    /// Right camera (history value 1)
    B,
}

impl Camera {
    /// Value stored in the flow history for this camera.
    pub fn history_value(&self) -> u8 {
        match self {
            Camera::A => 0,
            Camera::B => 1,
        }
    }

    /// Camera for a history value; anything non-zero maps to B.
    pub fn from_history_value(value: u8) -> Self {
        if value == 0 {
            Camera::A
        } else {
            Camera::B
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Camera::A => "a",
            Camera::B => "b",
        }
    }

    /// The other camera.
    pub fn other(&self) -> Self {
        match self {
            Camera::A => Camera::B,
            Camera::B => Camera::A,
        }
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
