use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one workflow run between resets, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing tag on classification issuances. An outcome is
/// applied only when its tag still equals the orchestrator's latest; anything
/// older is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next(self) -> RequestId {
        RequestId(self.0 + 1)
    }
}

/// Rectangular region of interest in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rectangle has positive area and lies fully inside an
    /// image of the given dimensions.
    pub fn is_within(&self, image_width: u32, image_height: u32) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let Some(right) = self.x.checked_add(self.width) else {
            return false;
        };
        let Some(bottom) = self.y.checked_add(self.height) else {
            return false;
        };
        right <= image_width && bottom <= image_height
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Where the workflow currently is. Strictly forward-moving except for the
/// universal reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AwaitingImage,
    AwaitingRegion,
    Processing,
    Done,
}

/// Activity flag on top of the step: whether a classification is in flight
/// and whether the current run has failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Status {
    Idle,
    Busy,
    Failed(crate::error::FailureReason),
}

/// Labeled outcome of classifying one region. Immutable value object; never
/// partially populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    pub description: String,
    pub recommendation: String,
    pub elapsed_ms: u64,
    pub classified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_containment_accepts_interior_rectangle() {
        assert!(Region::new(100, 100, 200, 200).is_within(1000, 800));
    }

    #[test]
    fn region_containment_rejects_rectangle_past_right_edge() {
        assert!(!Region::new(950, 100, 200, 200).is_within(1000, 800));
    }

    #[test]
    fn region_containment_accepts_exact_fit() {
        assert!(Region::new(0, 0, 1000, 800).is_within(1000, 800));
    }

    #[test]
    fn region_containment_rejects_zero_area() {
        assert!(!Region::new(10, 10, 0, 5).is_within(1000, 800));
        assert!(!Region::new(10, 10, 5, 0).is_within(1000, 800));
    }

    #[test]
    fn region_containment_survives_coordinate_overflow() {
        assert!(!Region::new(u32::MAX, 0, 1, 1).is_within(1000, 800));
        assert!(!Region::new(0, u32::MAX, 1, 1).is_within(1000, 800));
    }

    #[test]
    fn step_serializes_snake_case() {
        let json = serde_json::to_string(&Step::AwaitingRegion).expect("serialize");
        assert_eq!(json, "\"awaiting_region\"");
    }
}
