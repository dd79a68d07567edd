use anchor_reloc_core::CaptureType;
use serde::{Deserialize, Serialize};

/// Score thresholds that trigger automatic reference photos.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCaptureThresholds {
    pub floor_far: u8,
    pub floor_close: u8,
    pub walls: u8,
}

impl Default for AutoCaptureThresholds {
    fn default() -> Self {
        Self {
            floor_far: 70,
            floor_close: 80,
            walls: 85,
        }
    }
}

/// One automatic capture step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoCaptureTrigger {
    FloorFar,
    FloorClose,
    Walls,
}

impl AutoCaptureTrigger {
    pub fn capture_types(self) -> &'static [CaptureType] {
        match self {
            AutoCaptureTrigger::FloorFar => &[CaptureType::FloorFar],
            AutoCaptureTrigger::FloorClose => &[CaptureType::FloorClose],
            AutoCaptureTrigger::Walls => &CaptureType::WALLS,
        }
    }
}

/// Fires each threshold at most once per capture session.
#[derive(Clone, Debug, Default)]
pub struct AutoCaptureSchedule {
    thresholds: AutoCaptureThresholds,
    fired: [bool; 3],
}

impl AutoCaptureSchedule {
    pub fn new(thresholds: AutoCaptureThresholds) -> Self {
        Self {
            thresholds,
            fired: [false; 3],
        }
    }

    /// Triggers newly reached by `score`, in threshold order.
    pub fn due(&mut self, score: u8) -> Vec<AutoCaptureTrigger> {
        let steps = [
            (AutoCaptureTrigger::FloorFar, self.thresholds.floor_far),
            (AutoCaptureTrigger::FloorClose, self.thresholds.floor_close),
            (AutoCaptureTrigger::Walls, self.thresholds.walls),
        ];
        let mut out = Vec::new();
        for (i, (trigger, threshold)) in steps.into_iter().enumerate() {
            if !self.fired[i] && score >= threshold {
                self.fired[i] = true;
                out.push(trigger);
            }
        }
        out
    }

    pub fn has_fired(&self, trigger: AutoCaptureTrigger) -> bool {
        match trigger {
            AutoCaptureTrigger::FloorFar => self.fired[0],
            AutoCaptureTrigger::FloorClose => self.fired[1],
            AutoCaptureTrigger::Walls => self.fired[2],
        }
    }
}
