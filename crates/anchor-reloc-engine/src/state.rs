//! Caller-visible relocalization state and status text.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocalizationState {
    #[default]
    Idle,
    Searching,
    ImageTracking,
    FeatureMatching,
    Validating,
    Success,
    Failed,
}

impl RelocalizationState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, RelocalizationState::Success | RelocalizationState::Failed)
    }

    /// Whether detections are still consumed in this state.
    ///
    /// `Success` keeps accepting so that further packages can be placed.
    #[inline]
    pub fn accepts_detections(self) -> bool {
        !matches!(self, RelocalizationState::Idle | RelocalizationState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelocalizationState::Idle => "idle",
            RelocalizationState::Searching => "searching",
            RelocalizationState::ImageTracking => "imageTracking",
            RelocalizationState::FeatureMatching => "featureMatching",
            RelocalizationState::Validating => "validating",
            RelocalizationState::Success => "success",
            RelocalizationState::Failed => "failed",
        }
    }
}

impl fmt::Display for RelocalizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State, status string and start time of one attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    state: RelocalizationState,
    status: String,
    started_at_s: Option<f64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            state: RelocalizationState::Idle,
            status: "Relocalization idle".to_owned(),
            started_at_s: None,
        }
    }
}

impl SessionState {
    #[inline]
    pub fn state(&self) -> RelocalizationState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    #[inline]
    pub fn started_at_s(&self) -> Option<f64> {
        self.started_at_s
    }

    /// Begin a new attempt at `now_s`.
    pub fn begin(&mut self, now_s: f64, state: RelocalizationState, status: impl Into<String>) -> Option<RelocalizationState> {
        self.started_at_s = Some(now_s);
        self.set(state, status)
    }

    /// Move to `state`. Returns the previous state if it changed.
    pub fn set(&mut self, state: RelocalizationState, status: impl Into<String>) -> Option<RelocalizationState> {
        self.status = status.into();
        if self.state == state {
            return None;
        }
        debug!("relocalization {} -> {}: {}", self.state, state, self.status);
        let prev = self.state;
        self.state = state;
        Some(prev)
    }

    /// True once `timeout_s` has elapsed since `begin`.
    pub fn timed_out(&self, now_s: f64, timeout_s: f64) -> bool {
        self.started_at_s
            .is_some_and(|start| now_s - start >= timeout_s)
    }

    pub fn reset(&mut self) -> Option<RelocalizationState> {
        self.started_at_s = None;
        self.set(RelocalizationState::Idle, "Relocalization idle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_previous_state_only_on_change() {
        let mut s = SessionState::default();
        assert_eq!(s.begin(1.0, RelocalizationState::Searching, "waiting"), Some(RelocalizationState::Idle));
        assert_eq!(s.set(RelocalizationState::Searching, "still waiting"), None);
        assert_eq!(s.status(), "still waiting");
        assert!(!s.timed_out(15.9, 15.0));
        assert!(s.timed_out(16.0, 15.0));
        s.reset();
        assert_eq!(s.state(), RelocalizationState::Idle);
        assert!(!s.timed_out(100.0, 15.0));
    }

    #[test]
    fn terminal_and_accepting_states() {
        assert!(RelocalizationState::Success.is_terminal());
        assert!(RelocalizationState::Failed.is_terminal());
        assert!(!RelocalizationState::Validating.is_terminal());
        assert!(RelocalizationState::Success.accepts_detections());
        assert!(!RelocalizationState::Failed.accepts_detections());
        assert!(!RelocalizationState::Idle.accepts_detections());
    }
}
