// SPDX-License-Identifier: MIT

//! Tracking profile and controller state.

use serde::{Deserialize, Serialize};

/// Which tracking profile the controller is running.
///
/// Never persisted: recomputed from session/alert state on every relevant
/// change. `Active` means the session user has an open alert of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingProfile {
    /// Coarse tracking: wide distance filter, stationary detection on.
    Idle,
    /// Tight tracking while the user has an open alert.
    Active,
}

impl std::fmt::Display for TrackingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingProfile::Idle => f.write_str("idle"),
            TrackingProfile::Active => f.write_str("active"),
        }
    }
}

/// Controller lifecycle state.
///
/// Reified as a single enum so an illegal move (e.g. applying a profile
/// while unauthenticated) is a visible branch, not a scattered boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No valid `(token, session user)` pair; tracking must be stopped.
    Unauthenticated,
    /// Valid credentials seen; SDK setup sequence in flight.
    Authenticating,
    /// SDK started and a profile applied.
    Tracking(TrackingProfile),
}

impl ControllerState {
    pub fn profile(&self) -> Option<TrackingProfile> {
        match self {
            ControllerState::Tracking(p) => Some(*p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_display() {
        assert_eq!(TrackingProfile::Idle.to_string(), "idle");
        assert_eq!(TrackingProfile::Active.to_string(), "active");
    }

    #[test]
    fn test_state_profile_accessor() {
        assert_eq!(ControllerState::Unauthenticated.profile(), None);
        assert_eq!(ControllerState::Authenticating.profile(), None);
        assert_eq!(
            ControllerState::Tracking(TrackingProfile::Active).profile(),
            Some(TrackingProfile::Active)
        );
    }
}
