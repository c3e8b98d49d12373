// SPDX-License-Identifier: MIT

//! Session and alert state consumed from the external stores.
//!
//! These are read-only inputs to the controller; the stores themselves are
//! owned by the host application (auth layer, alert feed subscription).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current session identity, as published by the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Logged-in user id, `None` pre-auth / after logout.
    pub user_id: Option<String>,
}

/// A proximity alert as published by the alert store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    /// User who raised the alert.
    pub user_id: String,
    /// False once the alert has been resolved/closed.
    pub open: bool,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of currently alerting users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub alerting: Vec<Alert>,
}

impl AlertState {
    /// Does `user_id` have an open alert of their own?
    ///
    /// This is the single question that drives the idle/active profile.
    pub fn has_open_alert(&self, user_id: &str) -> bool {
        self.alerting.iter().any(|a| a.open && a.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(user_id: &str, open: bool) -> Alert {
        Alert {
            id: 1,
            user_id: user_id.to_string(),
            open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_has_open_alert_matches_user() {
        let state = AlertState {
            alerting: vec![alert("u1", true), alert("u2", true)],
        };
        assert!(state.has_open_alert("u1"));
        assert!(!state.has_open_alert("u3"));
    }

    #[test]
    fn test_closed_alert_does_not_count() {
        let state = AlertState {
            alerting: vec![alert("u1", false)],
        };
        assert!(!state.has_open_alert("u1"));
    }
}
