// SPDX-License-Identifier: MIT

//! Geolocation fix types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coordinates of a single geolocation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters (smaller is better).
    pub accuracy: f64,
}

/// A single geolocation reading produced by the native SDK.
///
/// Ephemeral: the controller forwards accepted fixes to the UI location
/// channel; persistence (at most one record) is the SDK's own queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub coords: Coords,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    /// Build a fix stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            coords: Coords {
                latitude,
                longitude,
                accuracy,
            },
            timestamp: Utc::now(),
        }
    }
}
