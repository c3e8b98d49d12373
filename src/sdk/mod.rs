// SPDX-License-Identifier: MIT

//! Native background-geolocation SDK boundary.
//!
//! The vendor SDK is consumed only through the [`LocationSdk`] trait; the
//! [`adapter::SdkAdapter`] is the sole caller of its lifecycle functions.
//! [`mock::MockSdk`] is the scriptable double used by the test suites.

pub mod adapter;
pub mod mock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::{ConfigPatch, TrackingConfig};
use crate::error::Result;
use crate::models::Fix;

/// Native-owned tracking state, read via `get_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkState {
    pub enabled: bool,
    pub is_moving: bool,
    pub tracking_mode: TrackingMode,
    pub scheduler_enabled: bool,
}

impl Default for SdkState {
    fn default() -> Self {
        Self {
            enabled: false,
            is_moving: false,
            tracking_mode: TrackingMode::Location,
            scheduler_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Location,
    Geofence,
}

/// Options for a one-shot `get_current_position` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOptions {
    /// Persist the fix into the SDK's upload queue.
    pub persist: bool,
    /// Number of samples the SDK may take before settling.
    pub samples: u32,
    /// Requested accuracy in meters.
    pub desired_accuracy_m: f64,
    pub timeout_secs: u32,
}

/// Location-provider availability, forwarded from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Authorized,
    Denied,
    Disabled,
}

/// Events emitted by the native SDK.
#[derive(Debug, Clone)]
pub enum SdkEvent {
    Location(Fix),
    LocationError(String),
    /// Result of an upload the SDK performed itself.
    Http { status: u16, success: bool },
    MotionChange { is_moving: bool, location: Option<Fix> },
    ProviderChange(ProviderStatus),
}

/// The vendor SDK surface consumed by this crate.
///
/// Vendor constraint: `ready` must complete before any other call.
pub trait LocationSdk: Send + Sync + 'static {
    fn ready(&self, config: &TrackingConfig) -> impl std::future::Future<Output = Result<SdkState>> + Send;
    fn set_config(&self, patch: &ConfigPatch) -> impl std::future::Future<Output = Result<()>> + Send;
    fn start(&self) -> impl std::future::Future<Output = Result<SdkState>> + Send;
    fn stop(&self) -> impl std::future::Future<Output = Result<SdkState>> + Send;
    fn get_state(&self) -> impl std::future::Future<Output = Result<SdkState>> + Send;
    fn get_current_position(
        &self,
        options: &PositionOptions,
    ) -> impl std::future::Future<Output = Result<Fix>> + Send;
    fn change_pace(&self, is_moving: bool) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Flush the persisted queue; returns the number of records uploaded.
    fn sync(&self) -> impl std::future::Future<Output = Result<usize>> + Send;
    /// Depth of the persisted queue.
    fn get_count(&self) -> impl std::future::Future<Output = Result<usize>> + Send;
    /// Subscribe to the SDK's event stream.
    fn events(&self) -> broadcast::Receiver<SdkEvent>;
}
