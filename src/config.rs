//! Runtime settings and native SDK configuration payloads.
//!
//! The config builder is deliberately pure: given the same inputs it always
//! produces the same merged payload, and the invariant fields (heartbeat off,
//! single persisted record, POST to the `location` root property) survive any
//! profile delta applied on top.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::models::TrackingProfile;

/// Distance filter while idle (meters between accepted fixes).
pub const IDLE_DISTANCE_FILTER_M: f64 = 200.0;
/// Distance filter while the user has an open alert.
pub const ACTIVE_DISTANCE_FILTER_M: f64 = 10.0;
/// Delay before motion-triggered tracking kicks in while idle.
pub const IDLE_MOTION_TRIGGER_DELAY_MS: u64 = 30_000;
/// No motion-trigger delay when an alert is open.
pub const ACTIVE_MOTION_TRIGGER_DELAY_MS: u64 = 0;

const HTTP_METHOD: &str = "POST";
const HTTP_ROOT_PROPERTY: &str = "location";

/// Runtime settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Upload endpoint for location records (native SDK's HTTP sink).
    pub sync_url: String,
}

impl Default for Settings {
    /// Default settings for testing only.
    fn default() -> Self {
        Self {
            sync_url: "https://sync.test.invalid/v1/location".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            sync_url: env::var("AEGIS_SYNC_URL").map_err(|_| ConfigError::Missing("AEGIS_SYNC_URL"))?,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

/// HTTP upload block of the native SDK configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Upload URL; empty string means uploads are disabled.
    pub url: String,
    pub method: String,
    /// JSON property the SDK nests each record under.
    pub root_property: String,
    /// Whether the SDK flushes its queue automatically after each fix.
    pub auto_sync: bool,
    /// Request headers (bearer auth lands here).
    pub headers: HashMap<String, String>,
}

/// Full configuration payload handed to the native SDK's `ready()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Requested positioning accuracy in meters.
    pub desired_accuracy_m: f64,
    pub distance_filter_m: f64,
    /// Whether the SDK halts tracking when the device goes stationary.
    pub stop_on_stationary: bool,
    /// Platform significant-location-changes mode (coarse, battery-friendly).
    pub use_significant_changes_only: bool,
    pub motion_trigger_delay_ms: u64,
    /// Periodic heartbeat interval in seconds; 0 disables it.
    pub heartbeat_interval_secs: u32,
    /// Cap on the SDK's persisted record queue.
    pub max_records_to_persist: i32,
    pub http: HttpConfig,
}

impl TrackingConfig {
    /// Apply a partial config on top of `self`, returning the merged payload.
    pub fn apply(&self, patch: &ConfigPatch) -> TrackingConfig {
        let mut merged = self.clone();
        if let Some(v) = patch.desired_accuracy_m {
            merged.desired_accuracy_m = v;
        }
        if let Some(v) = patch.distance_filter_m {
            merged.distance_filter_m = v;
        }
        if let Some(v) = patch.stop_on_stationary {
            merged.stop_on_stationary = v;
        }
        if let Some(v) = patch.use_significant_changes_only {
            merged.use_significant_changes_only = v;
        }
        if let Some(v) = patch.motion_trigger_delay_ms {
            merged.motion_trigger_delay_ms = v;
        }
        if let Some(v) = patch.heartbeat_interval_secs {
            merged.heartbeat_interval_secs = v;
        }
        if let Some(v) = patch.max_records_to_persist {
            merged.max_records_to_persist = v;
        }
        if let Some(http) = &patch.http {
            if let Some(v) = &http.url {
                merged.http.url = v.clone();
            }
            if let Some(v) = &http.method {
                merged.http.method = v.clone();
            }
            if let Some(v) = &http.root_property {
                merged.http.root_property = v.clone();
            }
            if let Some(v) = http.auto_sync {
                merged.http.auto_sync = v;
            }
            if let Some(v) = &http.headers {
                merged.http.headers = v.clone();
            }
        }
        merged
    }
}

/// Partial HTTP config for `set_config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpPatch {
    pub url: Option<String>,
    pub method: Option<String>,
    pub root_property: Option<String>,
    pub auto_sync: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
}

/// Partial configuration for the native SDK's `set_config`.
///
/// `None` fields are left untouched by the SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub desired_accuracy_m: Option<f64>,
    pub distance_filter_m: Option<f64>,
    pub stop_on_stationary: Option<bool>,
    pub use_significant_changes_only: Option<bool>,
    pub motion_trigger_delay_ms: Option<u64>,
    pub heartbeat_interval_secs: Option<u32>,
    pub max_records_to_persist: Option<i32>,
    pub http: Option<HttpPatch>,
}

impl ConfigPatch {
    /// Merge `other` on top of `self`; `other` wins on overlapping fields.
    pub fn merge(&self, other: &ConfigPatch) -> ConfigPatch {
        ConfigPatch {
            desired_accuracy_m: other.desired_accuracy_m.or(self.desired_accuracy_m),
            distance_filter_m: other.distance_filter_m.or(self.distance_filter_m),
            stop_on_stationary: other.stop_on_stationary.or(self.stop_on_stationary),
            use_significant_changes_only: other
                .use_significant_changes_only
                .or(self.use_significant_changes_only),
            motion_trigger_delay_ms: other
                .motion_trigger_delay_ms
                .or(self.motion_trigger_delay_ms),
            heartbeat_interval_secs: other
                .heartbeat_interval_secs
                .or(self.heartbeat_interval_secs),
            max_records_to_persist: other.max_records_to_persist.or(self.max_records_to_persist),
            http: match (&self.http, &other.http) {
                (Some(a), Some(b)) => Some(HttpPatch {
                    url: b.url.clone().or_else(|| a.url.clone()),
                    method: b.method.clone().or_else(|| a.method.clone()),
                    root_property: b.root_property.clone().or_else(|| a.root_property.clone()),
                    auto_sync: b.auto_sync.or(a.auto_sync),
                    headers: b.headers.clone().or_else(|| a.headers.clone()),
                }),
                (a, b) => b.clone().or_else(|| a.clone()),
            },
        }
    }

    /// True if the patch would turn automatic uploads on.
    pub fn enables_auto_sync(&self) -> bool {
        self.http
            .as_ref()
            .map(|h| h.auto_sync == Some(true))
            .unwrap_or(false)
    }
}

/// Base configuration: idle-profile defaults with uploads disabled.
///
/// This is what `ready()` receives; upload and profile patches are layered on
/// afterwards once credentials are known.
pub fn base_config() -> TrackingConfig {
    TrackingConfig {
        desired_accuracy_m: 10.0,
        distance_filter_m: IDLE_DISTANCE_FILTER_M,
        stop_on_stationary: true,
        use_significant_changes_only: true,
        motion_trigger_delay_ms: IDLE_MOTION_TRIGGER_DELAY_MS,
        heartbeat_interval_secs: 0,
        max_records_to_persist: 1,
        http: HttpConfig {
            url: String::new(),
            method: HTTP_METHOD.to_string(),
            root_property: HTTP_ROOT_PROPERTY.to_string(),
            auto_sync: false,
            headers: HashMap::new(),
        },
    }
    .apply(&invariant_overrides())
}

/// Fields that must never drift across app restarts or profile changes.
pub fn invariant_overrides() -> ConfigPatch {
    ConfigPatch {
        heartbeat_interval_secs: Some(0),
        max_records_to_persist: Some(1),
        http: Some(HttpPatch {
            method: Some(HTTP_METHOD.to_string()),
            root_property: Some(HTTP_ROOT_PROPERTY.to_string()),
            ..HttpPatch::default()
        }),
        ..ConfigPatch::default()
    }
}

/// Profile-specific delta (idle vs active), before invariants.
fn profile_delta(profile: TrackingProfile) -> ConfigPatch {
    match profile {
        TrackingProfile::Idle => ConfigPatch {
            distance_filter_m: Some(IDLE_DISTANCE_FILTER_M),
            stop_on_stationary: Some(true),
            use_significant_changes_only: Some(true),
            motion_trigger_delay_ms: Some(IDLE_MOTION_TRIGGER_DELAY_MS),
            ..ConfigPatch::default()
        },
        TrackingProfile::Active => ConfigPatch {
            distance_filter_m: Some(ACTIVE_DISTANCE_FILTER_M),
            stop_on_stationary: Some(false),
            use_significant_changes_only: Some(false),
            motion_trigger_delay_ms: Some(ACTIVE_MOTION_TRIGGER_DELAY_MS),
            ..ConfigPatch::default()
        },
    }
}

/// Full patch applied on a profile transition.
///
/// Invariants are merged last so a profile delta can never shadow them.
pub fn profile_patch(profile: TrackingProfile) -> ConfigPatch {
    profile_delta(profile).merge(&invariant_overrides())
}

/// Patch enabling uploads for an authenticated session.
pub fn upload_patch(sync_url: &str, token: &str) -> ConfigPatch {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    ConfigPatch {
        http: Some(HttpPatch {
            url: Some(sync_url.to_string()),
            auto_sync: Some(true),
            headers: Some(headers),
            ..HttpPatch::default()
        }),
        ..ConfigPatch::default()
    }
    .merge(&invariant_overrides())
}

/// Patch disabling uploads, issued before the SDK is stopped on logout.
pub fn upload_disabled_patch() -> ConfigPatch {
    ConfigPatch {
        http: Some(HttpPatch {
            url: Some(String::new()),
            auto_sync: Some(false),
            headers: Some(HashMap::new()),
            ..HttpPatch::default()
        }),
        ..ConfigPatch::default()
    }
    .merge(&invariant_overrides())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_config_invariants() {
        let config = base_config();
        assert_eq!(config.heartbeat_interval_secs, 0);
        assert_eq!(config.max_records_to_persist, 1);
        assert_eq!(config.http.method, "POST");
        assert_eq!(config.http.root_property, "location");
        assert!(!config.http.auto_sync);
        assert!(config.http.url.is_empty());
    }

    #[test]
    fn test_profile_patch_preserves_invariants() {
        // Regardless of requested profile, the invariant fields survive.
        for profile in [TrackingProfile::Idle, TrackingProfile::Active] {
            let patch = profile_patch(profile);
            assert_eq!(patch.heartbeat_interval_secs, Some(0), "{}", profile);
            assert_eq!(patch.max_records_to_persist, Some(1), "{}", profile);
            let http = patch.http.expect("http block present");
            assert_eq!(http.method.as_deref(), Some("POST"));
            assert_eq!(http.root_property.as_deref(), Some("location"));
        }
    }

    #[test]
    fn test_invariants_survive_hostile_delta() {
        // A delta trying to re-enable the heartbeat loses to invariants.
        let hostile = ConfigPatch {
            heartbeat_interval_secs: Some(60),
            max_records_to_persist: Some(500),
            ..ConfigPatch::default()
        };
        let merged = hostile.merge(&invariant_overrides());
        assert_eq!(merged.heartbeat_interval_secs, Some(0));
        assert_eq!(merged.max_records_to_persist, Some(1));
    }

    #[test]
    fn test_profile_deltas_differ() {
        let idle = profile_patch(TrackingProfile::Idle);
        let active = profile_patch(TrackingProfile::Active);
        assert_eq!(idle.distance_filter_m, Some(IDLE_DISTANCE_FILTER_M));
        assert_eq!(active.distance_filter_m, Some(ACTIVE_DISTANCE_FILTER_M));
        assert_eq!(idle.stop_on_stationary, Some(true));
        assert_eq!(active.stop_on_stationary, Some(false));
        assert_eq!(idle.use_significant_changes_only, Some(true));
        assert_eq!(active.use_significant_changes_only, Some(false));
    }

    #[test]
    fn test_apply_is_pure_merge() {
        let base = base_config();
        let patched = base.apply(&profile_patch(TrackingProfile::Active));
        // Original untouched, merged carries the delta plus invariants.
        assert_eq!(base.distance_filter_m, IDLE_DISTANCE_FILTER_M);
        assert_eq!(patched.distance_filter_m, ACTIVE_DISTANCE_FILTER_M);
        assert_eq!(patched.heartbeat_interval_secs, 0);
        assert_eq!(patched.max_records_to_persist, 1);
    }

    #[test]
    fn test_upload_patch_sets_bearer_and_auto_sync() {
        let patch = upload_patch("https://sync.example/v1/location", "tok-123");
        assert!(patch.enables_auto_sync());
        let http = patch.http.expect("http block present");
        assert_eq!(http.url.as_deref(), Some("https://sync.example/v1/location"));
        let headers = http.headers.expect("headers present");
        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Bearer tok-123")
        );
    }

    #[test]
    fn test_upload_disabled_patch() {
        let patch = upload_disabled_patch();
        assert!(!patch.enables_auto_sync());
        let http = patch.http.expect("http block present");
        assert_eq!(http.url.as_deref(), Some(""));
        assert_eq!(http.auto_sync, Some(false));
        assert_eq!(http.headers, Some(HashMap::new()));
    }

    #[test]
    fn test_settings_default_for_tests() {
        let settings = Settings::default();
        assert!(settings.sync_url.starts_with("https://"));
    }

    #[test]
    fn test_settings_from_env() {
        env::set_var("AEGIS_SYNC_URL", "https://sync.example/v1/location");

        let settings = Settings::from_env().expect("Settings should load");

        assert_eq!(settings.sync_url, "https://sync.example/v1/location");
    }
}
