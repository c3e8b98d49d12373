// SPDX-License-Identifier: MIT

//! Aegis-Tracker: background-location orchestration for proximity alerts
//!
//! This crate coordinates a vendor background-geolocation SDK for a safety
//! application: it decides when tracking runs, which profile (idle/active)
//! applies, when to force an immediate fix, and how buffered records are
//! synced. The vendor SDK, push delivery, and UI are external collaborators
//! consumed only through their interfaces.

pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod retry;
pub mod sdk;
pub mod stores;

pub use config::Settings;
pub use controller::TrackingController;
pub use error::{Result, TrackerError};
pub use models::{ControllerState, Fix, TrackingProfile};
pub use sdk::adapter::SdkAdapter;
pub use sdk::LocationSdk;
pub use stores::{AlertStore, SessionStore};
