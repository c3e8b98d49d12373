// SPDX-License-Identifier: MIT

//! Data models for the tracking subsystem.

pub mod fix;
pub mod profile;
pub mod session;

pub use fix::{Coords, Fix};
pub use profile::{ControllerState, TrackingProfile};
pub use session::{Alert, AlertState, SessionState};
