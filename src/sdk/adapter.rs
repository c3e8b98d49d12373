// SPDX-License-Identifier: MIT

//! Adapter owning all calls into the vendor SDK.
//!
//! Two responsibilities beyond pass-through:
//! - `ensure_ready` memoizes the vendor `ready()` call as a shared future so
//!   concurrent callers ride the same call; a rejection clears the memo so
//!   the next caller retries instead of being pinned to a dead promise.
//! - Event handler registration is de-duplicated by signature, so repeated
//!   identical registration is a no-op and only one dispatch task exists.

use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigPatch, TrackingConfig};
use crate::error::{Result, TrackerError};
use crate::models::Fix;
use crate::sdk::{LocationSdk, PositionOptions, ProviderStatus, SdkEvent, SdkState};

type ReadyFuture = Shared<BoxFuture<'static, std::result::Result<SdkState, Arc<TrackerError>>>>;

/// Callbacks invoked from the event dispatch task.
///
/// Callbacks run on the dispatch task and must not block; anything slow is
/// expected to spawn.
#[derive(Default)]
pub struct EventHandlers {
    pub on_location: Option<Box<dyn Fn(Fix) + Send + Sync>>,
    pub on_location_error: Option<Box<dyn Fn(String) + Send + Sync>>,
    pub on_http: Option<Box<dyn Fn(u16, bool) + Send + Sync>>,
    pub on_motion_change: Option<Box<dyn Fn(bool, Option<Fix>) + Send + Sync>>,
    pub on_provider_change: Option<Box<dyn Fn(ProviderStatus) + Send + Sync>>,
}

impl EventHandlers {
    fn dispatch(&self, event: SdkEvent) {
        match event {
            SdkEvent::Location(fix) => {
                if let Some(h) = &self.on_location {
                    h(fix);
                }
            }
            SdkEvent::LocationError(reason) => {
                if let Some(h) = &self.on_location_error {
                    h(reason);
                }
            }
            SdkEvent::Http { status, success } => {
                if let Some(h) = &self.on_http {
                    h(status, success);
                }
            }
            SdkEvent::MotionChange { is_moving, location } => {
                if let Some(h) = &self.on_motion_change {
                    h(is_moving, location);
                }
            }
            SdkEvent::ProviderChange(status) => {
                if let Some(h) = &self.on_provider_change {
                    h(status);
                }
            }
        }
    }
}

/// The sole caller of vendor SDK lifecycle functions.
pub struct SdkAdapter<S> {
    sdk: Arc<S>,
    ready_memo: Mutex<Option<ReadyFuture>>,
    handlers: Arc<Mutex<Option<EventHandlers>>>,
    handler_signature: Mutex<Option<String>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: LocationSdk> SdkAdapter<S> {
    pub fn new(sdk: Arc<S>) -> Self {
        Self {
            sdk,
            ready_memo: Mutex::new(None),
            handlers: Arc::new(Mutex::new(None)),
            handler_signature: Mutex::new(None),
            dispatch_task: Mutex::new(None),
        }
    }

    /// Call the vendor `ready()` exactly once, sharing the in-flight call
    /// across concurrent callers. A failure clears the memo so the next
    /// caller retries.
    pub async fn ensure_ready(&self, config: &TrackingConfig) -> Result<SdkState> {
        let fut = {
            let mut memo = self.ready_memo.lock().expect("ready memo lock");
            match memo.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let sdk = Arc::clone(&self.sdk);
                    let config = config.clone();
                    let fut: ReadyFuture = async move {
                        sdk.ready(&config).await.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *memo = Some(fut.clone());
                    fut
                }
            }
        };

        match fut.clone().await {
            Ok(state) => Ok(state),
            Err(e) => {
                // Only clear the memo if it still holds the future that
                // failed; a fresh attempt may already be in flight.
                let mut memo = self.ready_memo.lock().expect("ready memo lock");
                if memo.as_ref().is_some_and(|m| Shared::ptr_eq(m, &fut)) {
                    *memo = None;
                }
                Err(TrackerError::Sdk(format!("ready() rejected: {}", e)))
            }
        }
    }

    /// Register event handlers, de-duplicated by `signature`.
    ///
    /// Returns `true` if the handlers were installed, `false` when the same
    /// signature was already registered (no-op).
    pub fn set_event_handlers(&self, signature: &str, handlers: EventHandlers) -> bool {
        {
            let mut current = self.handler_signature.lock().expect("signature lock");
            if current.as_deref() == Some(signature) {
                tracing::debug!(signature, "Event handlers already registered");
                return false;
            }
            *current = Some(signature.to_string());
        }
        *self.handlers.lock().expect("handlers lock") = Some(handlers);
        self.ensure_dispatch_task();
        tracing::debug!(signature, "Event handlers registered");
        true
    }

    /// Drop the installed handlers; subsequent events are ignored.
    pub fn clear_event_handlers(&self) {
        *self.handlers.lock().expect("handlers lock") = None;
        *self.handler_signature.lock().expect("signature lock") = None;
        tracing::debug!("Event handlers cleared");
    }

    /// Stop the dispatch task. Called on controller teardown.
    pub fn shutdown_events(&self) {
        self.clear_event_handlers();
        if let Some(task) = self.dispatch_task.lock().expect("dispatch lock").take() {
            task.abort();
        }
    }

    fn ensure_dispatch_task(&self) {
        let mut slot = self.dispatch_task.lock().expect("dispatch lock");
        if slot.is_some() {
            return;
        }
        let mut rx = self.sdk.events();
        let handlers = Arc::clone(&self.handlers);
        *slot = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(h) = handlers.lock().expect("handlers lock").as_ref() {
                            h.dispatch(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event dispatch lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    // ─── Pass-throughs ───────────────────────────────────────────────────

    pub async fn set_config(&self, patch: &ConfigPatch) -> Result<()> {
        self.sdk.set_config(patch).await
    }

    pub async fn start(&self) -> Result<SdkState> {
        self.sdk.start().await
    }

    pub async fn stop(&self) -> Result<SdkState> {
        self.sdk.stop().await
    }

    pub async fn get_state(&self) -> Result<SdkState> {
        self.sdk.get_state().await
    }

    pub async fn get_current_position(&self, options: &PositionOptions) -> Result<Fix> {
        self.sdk.get_current_position(options).await
    }

    pub async fn change_pace(&self, is_moving: bool) -> Result<()> {
        self.sdk.change_pace(is_moving).await
    }

    pub async fn sync(&self) -> Result<usize> {
        self.sdk.sync().await
    }

    pub async fn get_count(&self) -> Result<usize> {
        self.sdk.get_count().await
    }
}
