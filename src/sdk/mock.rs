// SPDX-License-Identifier: MIT

//! Scriptable in-memory SDK double.
//!
//! Records every call and lets tests script failures, fixes, and events.
//! Compiled unconditionally so integration tests under `tests/` can use it.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::config::{ConfigPatch, TrackingConfig};
use crate::error::{Result, TrackerError};
use crate::models::Fix;
use crate::sdk::{LocationSdk, PositionOptions, SdkEvent, SdkState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One recorded SDK call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Ready(TrackingConfig),
    SetConfig(ConfigPatch),
    Start,
    Stop,
    GetState,
    GetCurrentPosition(PositionOptions),
    ChangePace(bool),
    Sync,
    GetCount,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<MockCall>,
    state: SdkState,
    ready_failures: u32,
    set_config_failures: u32,
    sync_failures: u32,
    position_failures: u32,
    scripted_fixes: VecDeque<Fix>,
    pending_count: usize,
}

/// In-memory mock of the vendor SDK.
pub struct MockSdk {
    inner: Mutex<MockState>,
    events_tx: broadcast::Sender<SdkEvent>,
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSdk {
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(MockState {
                calls: Vec::new(),
                state: SdkState::default(),
                ready_failures: 0,
                set_config_failures: 0,
                sync_failures: 0,
                position_failures: 0,
                scripted_fixes: VecDeque::new(),
                pending_count: 0,
            }),
            events_tx,
        }
    }

    // ─── Scripting ───────────────────────────────────────────────────────

    /// Fail the next `n` `ready()` calls.
    pub fn fail_next_ready(&self, n: u32) {
        self.lock().ready_failures = n;
    }

    /// Fail the next `n` `set_config()` calls.
    pub fn fail_next_set_configs(&self, n: u32) {
        self.lock().set_config_failures = n;
    }

    /// Fail the next `n` `sync()` calls.
    pub fn fail_next_syncs(&self, n: u32) {
        self.lock().sync_failures = n;
    }

    /// Fail the next `n` `get_current_position()` calls.
    pub fn fail_next_positions(&self, n: u32) {
        self.lock().position_failures = n;
    }

    /// Queue a fix to be returned by `get_current_position`.
    pub fn push_fix(&self, fix: Fix) {
        self.lock().scripted_fixes.push_back(fix);
    }

    /// Set the persisted queue depth reported by `get_count`.
    pub fn set_pending_count(&self, n: usize) {
        self.lock().pending_count = n;
    }

    /// Override the native moving flag without emitting an event.
    pub fn set_moving(&self, is_moving: bool) {
        self.lock().state.is_moving = is_moving;
    }

    /// Override the native enabled flag without recording a call, as if the
    /// platform dropped tracking behind the controller's back.
    pub fn set_enabled(&self, enabled: bool) {
        self.lock().state.enabled = enabled;
    }

    /// Inject an event into the dispatch stream.
    pub fn emit(&self, event: SdkEvent) {
        // No receivers is fine: nothing registered yet.
        let _ = self.events_tx.send(event);
    }

    // ─── Inspection ──────────────────────────────────────────────────────

    /// Snapshot of all recorded calls, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Count calls matching a predicate.
    pub fn calls_matching(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// All `set_config` patches, in call order.
    pub fn set_config_patches(&self) -> Vec<ConfigPatch> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::SetConfig(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// All `get_current_position` option sets, in call order.
    pub fn position_requests(&self) -> Vec<PositionOptions> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::GetCurrentPosition(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    /// Current native state snapshot.
    pub fn native_state(&self) -> SdkState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().expect("mock state lock")
    }
}

impl LocationSdk for MockSdk {
    async fn ready(&self, config: &TrackingConfig) -> Result<SdkState> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::Ready(config.clone()));
        if inner.ready_failures > 0 {
            inner.ready_failures -= 1;
            return Err(TrackerError::Sdk("ready rejected (scripted)".to_string()));
        }
        Ok(inner.state)
    }

    async fn set_config(&self, patch: &ConfigPatch) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::SetConfig(patch.clone()));
        if inner.set_config_failures > 0 {
            inner.set_config_failures -= 1;
            return Err(TrackerError::Sdk(
                "set_config rejected (scripted)".to_string(),
            ));
        }
        Ok(())
    }

    async fn start(&self) -> Result<SdkState> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::Start);
        inner.state.enabled = true;
        Ok(inner.state)
    }

    async fn stop(&self) -> Result<SdkState> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::Stop);
        inner.state.enabled = false;
        inner.state.is_moving = false;
        Ok(inner.state)
    }

    async fn get_state(&self) -> Result<SdkState> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::GetState);
        Ok(inner.state)
    }

    async fn get_current_position(&self, options: &PositionOptions) -> Result<Fix> {
        let mut inner = self.lock();
        inner
            .calls
            .push(MockCall::GetCurrentPosition(options.clone()));
        if inner.position_failures > 0 {
            inner.position_failures -= 1;
            return Err(TrackerError::Position("no fix (scripted)".to_string()));
        }
        let fix = inner
            .scripted_fixes
            .pop_front()
            .unwrap_or_else(|| Fix::new(37.7749, -122.4194, 15.0));
        if options.persist {
            // The real SDK caps its queue via max_records_to_persist: 1.
            inner.pending_count = 1;
        }
        Ok(fix)
    }

    async fn change_pace(&self, is_moving: bool) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::ChangePace(is_moving));
        inner.state.is_moving = is_moving;
        Ok(())
    }

    async fn sync(&self) -> Result<usize> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::Sync);
        if inner.sync_failures > 0 {
            inner.sync_failures -= 1;
            return Err(TrackerError::Sdk("sync failed (scripted)".to_string()));
        }
        let flushed = inner.pending_count;
        inner.pending_count = 0;
        Ok(flushed)
    }

    async fn get_count(&self) -> Result<usize> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::GetCount);
        Ok(inner.pending_count)
    }

    fn events(&self) -> broadcast::Receiver<SdkEvent> {
        self.events_tx.subscribe()
    }
}
