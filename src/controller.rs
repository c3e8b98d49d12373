// SPDX-License-Identifier: MIT

//! The tracking controller state machine.
//!
//! Decides when the device tracks location, under which profile
//! (idle/active), when to force an immediate fix, and how to react to
//! auth/session changes. All vendor SDK access goes through the
//! [`SdkAdapter`]; every failure is caught and logged, and the controller
//! degrades to "try again on next relevant event" rather than crashing.
//!
//! Policy: tracking must be stopped whenever no valid (token, session user)
//! pair is available. While unauthenticated the controller issues no SDK
//! call other than `ready()` (a vendor call-ordering requirement) and the
//! one-time logout sequence itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{self, Settings};
use crate::models::{ControllerState, Fix, TrackingProfile};
use crate::retry::retry_with_backoff;
use crate::sdk::adapter::{EventHandlers, SdkAdapter};
use crate::sdk::{LocationSdk, PositionOptions};
use crate::stores::{AlertStore, SessionStore};

/// Persisted-fix accuracy gate in meters. Accuracy exactly at the gate is
/// accepted; coarser readings are logged and the persisted record treated as
/// ignorable, but the flow is never blocked.
pub const PERSISTED_FIX_GATE_M: f64 = 100.0;

/// UI accuracy gate in meters. Fixes coarser than this are not published on
/// the location channel; exactly at the gate is accepted.
pub const UI_FIX_GATE_M: f64 = 200.0;

/// Minimum spacing between moving-edge forced fixes.
pub const MOVING_EDGE_COOLDOWN: Duration = Duration::from_secs(5 * 60);

const SYNC_MAX_ATTEMPTS: u32 = 3;
const SYNC_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Accuracy requested for a user-switch forced fix.
const FORCED_FIX_ACCURACY_M: f64 = 10.0;
/// Accuracy requested for a moving-edge forced fix.
const MOVING_EDGE_FIX_ACCURACY_M: f64 = 50.0;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Why a forced fix + sync sequence ran (tracing tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncReason {
    UserSwitch,
    MovingEdge,
}

impl SyncReason {
    fn as_str(&self) -> &'static str {
        match self {
            SyncReason::UserSwitch => "user-switch",
            SyncReason::MovingEdge => "moving-edge",
        }
    }
}

/// Controller-owned mirror of auth/profile state.
///
/// These flags are the source of truth for controller decisions even when
/// they transiently disagree with native state; `get_state` reconciles
/// before start/stop.
struct Inner {
    state: ControllerState,
    auth_ready: bool,
    /// Bumped on every auth/deauth; multi-step sequences re-check it after
    /// each await so a logout mid-flight stops the sequence from committing.
    epoch: u64,
    /// Last externally supplied token; cleared only by an explicit
    /// `handle_auth_token(None)`.
    token: Option<String>,
    current_profile: Option<TrackingProfile>,
    /// Survives logout so a login by a different user forces a fresh fix.
    last_session_user_id: Option<String>,
    last_moving_edge: Option<Instant>,
    /// Latched once the logout sequence has run; re-evaluation while already
    /// unauthenticated then issues no SDK calls at all.
    halted: bool,
    tasks: Vec<JoinHandle<()>>,
}

/// Background-location tracking controller.
///
/// Construct with [`TrackingController::new`], then `init` to subscribe to
/// the session/alert stores. Auth tokens arrive via `handle_auth_token`.
pub struct TrackingController<S> {
    instance_id: u64,
    adapter: Arc<SdkAdapter<S>>,
    session: SessionStore,
    alerts: AlertStore,
    settings: Settings,
    inner: Mutex<Inner>,
    location_tx: watch::Sender<Option<Fix>>,
}

impl<S: LocationSdk> TrackingController<S> {
    pub fn new(
        adapter: Arc<SdkAdapter<S>>,
        session: SessionStore,
        alerts: AlertStore,
        settings: Settings,
    ) -> Arc<Self> {
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        let (location_tx, _rx) = watch::channel(None);
        Arc::new(Self {
            instance_id,
            adapter,
            session,
            alerts,
            settings,
            inner: Mutex::new(Inner {
                state: ControllerState::Unauthenticated,
                auth_ready: false,
                epoch: 0,
                token: None,
                current_profile: None,
                last_session_user_id: None,
                last_moving_edge: None,
                halted: false,
                tasks: Vec::new(),
            }),
            location_tx,
        })
    }

    /// Subscribe to the session/alert stores and run the initial evaluation.
    ///
    /// The initial evaluation satisfies the vendor's ready-before-anything
    /// rule and leaves uploads disabled until credentials arrive.
    pub async fn init(self: &Arc<Self>) {
        let mut tasks = Vec::new();

        {
            let weak = Arc::downgrade(self);
            let mut rx = self.session.subscribe();
            tasks.push(tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let Some(ctrl) = weak.upgrade() else { break };
                    let token = ctrl.inner.lock().await.token.clone();
                    ctrl.handle_auth_token(token).await;
                }
            }));
        }

        {
            let weak = Arc::downgrade(self);
            let mut rx = self.alerts.subscribe();
            tasks.push(tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let Some(ctrl) = weak.upgrade() else { break };
                    ctrl.reevaluate_profile().await;
                }
            }));
        }

        self.inner.lock().await.tasks = tasks;
        tracing::info!(instance = self.instance_id, "Tracking controller initialized");

        let token = self.inner.lock().await.token.clone();
        self.handle_auth_token(token).await;
    }

    /// Tear down store subscriptions and the event dispatch pipeline.
    pub async fn destroy(&self) {
        let tasks = {
            let mut inner = self.inner.lock().await;
            std::mem::take(&mut inner.tasks)
        };
        for task in tasks {
            task.abort();
        }
        self.adapter.shutdown_events();
        tracing::info!(instance = self.instance_id, "Tracking controller destroyed");
    }

    /// React to an externally supplied auth token (or its loss).
    pub async fn handle_auth_token(self: &Arc<Self>, token: Option<String>) {
        let session_user = self.session.get().user_id;
        match (token, session_user) {
            (Some(token), Some(user_id)) => self.authenticate(token, user_id).await,
            (token, _) => {
                // Token without a session user (or no token at all): stay
                // unauthenticated, but remember the token so a later session
                // change can complete the pair.
                self.inner.lock().await.token = token;
                self.deauthenticate().await;
            }
        }
    }

    /// Latest accepted fix for UI consumption.
    pub fn location_updates(&self) -> watch::Receiver<Option<Fix>> {
        self.location_tx.subscribe()
    }

    pub async fn state(&self) -> ControllerState {
        self.inner.lock().await.state
    }

    pub async fn current_profile(&self) -> Option<TrackingProfile> {
        self.inner.lock().await.current_profile
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    // ─── Auth transitions ────────────────────────────────────────────────

    async fn authenticate(self: &Arc<Self>, token: String, user_id: String) {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if inner.auth_ready
                && inner.token.as_deref() == Some(token.as_str())
                && inner.last_session_user_id.as_deref() == Some(user_id.as_str())
            {
                // Already set up for this identity; only the profile can
                // have drifted.
                drop(inner);
                self.reevaluate_profile().await;
                return;
            }
            inner.token = Some(token.clone());
            inner.state = ControllerState::Authenticating;
            // The SDK is about to be touched again, so the next logout must
            // run the full halt sequence.
            inner.halted = false;
            inner.epoch += 1;
            inner.epoch
        };
        tracing::info!(
            instance = self.instance_id,
            user = %user_id,
            "Authenticating tracking session"
        );

        if let Err(e) = self.adapter.ensure_ready(&config::base_config()).await {
            tracing::warn!(
                instance = self.instance_id,
                error = %e,
                "SDK ready failed, will retry on next trigger"
            );
            self.abort_authentication(epoch).await;
            return;
        }
        if self.superseded(epoch).await {
            return;
        }

        let upload = config::upload_patch(&self.settings.sync_url, &token);
        if let Err(e) = self.adapter.set_config(&upload).await {
            tracing::warn!(error = %e, "Failed to apply upload config");
            self.abort_authentication(epoch).await;
            return;
        }
        // The upload patch may have landed after a concurrent logout's halt;
        // `superseded` re-disables it in that case.
        if self.superseded(epoch).await {
            return;
        }

        self.register_event_handlers();

        // Reconcile with native state before starting.
        match self.adapter.get_state().await {
            Ok(state) if !state.enabled => {
                if let Err(e) = self.adapter.start().await {
                    tracing::warn!(error = %e, "SDK start failed");
                    self.abort_authentication(epoch).await;
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "get_state failed before start"),
        }

        let committed = {
            let mut inner = self.inner.lock().await;
            if inner.epoch == epoch {
                inner.auth_ready = true;
                let switched = inner.last_session_user_id.as_deref() != Some(user_id.as_str());
                inner.last_session_user_id = Some(user_id.clone());
                Some(switched)
            } else {
                None
            }
        };
        let user_switched = match committed {
            Some(switched) => switched,
            None => {
                // A newer auth/deauth won the race after start(); undo any
                // tracking this sequence enabled.
                self.superseded(epoch).await;
                return;
            }
        };

        if user_switched {
            tracing::info!(user = %user_id, "Session identity changed, forcing fresh fix");
            self.forced_fix_and_sync(SyncReason::UserSwitch).await;
        }

        let desired = self.desired_profile(&user_id);
        self.apply_profile(desired).await;
    }

    async fn abort_authentication(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.epoch == epoch && inner.state == ControllerState::Authenticating {
            inner.state = ControllerState::Unauthenticated;
        }
    }

    /// True if a newer auth/deauth has superseded `epoch`.
    ///
    /// When the winner was a logout, the call this sequence just completed
    /// may have landed after the logout's halt and re-enabled uploads or
    /// tracking, so the halt is run again. A newer login owns the SDK and is
    /// left alone.
    async fn superseded(&self, epoch: u64) -> bool {
        let halt_needed = {
            let inner = self.inner.lock().await;
            if inner.epoch == epoch {
                return false;
            }
            !inner.auth_ready && inner.state == ControllerState::Unauthenticated
        };
        if halt_needed {
            tracing::info!(
                instance = self.instance_id,
                "Login superseded by logout mid-flight, stopping tracking"
            );
            self.halt_sdk().await;
        }
        true
    }

    async fn deauthenticate(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.auth_ready = false;
            inner.current_profile = None;
            inner.state = ControllerState::Unauthenticated;
            if inner.halted {
                // Logout sequence already ran; nothing to do.
                return;
            }
            inner.halted = true;
        }
        tracing::info!(instance = self.instance_id, "No valid session, stopping tracking");
        self.halt_sdk().await;
    }

    /// Stop native tracking and cut uploads. Safe to run more than once:
    /// every step tolerates an earlier halt having already done its part.
    async fn halt_sdk(&self) {
        // Events must stop reaching the UI even if the SDK calls below fail.
        self.adapter.clear_event_handlers();

        // Vendor constraint: no API calls before ready(). The base config
        // keeps uploads disabled, so this never enables tracking.
        if let Err(e) = self.adapter.ensure_ready(&config::base_config()).await {
            tracing::warn!(error = %e, "SDK ready failed during logout");
            return;
        }

        // Disable uploads before stopping so no record leaves after logout.
        if let Err(e) = self.adapter.set_config(&config::upload_disabled_patch()).await {
            tracing::warn!(error = %e, "Failed to disable uploads");
        }

        match self.adapter.get_state().await {
            Ok(state) if state.enabled => {
                if let Err(e) = self.adapter.stop().await {
                    tracing::warn!(error = %e, "SDK stop failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "get_state failed during logout"),
        }
    }

    // ─── Profile transitions ─────────────────────────────────────────────

    fn desired_profile(&self, user_id: &str) -> TrackingProfile {
        if self.alerts.get().has_open_alert(user_id) {
            TrackingProfile::Active
        } else {
            TrackingProfile::Idle
        }
    }

    /// Recompute the desired profile from alert state and apply it.
    pub async fn reevaluate_profile(&self) {
        let user_id = {
            let inner = self.inner.lock().await;
            if !inner.auth_ready {
                return;
            }
            match inner.last_session_user_id.clone() {
                Some(u) => u,
                None => return,
            }
        };
        let desired = self.desired_profile(&user_id);
        self.apply_profile(desired).await;
    }

    /// Apply a tracking profile. Idempotent: reapplying the current profile
    /// performs only a drift check, no `set_config`.
    pub async fn apply_profile(&self, profile: TrackingProfile) {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if !inner.auth_ready {
                tracing::debug!(%profile, "Ignoring profile apply while unauthenticated");
                return;
            }
            if inner.current_profile == Some(profile) {
                drop(inner);
                self.reconcile_running_state().await;
                return;
            }
            inner.current_profile = Some(profile);
            inner.state = ControllerState::Tracking(profile);
            inner.epoch
        };
        tracing::info!(instance = self.instance_id, %profile, "Applying tracking profile");

        if let Err(e) = self.adapter.set_config(&config::profile_patch(profile)).await {
            tracing::warn!(error = %e, %profile, "Profile config failed, will retry on next trigger");
            let mut inner = self.inner.lock().await;
            if inner.epoch == epoch && inner.current_profile == Some(profile) {
                inner.current_profile = None;
            }
            return;
        }

        match profile {
            TrackingProfile::Active => self.enter_active().await,
            TrackingProfile::Idle => self.enter_idle().await,
        }
    }

    /// Same profile reapplied: only verify native tracking didn't drop.
    async fn reconcile_running_state(&self) {
        match self.adapter.get_state().await {
            Ok(state) if !state.enabled => {
                tracing::warn!(
                    instance = self.instance_id,
                    "Native tracking disabled under an applied profile, restarting"
                );
                if let Err(e) = self.adapter.start().await {
                    tracing::warn!(error = %e, "Restart after drift failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "get_state failed during drift check"),
        }
    }

    async fn enter_active(&self) {
        match self.adapter.get_state().await {
            Ok(state) if !state.is_moving => {
                if let Err(e) = self.adapter.change_pace(true).await {
                    tracing::warn!(error = %e, "change_pace(true) failed");
                }
                // One immediate fix; the accuracy gate logs but never
                // blocks the transition.
                self.request_persisted_fix(FORCED_FIX_ACCURACY_M, "active-entry")
                    .await;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "get_state failed entering active"),
        }
    }

    async fn enter_idle(&self) {
        match self.adapter.get_state().await {
            Ok(state) if state.is_moving => {
                if let Err(e) = self.adapter.change_pace(false).await {
                    tracing::warn!(error = %e, "change_pace(false) failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "get_state failed entering idle"),
        }
    }

    // ─── Forced fixes and sync ───────────────────────────────────────────

    async fn request_persisted_fix(&self, desired_accuracy_m: f64, context: &str) -> Option<Fix> {
        let options = PositionOptions {
            persist: true,
            samples: 3,
            desired_accuracy_m,
            timeout_secs: 30,
        };
        match self.adapter.get_current_position(&options).await {
            Ok(fix) => {
                if fix.coords.accuracy > PERSISTED_FIX_GATE_M {
                    tracing::warn!(
                        accuracy = fix.coords.accuracy,
                        context,
                        "Forced fix coarser than persisted gate, record ignorable"
                    );
                }
                Some(fix)
            }
            Err(e) => {
                tracing::warn!(error = %e, context, "Forced fix failed");
                None
            }
        }
    }

    async fn forced_fix_and_sync(&self, reason: SyncReason) {
        let accuracy = match reason {
            SyncReason::UserSwitch => FORCED_FIX_ACCURACY_M,
            SyncReason::MovingEdge => MOVING_EDGE_FIX_ACCURACY_M,
        };
        self.request_persisted_fix(accuracy, reason.as_str()).await;

        // Logout mid-flight: nothing further once auth_ready flipped.
        if !self.inner.lock().await.auth_ready {
            return;
        }
        self.sync_with_retry(reason).await;
    }

    /// Flush the persisted queue with up to three linearly backed-off
    /// attempts. Never propagates errors; returns success.
    async fn sync_with_retry(&self, reason: SyncReason) -> bool {
        let result = retry_with_backoff(SYNC_MAX_ATTEMPTS, SYNC_BACKOFF_BASE, |attempt| {
            let adapter = Arc::clone(&self.adapter);
            let reason = reason.as_str();
            async move {
                let pending = match adapter.get_count().await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(error = %e, "get_count failed before sync");
                        0
                    }
                };
                tracing::debug!(reason, attempt, pending, "Sync attempt");
                adapter.sync().await
            }
        })
        .await;

        match result {
            Ok(flushed) => {
                tracing::info!(reason = reason.as_str(), flushed, "Sync complete");
                true
            }
            Err(e) => {
                tracing::warn!(
                    reason = reason.as_str(),
                    error = %e,
                    attempts = SYNC_MAX_ATTEMPTS,
                    "Sync exhausted all attempts"
                );
                false
            }
        }
    }

    // ─── Events ──────────────────────────────────────────────────────────

    fn register_event_handlers(self: &Arc<Self>) {
        let signature = format!("tracking-controller-{}", self.instance_id);
        let weak_location = Arc::downgrade(self);
        let weak_motion = Arc::downgrade(self);
        let handlers = EventHandlers {
            on_location: Some(Box::new(move |fix| {
                if let Some(ctrl) = weak_location.upgrade() {
                    ctrl.on_location(fix);
                }
            })),
            on_location_error: Some(Box::new(|reason| {
                tracing::warn!(%reason, "Location error event");
            })),
            on_http: Some(Box::new(|status, success| {
                tracing::debug!(status, success, "Upload result event");
            })),
            on_motion_change: Some(Box::new(move |is_moving, _location| {
                if let Some(ctrl) = weak_motion.upgrade() {
                    tokio::spawn(async move {
                        ctrl.on_motion_change(is_moving).await;
                    });
                }
            })),
            on_provider_change: Some(Box::new(|status| {
                tracing::info!(?status, "Provider change event");
            })),
        };
        self.adapter.set_event_handlers(&signature, handlers);
    }

    /// Publish an accepted fix to the UI location channel.
    fn on_location(&self, fix: Fix) {
        if fix.coords.accuracy > UI_FIX_GATE_M {
            tracing::debug!(
                accuracy = fix.coords.accuracy,
                "Fix coarser than UI gate, not published"
            );
            return;
        }
        self.location_tx.send_replace(Some(fix));
    }

    /// Stationary→moving edge while active: one forced fix + sync, rate
    /// limited by the five-minute cooldown.
    async fn on_motion_change(self: Arc<Self>, is_moving: bool) {
        if !is_moving {
            return;
        }
        {
            let mut inner = self.inner.lock().await;
            if !inner.auth_ready || inner.current_profile != Some(TrackingProfile::Active) {
                return;
            }
            let now = Instant::now();
            if let Some(prev) = inner.last_moving_edge {
                if now.duration_since(prev) < MOVING_EDGE_COOLDOWN {
                    tracing::debug!(
                        instance = self.instance_id,
                        "Moving edge within cooldown, skipping forced fix"
                    );
                    return;
                }
            }
            inner.last_moving_edge = Some(now);
        }
        self.forced_fix_and_sync(SyncReason::MovingEdge).await;
    }
}
