// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use aegis_tracker::config::Settings;
use aegis_tracker::models::{Alert, SessionState};
use aegis_tracker::sdk::adapter::SdkAdapter;
use aegis_tracker::sdk::mock::MockSdk;
use aegis_tracker::stores::{AlertStore, SessionStore};
use aegis_tracker::TrackingController;

/// Mock-backed controller plus the stores feeding it.
pub struct Harness {
    pub sdk: Arc<MockSdk>,
    pub controller: Arc<TrackingController<MockSdk>>,
    pub session: SessionStore,
    pub alerts: AlertStore,
}

/// Route controller tracing into the test output, filtered by `RUST_LOG`.
/// Repeated calls are no-ops.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a controller over a fresh mock SDK and subscribe it to the stores.
#[allow(dead_code)]
pub async fn harness() -> Harness {
    init_tracing();
    let sdk = Arc::new(MockSdk::new());
    let adapter = Arc::new(SdkAdapter::new(Arc::clone(&sdk)));
    let session = SessionStore::default();
    let alerts = AlertStore::default();
    let controller = TrackingController::new(
        adapter,
        session.clone(),
        alerts.clone(),
        Settings::default(),
    );
    controller.init().await;
    Harness {
        sdk,
        controller,
        session,
        alerts,
    }
}

/// Let spawned controller tasks run to completion, including any sync
/// backoff sleeps. Assumes the test runs with a paused clock
/// (`start_paused = true`), where the sleep advances instantly.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Supply a token and a session user, then wait for the controller to react.
#[allow(dead_code)]
pub async fn login(h: &Harness, user_id: &str, token: &str) {
    h.controller.handle_auth_token(Some(token.to_string())).await;
    h.session.set(SessionState {
        user_id: Some(user_id.to_string()),
    });
    settle().await;
}

/// Drop the token and the session user, then wait for the controller.
#[allow(dead_code)]
pub async fn logout(h: &Harness) {
    h.controller.handle_auth_token(None).await;
    h.session.set(SessionState { user_id: None });
    settle().await;
}

/// An open alert raised by `user_id`.
#[allow(dead_code)]
pub fn open_alert(id: u64, user_id: &str) -> Alert {
    Alert {
        id,
        user_id: user_id.to_string(),
        open: true,
        created_at: chrono::Utc::now(),
    }
}
