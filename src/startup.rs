//! Application wiring.
//!
//! Builds the identity provider, session, token provider, request pipeline
//! and stores from the configuration, then resolves the initial session.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::ApiClient;
use crate::config::ConfigV1;
use crate::guard::ViewGuard;
use crate::metrics::Metrics;
use crate::providers::{create_identity_provider, IdentityProvider, TokenProvider};
use crate::session::{Navigator, SessionContext};
use crate::state::AppState;
use crate::store::{
    AttendanceStore, ChapterSelector, CurrentSabha, SabhaCenterStore, SabhaStore, YouthStore,
};

/// Build the application state for the configured identity provider.
pub fn build_state(
    config: Arc<ConfigV1>,
    navigator: Arc<dyn Navigator>,
) -> Result<AppState, String> {
    let timeout = Duration::from_millis(config.auth.timeout_in_ms);
    let provider = create_identity_provider(&config.identity, timeout)?;
    build_state_with_provider(config, provider, navigator)
}

/// Build the application state around an already constructed provider.
pub fn build_state_with_provider(
    config: Arc<ConfigV1>,
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
) -> Result<AppState, String> {
    info!(
        "Using identity provider '{}' of type '{}'",
        provider.get_name(),
        provider.get_type()
    );

    let timeout = Duration::from_millis(config.auth.timeout_in_ms);
    let metrics = Metrics::new();
    let session = Arc::new(SessionContext::new(provider.clone(), navigator, timeout));
    let tokens = Arc::new(TokenProvider::new(
        provider,
        chrono::Duration::seconds(config.auth.renew_skew_in_s),
        timeout,
    ));
    let api = Arc::new(
        ApiClient::new(&config.api, tokens.clone(), session.clone(), metrics.clone())
            .map_err(|e| format!("Could not create API client: {}", e))?,
    );

    Ok(AppState {
        config,
        guard: Arc::new(ViewGuard::new(session.clone())),
        session,
        tokens,
        metrics,
        selector: Arc::new(ChapterSelector::new()),
        current_sabha: Arc::new(CurrentSabha::new()),
        sabha_centers: Arc::new(SabhaCenterStore::new(api.clone())),
        sabhas: Arc::new(SabhaStore::new(api.clone())),
        youths: Arc::new(YouthStore::new(api.clone())),
        attendance: Arc::new(AttendanceStore::new(api.clone())),
        api,
    })
}

/// Start listening to identity events and settle the initial session.
///
/// The returned handle drives the event loop; dropping it leaves the loop
/// running until the provider closes its event stream.
pub async fn start(state: &AppState) -> JoinHandle<()> {
    let events = state.session.spawn_event_loop();
    state.session.initialize().await;
    let snapshot = state.session.snapshot();
    info!(
        "Session settled: authenticated={} roles={:?}",
        snapshot.is_authenticated(),
        snapshot.roles
    );
    events
}
