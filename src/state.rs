//! Shared application state.
//!
//! One instance is built at startup and handed to every view. All members
//! are process-wide singletons behind `Arc`.

use crate::client::ApiClient;
use crate::config::ConfigV1;
use crate::guard::ViewGuard;
use crate::metrics::Metrics;
use crate::providers::TokenProvider;
use crate::session::SessionContext;
use crate::store::{
    AttendanceStore, ChapterSelector, CurrentSabha, SabhaCenterStore, SabhaStore, YouthStore,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    pub session: Arc<SessionContext>,
    pub tokens: Arc<TokenProvider>,
    /// The authenticated request pipeline all stores share.
    pub api: Arc<ApiClient>,
    pub guard: Arc<ViewGuard>,
    pub metrics: Metrics,
    pub selector: Arc<ChapterSelector>,
    pub current_sabha: Arc<CurrentSabha>,
    pub sabha_centers: Arc<SabhaCenterStore>,
    pub sabhas: Arc<SabhaStore>,
    pub youths: Arc<YouthStore>,
    pub attendance: Arc<AttendanceStore>,
}
