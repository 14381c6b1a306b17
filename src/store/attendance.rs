use reqwest::Method;
use std::sync::Arc;
use tracing::info;

use super::base::{after_write, ListCache, StoreState};
use crate::client::{ApiClient, ApiError};
use crate::models::AttendanceRecord;

pub const ATTENDANCE_PATH: &str = "/api/attendance/";

/// Attendance of the event currently open for marking.
pub struct AttendanceStore {
    api: Arc<ApiClient>,
    cache: ListCache<AttendanceRecord>,
}

impl AttendanceStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            cache: ListCache::new("attendance"),
        }
    }

    pub async fn snapshot(&self) -> StoreState<AttendanceRecord> {
        self.cache.snapshot().await
    }

    pub async fn fetch(&self, sabha_id: i64) -> Result<Vec<AttendanceRecord>, ApiError> {
        let path = format!("{}{}", ATTENDANCE_PATH, sabha_id);
        self.cache.load(self.api.get_json(&path, &[])).await
    }

    /// Submit marks for one event and reload what the backend now holds.
    /// Returns an error only when the marks were not accepted.
    pub async fn record(
        &self,
        sabha_id: i64,
        records: &[AttendanceRecord],
    ) -> Result<(), ApiError> {
        if let Some(other) = records.iter().find(|r| r.sabha_id != sabha_id) {
            return Err(ApiError::InvalidRequest(format!(
                "attendance for sabha {} submitted with sabha {}",
                other.sabha_id, sabha_id
            )));
        }
        info!(
            "Recording {} attendance marks for sabha {}",
            records.len(),
            sabha_id
        );
        self.api
            .send_json(Method::POST, ATTENDANCE_PATH, records)
            .await?;
        after_write("attendance", self.fetch(sabha_id).await);
        Ok(())
    }
}
