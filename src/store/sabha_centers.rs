use reqwest::Method;
use std::sync::Arc;
use tracing::info;

use super::base::{after_write, ListCache, StoreState};
use crate::client::{ApiClient, ApiError};
use crate::models::{NewSabhaCenter, SabhaCenter};

pub const SABHA_CENTERS_PATH: &str = "/api/sabha_centers/";

/// The chapter list. Not scoped by the chapter selection.
pub struct SabhaCenterStore {
    api: Arc<ApiClient>,
    cache: ListCache<SabhaCenter>,
}

impl SabhaCenterStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            cache: ListCache::new("sabha centers"),
        }
    }

    pub async fn snapshot(&self) -> StoreState<SabhaCenter> {
        self.cache.snapshot().await
    }

    pub async fn fetch(&self) -> Result<Vec<SabhaCenter>, ApiError> {
        self.cache
            .load(self.api.get_json(SABHA_CENTERS_PATH, &[]))
            .await
    }

    /// Create a chapter and reload the list.
    ///
    /// An error means the backend did not accept the write. Once it has, the
    /// outcome of the reload is only reflected in [`snapshot`](Self::snapshot).
    pub async fn create(&self, center: &NewSabhaCenter) -> Result<(), ApiError> {
        info!("Creating sabha center '{}'", center.name);
        self.api
            .send_json(Method::POST, SABHA_CENTERS_PATH, center)
            .await?;
        after_write("sabha center", self.fetch().await);
        Ok(())
    }

    pub async fn update(&self, id: i64, center: &NewSabhaCenter) -> Result<(), ApiError> {
        info!("Updating sabha center {}", id);
        self.api
            .send_json(Method::PUT, &item_path(id), center)
            .await?;
        after_write("sabha center", self.fetch().await);
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        info!("Deleting sabha center {}", id);
        self.api.delete(&item_path(id)).await?;
        after_write("sabha center deletion", self.fetch().await);
        Ok(())
    }
}

fn item_path(id: i64) -> String {
    format!("{}{}", SABHA_CENTERS_PATH, id)
}
