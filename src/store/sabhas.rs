use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info};

use super::base::{after_write, ListCache, StoreState};
use super::selection::ChapterSelection;
use crate::client::{ApiClient, ApiError};
use crate::models::{NewSabha, Sabha};

pub const SABHAS_PATH: &str = "/api/sabhas/";

/// Events of the selected chapter.
pub struct SabhaStore {
    api: Arc<ApiClient>,
    cache: ListCache<Sabha>,
}

impl SabhaStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            cache: ListCache::new("sabhas"),
        }
    }

    pub async fn snapshot(&self) -> StoreState<Sabha> {
        self.cache.snapshot().await
    }

    /// Load the events of the selected chapter. With nothing selected the
    /// list is emptied and no request is sent.
    pub async fn fetch(&self, selection: ChapterSelection) -> Result<Vec<Sabha>, ApiError> {
        let Some(center) = selection.id() else {
            debug!("No sabha center selected, clearing sabhas");
            self.cache.clear().await;
            return Ok(Vec::new());
        };
        let query = [("sabha_center_id", center.to_string())];
        self.cache.load(self.api.get_json(SABHAS_PATH, &query)).await
    }

    /// Create an event and reload the list for `selection`. Only a rejected
    /// write is an error.
    pub async fn create(
        &self,
        sabha: &NewSabha,
        selection: ChapterSelection,
    ) -> Result<(), ApiError> {
        info!(
            "Creating sabha '{}' at center {}",
            sabha.topic, sabha.sabha_center_id
        );
        self.api.send_json(Method::POST, SABHAS_PATH, sabha).await?;
        after_write("sabha", self.fetch(selection).await);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::api_client;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn sabha_json(id: i64, center: i64) -> serde_json::Value {
        json!({
            "id": id,
            "topic": "Seva",
            "speaker_name": "K. Mehta",
            "date": "2026-03-01",
            "sabha_center_id": center,
        })
    }

    #[tokio::test]
    async fn fetch_is_scoped_to_the_selected_center() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/sabhas/")
            .match_query(Matcher::UrlEncoded("sabha_center_id".into(), "4".into()))
            .with_header("content-type", "application/json")
            .with_body(json!([sabha_json(1, 4), sabha_json(2, 4)]).to_string())
            .create_async()
            .await;

        let store = SabhaStore::new(api_client(server.url()));
        let sabhas = store.fetch(ChapterSelection::of(4)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(sabhas.len(), 2);
        assert!(sabhas.iter().all(|s| s.sabha_center_id == 4));
    }

    #[tokio::test]
    async fn no_selection_sends_nothing() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("GET", "/api/sabhas/")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(json!([sabha_json(1, 4)]).to_string())
            .expect(1)
            .create_async()
            .await;

        let store = SabhaStore::new(api_client(server.url()));
        store.fetch(ChapterSelection::of(4)).await.unwrap();
        let sabhas = store.fetch(ChapterSelection::none()).await.unwrap();

        ok.assert_async().await;
        assert!(sabhas.is_empty());
        let state = store.snapshot().await;
        assert!(state.items.is_empty());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn create_reloads_the_selected_center() {
        let mut server = Server::new_async().await;
        let post = server
            .mock("POST", "/api/sabhas/")
            .match_body(Matcher::PartialJson(json!({"sabha_center_id": 4})))
            .with_status(201)
            .create_async()
            .await;
        server
            .mock("GET", "/api/sabhas/")
            .match_query(Matcher::UrlEncoded("sabha_center_id".into(), "4".into()))
            .with_header("content-type", "application/json")
            .with_body(json!([sabha_json(9, 4)]).to_string())
            .create_async()
            .await;

        let store = SabhaStore::new(api_client(server.url()));
        let new = NewSabha {
            topic: "Seva".to_string(),
            speaker_name: "K. Mehta".to_string(),
            date: "2026-03-01".to_string(),
            sabha_center_id: 4,
        };
        store.create(&new, ChapterSelection::of(4)).await.unwrap();

        post.assert_async().await;
        assert_eq!(store.snapshot().await.items[0].id, 9);
    }
}
