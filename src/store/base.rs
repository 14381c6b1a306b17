use std::future::Future;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::ApiError;

/// What a view renders from a store: the last list, whether a fetch is in
/// flight, and the last failure message.
#[derive(Debug, Clone)]
pub struct StoreState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

struct Inner<T> {
    state: StoreState<T>,
    /// Incremented per fetch; only the latest fetch may write its result.
    generation: u64,
}

/// In-memory cache of the last server response for one entity list.
pub struct ListCache<T> {
    name: &'static str,
    inner: RwLock<Inner<T>>,
}

impl<T: Clone> ListCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: RwLock::new(Inner {
                state: StoreState::default(),
                generation: 0,
            }),
        }
    }

    pub async fn snapshot(&self) -> StoreState<T> {
        self.inner.read().await.state.clone()
    }

    /// Empty the list without contacting the backend (e.g. nothing selected).
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.generation += 1;
        inner.state = StoreState::default();
    }

    /// Run `fetch` and cache its result. On failure the list is emptied and
    /// the message kept for display; the error is returned as well.
    ///
    /// A response that arrives after a newer fetch (or clear) started is dropped.
    pub async fn load<F>(&self, fetch: F) -> Result<Vec<T>, ApiError>
    where
        F: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let generation = {
            let mut inner = self.inner.write().await;
            inner.generation += 1;
            inner.state.loading = true;
            inner.state.error = None;
            inner.generation
        };

        let result = fetch.await;

        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            debug!("Dropping stale {} response", self.name);
            return result;
        }
        inner.state.loading = false;
        match &result {
            Ok(items) => inner.state.items = items.clone(),
            Err(e) => {
                warn!("Fetching {} failed: {}", self.name, e);
                inner.state.items.clear();
                inner.state.error = Some(e.to_string());
            }
        }
        result
    }
}

/// Settle a write the backend accepted. A failed reload stays visible in the
/// store's `error` and is not reported as a failed write.
pub(crate) fn after_write<T>(name: &str, reload: Result<Vec<T>, ApiError>) {
    if let Err(e) = reload {
        warn!("Saved {}, but reloading the list failed: {}", name, e);
    }
}
