use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::error::ApiError;
use crate::config::ApiConfig;
use crate::metrics::{Metrics, MetricsRecorder};
use crate::models::Credential;
use crate::providers::TokenSource;
use crate::session::SessionContext;

/// Starts a fresh interactive login when credentials cannot be recovered.
#[async_trait::async_trait]
pub trait ReauthTrigger: Send + Sync {
    async fn reauthenticate(&self);
}

#[async_trait::async_trait]
impl ReauthTrigger for SessionContext {
    async fn reauthenticate(&self) {
        if !self.request_login().await {
            debug!("Re-authentication already underway or could not start");
        }
    }
}

/// HTTP client for the backend API that attaches bearer credentials and
/// recovers once from an authorization failure.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    reauth: Arc<dyn ReauthTrigger>,
    metrics: Metrics,
}

impl ApiClient {
    pub fn new(
        config: &ApiConfig,
        tokens: Arc<dyn TokenSource>,
        reauth: Arc<dyn ReauthTrigger>,
        metrics: Metrics,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_in_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            reauth,
            metrics,
        })
    }

    /// Absolute URL for an API path such as `/api/youths/`.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::InvalidRequest(format!("bad URL for '{}': {}", path, e)))
    }

    /// Build a request against the API, optionally with a JSON body.
    pub fn build<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Request, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.http.request(method, self.url(path)?);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Send a request through the pipeline.
    ///
    /// At most two network calls are made: the original one and, after a 401
    /// and a successful renewal, one replay. Only the final outcome is
    /// returned.
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        let method = request.method().to_string();
        let started = Instant::now();
        let result = self.execute_inner(request).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ApiError::Transport(_)) => "transport_error",
            Err(_) => "status_error",
        };
        self.metrics.record_request(&method, outcome);
        self.metrics
            .record_request_duration(&method, started.elapsed().as_secs_f64());
        result
    }

    async fn execute_inner(&self, request: Request) -> Result<Response, ApiError> {
        let replay = request.try_clone();
        let url = request.url().clone();

        let attached = self.tokens.get_token().await;
        if attached.is_none() {
            debug!("No credential available, sending {} unauthenticated", url);
        }
        let response = self.send(request, attached.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return finish(response).await;
        }

        let Some(replay) = replay else {
            warn!("Request to {} was rejected and cannot be replayed", url);
            return finish(response).await;
        };

        debug!("Request to {} was rejected, renewing credential", url);
        match self.tokens.renew_token(attached.as_ref()).await {
            Some(fresh) => {
                self.metrics.record_renewal("success");
                let retried = self.send(replay, Some(&fresh)).await?;
                finish(retried).await
            }
            None => {
                self.metrics.record_renewal("failure");
                info!("Credential renewal failed, starting a fresh login");
                let original = finish(response).await;
                self.reauth.reauthenticate().await;
                original
            }
        }
    }

    async fn send(
        &self,
        mut request: Request,
        credential: Option<&Credential>,
    ) -> Result<Response, ApiError> {
        if let Some(credential) = credential {
            let mut value = HeaderValue::from_str(&credential.bearer())
                .map_err(|e| ApiError::InvalidRequest(format!("unusable token: {}", e)))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(self.http.execute(request).await?)
    }

    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.build::<()>(Method::GET, path, query, None)?;
        decode(self.execute(request).await?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build(Method::POST, path, &[], Some(body))?;
        decode(self.execute(request).await?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build(Method::PUT, path, &[], Some(body))?;
        decode(self.execute(request).await?).await
    }

    /// Send a JSON body and ignore whatever the backend answers on success.
    pub async fn send_json<B>(&self, method: Method, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let request = self.build(method, path, &[], Some(body))?;
        self.execute(request).await.map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.build::<()>(Method::DELETE, path, &[], None)?;
        self.execute(request).await.map(|_| ())
    }
}

/// Turn non-success statuses into errors, keeping the body for display.
async fn finish(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}
