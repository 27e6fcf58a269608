//! Scripted transport for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::auth::lock;

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

pub(crate) struct FakeTransport {
    handler: Option<Handler>,
    delays: Mutex<Vec<(String, Duration)>>,
    unreachable: Mutex<Vec<String>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    /// Answer every request with `handler`
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Some(Box::new(handler)),
            delays: Mutex::new(Vec::new()),
            unreachable: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request fails without a response
    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            handler: None,
            delays: Mutex::new(Vec::new()),
            unreachable: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Hold responses for `path` back by `delay`
    pub fn with_delay(self: Arc<Self>, path: &str, delay: Duration) -> Arc<Self> {
        lock(&self.delays).push((path.to_string(), delay));
        self
    }

    /// Toggle a network outage for `path` only
    pub fn set_unreachable(&self, path: &str, down: bool) {
        let mut unreachable = lock(&self.unreachable);
        unreachable.retain(|p| p != path);
        if down {
            unreachable.push(path.to_string());
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        lock(&self.requests).push(request.clone());

        let delay = lock(&self.delays)
            .iter()
            .find(|(path, _)| *path == request.path)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.unreachable).contains(&request.path) {
            return Err(ApiError::Network("offline".to_string()));
        }

        match self.handler {
            Some(ref handler) => Ok(handler(&request)),
            None => Err(ApiError::Network("connection refused".to_string())),
        }
    }
}
