//! Single-flight token refresh for 401 responses
//!
//! The first 401 for a refresh key starts a refresh in a background task and
//! queues its request; later 401s for the same key join the queue. When the
//! refresh settles the queue is drained in arrival order: every request is
//! replayed on success, or rejected with the refresh error on failure.
//! Consecutive failed refreshes are counted and, once the limit is reached,
//! further 401s sign the user out without attempting another refresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use iot_console_common::constants::MAX_REFRESH_ATTEMPTS;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::engine::RequestEngine;
use crate::error::{ClientError, Result};
use crate::interceptor::Interceptor;
use crate::request::RequestConfig;

/// Lock key used when the refresh token itself is not visible to the client
pub const DEFAULT_REFRESH_KEY: &str = "session";

/// Obtains a new session
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Key of the refresh token currently in use
    fn key(&self) -> String {
        DEFAULT_REFRESH_KEY.to_string()
    }

    async fn refresh(&self) -> Result<()>;
}

/// Ends the session after an unrecoverable refresh failure
#[async_trait]
pub trait SignOut: Send + Sync {
    async fn sign_out(&self);
}

struct Pending {
    endpoint: String,
    config: RequestConfig,
    reply: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: HashMap<String, Vec<Pending>>,
    retry_count: u32,
}

enum Admission {
    Exhausted,
    Queued,
    Started,
}

/// `on_error` interceptor that refreshes the session once per key and replays
/// the requests that failed with 401 in the meantime
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    sign_out: Arc<dyn SignOut>,
    max_attempts: u32,
    state: Arc<Mutex<CoordinatorState>>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>, sign_out: Arc<dyn SignOut>) -> Self {
        Self {
            refresher,
            sign_out,
            max_attempts: MAX_REFRESH_ATTEMPTS,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        }
    }

    /// Consecutive refresh attempts since the last success
    pub async fn retry_count(&self) -> u32 {
        self.state.lock().await.retry_count
    }

    /// Requests waiting on the in-flight refresh for `key`
    pub async fn pending(&self, key: &str) -> usize {
        self.state
            .lock()
            .await
            .in_flight
            .get(key)
            .map_or(0, Vec::len)
    }

    pub async fn is_refreshing(&self, key: &str) -> bool {
        self.state.lock().await.in_flight.contains_key(key)
    }

    async fn admit(&self, key: &str, pending: Pending) -> Admission {
        let mut state = self.state.lock().await;

        if state.retry_count >= self.max_attempts {
            return Admission::Exhausted;
        }

        if let Some(queue) = state.in_flight.get_mut(key) {
            queue.push(pending);
            return Admission::Queued;
        }

        state.in_flight.insert(key.to_string(), vec![pending]);
        state.retry_count += 1;
        info!(
            "Refreshing session (attempt {}/{})",
            state.retry_count, self.max_attempts
        );
        Admission::Started
    }

    fn spawn_refresh(&self, engine: RequestEngine, key: String) {
        let refresher = self.refresher.clone();
        let sign_out = self.sign_out.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            let outcome = refresher.refresh().await;

            let queue = {
                let mut state = state.lock().await;
                if outcome.is_ok() {
                    state.retry_count = 0;
                }
                state.in_flight.remove(&key).unwrap_or_default()
            };

            match outcome {
                Ok(()) => {
                    debug!("Session refreshed, replaying {} request(s)", queue.len());
                    for pending in queue {
                        let engine = engine.clone();
                        tokio::spawn(async move {
                            let result = engine.request(&pending.endpoint, pending.config).await;
                            let _ = pending.reply.send(result);
                        });
                    }
                }
                Err(e) => {
                    warn!("Session refresh failed: {}", e);
                    sign_out.sign_out().await;

                    let error = match e {
                        ClientError::RefreshFailed(_) => e,
                        other => ClientError::RefreshFailed(other.to_string()),
                    };
                    for pending in queue {
                        let _ = pending.reply.send(Err(error.clone()));
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Interceptor for RefreshCoordinator {
    async fn on_error(&self, engine: &RequestEngine, error: ClientError) -> Result<Value> {
        let replay = error
            .http()
            .filter(|_| error.is_unauthorized())
            .map(|http| (http.endpoint.clone(), http.config.clone()));
        let Some((endpoint, config)) = replay else {
            return Err(error);
        };

        let cancel = config.cancel.clone();
        let key = self.refresher.key();
        let (reply, receiver) = oneshot::channel();
        let pending = Pending {
            endpoint,
            config,
            reply,
        };

        match self.admit(&key, pending).await {
            Admission::Exhausted => {
                warn!("Max refresh attempts exceeded, signing out");
                self.sign_out.sign_out().await;
                return Err(ClientError::RefreshExhausted);
            }
            Admission::Queued => debug!("Refresh in flight for key, request queued"),
            Admission::Started => self.spawn_refresh(engine.clone(), key),
        }

        let outcome = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Aborted),
                outcome = receiver => outcome,
            },
            None => receiver.await,
        };

        outcome.unwrap_or_else(|_| {
            Err(ClientError::RefreshFailed(
                "refresh task ended without a result".to_string(),
            ))
        })
    }
}

/// Refreshes by calling the console's refresh route
///
/// The session lives in HttpOnly cookies, so the request carries no body; the
/// HTTP client's cookie store sends the current session and stores the new one.
pub struct HttpRefresher {
    engine: RequestEngine,
    endpoint: String,
}

impl HttpRefresher {
    pub fn new(engine: RequestEngine, endpoint: impl Into<String>) -> Self {
        Self {
            engine,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self) -> Result<()> {
        self.engine
            .dispatch(&self.endpoint, RequestConfig::new(Method::POST))
            .await
            .map(|_| ())
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))
    }
}

/// Signs out by calling the console's session-clearing route
pub struct HttpSignOut {
    engine: RequestEngine,
    endpoint: String,
}

impl HttpSignOut {
    pub fn new(engine: RequestEngine, endpoint: impl Into<String>) -> Self {
        Self {
            engine,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SignOut for HttpSignOut {
    async fn sign_out(&self) {
        if let Err(e) = self
            .engine
            .dispatch(&self.endpoint, RequestConfig::new(Method::POST))
            .await
        {
            warn!("Sign-out request failed: {}", e);
        }
    }
}
