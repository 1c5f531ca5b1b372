//! Single-flight table for session refreshes
//!
//! At most one refresh runs per refresh token. The refresh is spawned onto the
//! runtime, so it keeps going when the request that started it goes away, and
//! its entry is removed as soon as it settles. Requests arriving meanwhile join
//! the running refresh and receive the same outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

type SharedRefresh<T> = Shared<BoxFuture<'static, Option<T>>>;

/// How a caller got hold of a refresh
pub enum Lease<T: Clone> {
    /// Joined a refresh started by another request
    Joined(SharedRefresh<T>),
    /// Started a new refresh
    Started(SharedRefresh<T>),
}

impl<T: Clone> Lease<T> {
    pub fn is_joined(&self) -> bool {
        matches!(self, Lease::Joined(_))
    }

    /// Outcome of the refresh, `None` if the refresh task panicked
    pub async fn outcome(self) -> Option<T> {
        match self {
            Lease::Joined(shared) | Lease::Started(shared) => shared.await,
        }
    }
}

/// Refresh lock table keyed by refresh token
pub struct RefreshLocks<T> {
    locks: Arc<Mutex<HashMap<String, SharedRefresh<T>>>>,
}

impl<T> Clone for RefreshLocks<T> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<T> Default for RefreshLocks<T> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RefreshLocks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the refresh running for `key`, or start `refresh`
    ///
    /// Returns `None` when nothing is running and `cancel` has already fired:
    /// an aborted request may still join, but never starts a refresh. The
    /// lookup and the insert happen under one lock acquisition.
    pub async fn acquire<F>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        refresh: F,
    ) -> Option<Lease<T>>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut locks = self.locks.lock().await;

        if let Some(running) = locks.get(key) {
            debug!("Joining in-flight refresh");
            return Some(Lease::Joined(running.clone()));
        }

        if cancel.is_cancelled() {
            return None;
        }

        let table = self.locks.clone();
        let owned_key = key.to_string();
        let task = tokio::spawn(async move {
            let outcome = refresh.await;
            table.lock().await.remove(&owned_key);
            outcome
        });

        let shared = async move {
            task.await
                .map_err(|e| error!("Refresh task failed: {}", e))
                .ok()
        }
        .boxed()
        .shared();

        locks.insert(key.to_string(), shared.clone());
        Some(Lease::Started(shared))
    }

    pub async fn is_locked(&self, key: &str) -> bool {
        self.locks.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}
