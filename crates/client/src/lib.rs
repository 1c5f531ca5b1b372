//! HTTP request engine for the IoT console
//!
//! [`RequestEngine`] issues timed requests through a chain of [`Interceptor`]s
//! and turns non-2xx responses into structured [`HttpError`]s.
//! [`RefreshCoordinator`] is the interceptor that recovers from expired
//! sessions: one refresh per key, queued replays, forced sign-out after
//! repeated failures.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod interceptor;
pub mod request;

pub use coordinator::{
    DEFAULT_REFRESH_KEY, HttpRefresher, HttpSignOut, RefreshCoordinator, SignOut, TokenRefresher,
};
pub use engine::{EngineBuilder, RequestEngine};
pub use error::{ClientError, HttpError, Result};
pub use interceptor::{BearerAuth, Interceptor};
pub use request::{FormData, RequestBody, RequestConfig};

pub use tokio_util::sync::CancellationToken;
