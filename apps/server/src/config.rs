//! Server configuration
//!
//! Command line arguments (with environment fallbacks) are parsed into [`Args`]
//! and converted into a plain [`Config`] that the rest of the server consumes.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use iot_console_common::constants::{COOKIE_CHUNK_SIZE, REQUEST_TIMEOUT_MS, SESSION_MAX_AGE_SECS};
use url::Url;

/// CLI arguments for the console server
#[derive(Parser, Debug)]
#[command(name = "console-server")]
#[command(about = "IoT console proxy server", long_about = None)]
#[command(version)]
pub struct Args {
    /// Backend base URL (the `/api` prefix is appended)
    #[arg(long, env = "CONSOLE_UPSTREAM_URL")]
    pub upstream_url: String,

    /// Secret used to sign session cookies
    #[arg(long, env = "CONSOLE_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Public URL of the console; `https://` enables secure cookies
    #[arg(long, env = "CONSOLE_PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,

    /// Address to listen on
    #[arg(long, env = "CONSOLE_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Largest session slice stored in one cookie
    #[arg(long, default_value_t = COOKIE_CHUNK_SIZE)]
    pub cookie_chunk_size: usize,

    /// Timeout for backend requests in milliseconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Session lifetime in seconds
    #[arg(long, default_value_t = SESSION_MAX_AGE_SECS)]
    pub session_max_age_secs: i64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend API base, e.g. `https://backend.example.com/api`
    pub upstream_url: String,

    pub session_secret: String,

    /// Serve session cookies with `Secure` and the `__Secure-` prefix
    pub secure_cookies: bool,

    pub bind: SocketAddr,

    pub cookie_chunk_size: usize,

    pub request_timeout: Duration,

    pub session_max_age_secs: i64,
}

impl Config {
    /// Configuration with defaults for everything but the backend and secret
    pub fn new(upstream_url: impl Into<String>, session_secret: impl Into<String>) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            session_secret: session_secret.into(),
            secure_cookies: false,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cookie_chunk_size: COOKIE_CHUNK_SIZE,
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            session_max_age_secs: SESSION_MAX_AGE_SECS,
        }
    }

    pub fn from_args(args: Args) -> Result<Self> {
        if args.session_secret.trim().is_empty() {
            bail!("CONSOLE_SESSION_SECRET must not be empty");
        }

        let public_url = Url::parse(&args.public_url)
            .with_context(|| format!("invalid public URL: {}", args.public_url))?;

        Ok(Self {
            upstream_url: api_base_url(&args.upstream_url)?,
            session_secret: args.session_secret,
            secure_cookies: public_url.scheme() == "https",
            bind: args.bind,
            cookie_chunk_size: args.cookie_chunk_size,
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            session_max_age_secs: args.session_max_age_secs,
        })
    }
}

/// Append `/api` to the backend URL unless it is already there
fn api_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).with_context(|| format!("invalid upstream URL: {}", raw))?;
    let base = url.as_str().trim_end_matches('/');
    if base.ends_with("/api") {
        Ok(base.to_string())
    } else {
        Ok(format!("{}/api", base))
    }
}
