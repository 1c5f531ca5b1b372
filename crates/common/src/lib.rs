//! Shared types for the IoT console
//!
//! This crate holds the pieces used by both the console server and its clients:
//! the cookie session codec, backend models, device credential validation and
//! small header/time helpers.

pub mod constants;
pub mod error;
pub mod models;
pub mod session;
pub mod utils;
pub mod validation;

pub use error::{ConsoleError, Result};
pub use session::{CookieJar, Session, SessionCodec, SetCookie};
pub use utils::{
    append_set_cookies, calculate_expiry, current_timestamp_secs, generate_id,
    set_cookie_lines,
};
