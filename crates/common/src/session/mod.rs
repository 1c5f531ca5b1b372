//! Session transport over cookies
//!
//! A [`Session`] is signed into a token by [`SessionCodec`] and written as one
//! cookie, or as several ordered chunk cookies when the token is too large for a
//! single one.

mod claims;
mod codec;
mod cookie;

pub use claims::Session;
pub use codec::SessionCodec;
pub use cookie::{CookieJar, SetCookie};
