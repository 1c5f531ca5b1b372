use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use super::claims::{Session, SignedSession};
use super::cookie::{CookieJar, SetCookie};
use crate::constants::{
    COOKIE_CHUNK_SIZE, MIN_CLEARED_CHUNKS, SECURE_SESSION_COOKIE_NAME, SESSION_COOKIE_NAME,
    SESSION_MAX_AGE_SECS,
};
use crate::error::{ConsoleError, Result};
use crate::utils::{calculate_expiry, current_timestamp_secs, generate_id};

/// Encodes sessions into (possibly chunked) cookies and back
///
/// The session is signed as an HS256 JWT. Tokens longer than the chunk size are
/// split into `<base>.0`, `<base>.1`, ... cookies; shorter ones live in a single
/// `<base>` cookie.
#[derive(Clone)]
pub struct SessionCodec {
    secure: bool,
    chunk_size: usize,
    max_age_secs: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionCodec {
    pub fn new(secret: &[u8], secure: bool) -> Self {
        Self {
            secure,
            chunk_size: COOKIE_CHUNK_SIZE,
            max_age_secs: SESSION_MAX_AGE_SECS,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Override the chunk boundary (zero keeps the default)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn with_max_age(mut self, max_age_secs: i64) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Base cookie name for this deployment
    pub fn cookie_name(&self) -> &'static str {
        if self.secure {
            SECURE_SESSION_COOKIE_NAME
        } else {
            SESSION_COOKIE_NAME
        }
    }

    /// Sign a session into its token string
    pub fn sign(&self, session: &Session) -> Result<String> {
        let signed = SignedSession {
            session: session.clone(),
            iat: current_timestamp_secs(),
            exp: calculate_expiry(self.max_age_secs),
            jti: generate_id(),
        };

        encode(&Header::new(Algorithm::HS256), &signed, &self.encoding_key)
            .map_err(|e| ConsoleError::SessionEncode(e.to_string()))
    }

    /// Verify a token string and recover the session
    pub fn verify(&self, token: &str) -> Result<Session> {
        let data = decode::<SignedSession>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims.session)
    }

    /// Encode a session into its cookie chunk set
    pub fn encode(&self, session: &Session) -> Result<Vec<SetCookie>> {
        let token = self.sign(session)?;
        self.chunk(&token)
    }

    /// Split an already signed token into cookies
    pub fn chunk(&self, token: &str) -> Result<Vec<SetCookie>> {
        let base = self.cookie_name();

        if token.len() <= self.chunk_size {
            return Ok(vec![SetCookie::new(base, token, self.secure)]);
        }

        token
            .as_bytes()
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(index, bytes)| {
                let value = std::str::from_utf8(bytes).map_err(|_| {
                    ConsoleError::SessionEncode("token is not ASCII".to_string())
                })?;
                Ok(SetCookie::new(
                    format!("{}.{}", base, index),
                    value,
                    self.secure,
                ))
            })
            .collect()
    }

    /// Chunk cookies present in the jar, sorted by numeric index
    fn chunks<'a>(&self, jar: &'a CookieJar) -> Vec<(usize, &'a str)> {
        let prefix = format!("{}.", self.cookie_name());

        let mut chunks: Vec<(usize, &str)> = jar
            .iter()
            .filter_map(|(name, value)| {
                let index = name.strip_prefix(&prefix)?.parse::<usize>().ok()?;
                Some((index, value))
            })
            .filter(|(_, value)| !value.is_empty())
            .collect();

        chunks.sort_by_key(|(index, _)| *index);
        chunks
    }

    /// Reassemble the raw token from the jar without verifying it
    pub fn read_token(&self, jar: &CookieJar) -> Option<String> {
        let chunks = self.chunks(jar);
        if !chunks.is_empty() {
            return Some(chunks.into_iter().map(|(_, value)| value).collect());
        }

        jar.get(self.cookie_name())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Decode the session carried by the jar
    ///
    /// Missing cookies and verification failures both yield `None`.
    pub fn decode(&self, jar: &CookieJar) -> Option<Session> {
        let token = self.read_token(jar)?;

        match self.verify(&token) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!("Session cookie rejected: {}", e);
                None
            }
        }
    }

    /// Clear directives for the base cookie and every chunk index
    ///
    /// Covers indices `0..max(10, highest present + 1)` so stale chunks from a
    /// larger previous session are dropped too.
    pub fn clear(&self, jar: &CookieJar) -> Vec<SetCookie> {
        let base = self.cookie_name();
        let highest = self
            .chunks(jar)
            .last()
            .map(|(index, _)| index + 1)
            .unwrap_or(0);
        let count = highest.max(MIN_CLEARED_CHUNKS);

        std::iter::once(SetCookie::clear(base, self.secure))
            .chain((0..count).map(|i| SetCookie::clear(format!("{}.{}", base, i), self.secure)))
            .collect()
    }

    /// Full replacement: all clear directives first, then the new chunk set
    pub fn replace(&self, jar: &CookieJar, session: &Session) -> Result<Vec<SetCookie>> {
        let mut directives = self.clear(jar);
        directives.extend(self.encode(session)?);
        Ok(directives)
    }
}
