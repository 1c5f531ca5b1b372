use std::fmt;

use cookie::{Cookie, SameSite};
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};
use time::Duration;

use crate::error::{ConsoleError, Result};

/// One `Set-Cookie` directive
///
/// Every cookie the console writes shares the same attributes:
/// `Path=/; HttpOnly; SameSite=Lax`, plus `Secure` when served over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub secure: bool,
    /// `Some(0)` marks a clear directive
    pub max_age: Option<i64>,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure,
            max_age: None,
        }
    }

    /// Directive telling the browser to drop the cookie
    pub fn clear(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            secure,
            max_age: Some(0),
        }
    }

    pub fn is_clear(&self) -> bool {
        self.max_age == Some(0)
    }

    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure);
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(Duration::seconds(max_age));
        }
        builder.build()
    }

    pub fn to_header_value(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.to_string())
            .map_err(|e| ConsoleError::InvalidCookie(format!("{}: {}", self.name, e)))
    }

    /// Read back a `Set-Cookie` line
    pub fn parse(line: &str) -> Result<Self> {
        let cookie = Cookie::parse(line)
            .map_err(|e| ConsoleError::InvalidCookie(format!("{}: {}", line, e)))?;
        Ok(Self {
            name: cookie.name().to_string(),
            value: cookie.value_trimmed().to_string(),
            secure: cookie.secure().unwrap_or(false),
            max_age: cookie.max_age().map(|age| age.whole_seconds()),
        })
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_cookie(), f)
    }
}

/// Cookies carried by a request, in the order they were sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `Cookie` header of a request
    ///
    /// Malformed pairs (no `=`, empty name) are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            jar.extend_from_str(raw);
        }
        jar
    }

    /// Parse a single `name=value; name2=value2` string
    pub fn parse(raw: &str) -> Self {
        let mut jar = Self::new();
        jar.extend_from_str(raw);
        jar
    }

    fn extend_from_str(&mut self, raw: &str) {
        for cookie in Cookie::split_parse(raw).flatten() {
            self.insert(cookie.name(), cookie.value_trimmed());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a cookie, keeping its original position on replace
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|(n, _)| n != name);
    }

    /// Apply `Set-Cookie` directives the way a browser would
    pub fn apply<'a>(&mut self, directives: impl IntoIterator<Item = &'a SetCookie>) {
        for directive in directives {
            if directive.is_clear() {
                self.remove(&directive.name);
            } else {
                self.insert(directive.name.clone(), directive.value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Render as a `Cookie` request header value
    pub fn to_header_string(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| Cookie::new(n.as_str(), v.as_str()).stripped().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
