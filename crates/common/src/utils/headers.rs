use http::header::SET_COOKIE;
use http::HeaderMap;

use crate::error::Result;
use crate::session::SetCookie;

/// Append each directive as its own `Set-Cookie` header, in order
///
/// Existing `Set-Cookie` headers are kept.
pub fn append_set_cookies<'a>(
    headers: &mut HeaderMap,
    directives: impl IntoIterator<Item = &'a SetCookie>,
) -> Result<()> {
    for directive in directives {
        headers.append(SET_COOKIE, directive.to_header_value()?);
    }
    Ok(())
}

/// All `Set-Cookie` lines of a response, in order
pub fn set_cookie_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}
