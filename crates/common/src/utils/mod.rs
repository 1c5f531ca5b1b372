mod headers;
mod id;
mod time;

pub use headers::{append_set_cookies, set_cookie_lines};
pub use id::generate_id;
pub use time::{calculate_expiry, current_timestamp_secs};
