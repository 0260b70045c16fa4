//! Expressing session state as a cookie.
//!
//! A session that holds values and has not expired is written as its id with
//! a matching `Expires`/`Max-Age`. Anything else (empty, expired, or never
//! given an expiry) is written as a removal cookie: empty value, immediate
//! expiry and a negative `Max-Age`.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
use chrono::{DateTime, Utc};
use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};
use satchel_session::Session;

use crate::config::SessionConfig;
use crate::error::{Result, ServerError};

/// Read the session id from the request's cookies.
///
/// A missing cookie, or a `Cookie` header that cannot be parsed, yields an
/// empty id rather than an error.
pub fn session_id(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .unwrap_or_default()
}

/// The cookie expressing `session` as of `now`.
pub fn session_cookie(
    config: &SessionConfig,
    session: &Session,
    now: DateTime<Utc>,
) -> Cookie<'static> {
    match session.expiry() {
        Some(expires) if !session.is_empty() && now < expires => {
            let mut builder = base(config, session.id().to_string())
                .max_age(Duration::seconds(max_age_secs(expires, now)));
            // Expiries beyond what the cookie date format can carry rely on Max-Age alone.
            if let Some(at) = to_offset(expires) {
                builder = builder.expires(at);
            }
            builder.build()
        }
        _ => removal_cookie(config, now),
    }
}

/// A cookie instructing the client to discard any stored session id.
pub fn removal_cookie(config: &SessionConfig, now: DateTime<Utc>) -> Cookie<'static> {
    let mut builder = base(config, String::new()).max_age(Duration::seconds(-1));
    if let Some(at) = to_offset(now) {
        builder = builder.expires(at);
    }
    builder.build()
}

/// Seconds from `now` until `expires`, saturating instead of overflowing.
pub fn max_age_secs(expires: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    expires.timestamp().saturating_sub(now.timestamp())
}

/// Encode a cookie as a `Set-Cookie` header value.
pub fn to_header_value(cookie: &Cookie<'_>) -> Result<HeaderValue> {
    HeaderValue::from_str(&cookie.to_string()).map_err(|e| {
        ServerError::Cookie(format!("cannot encode cookie '{}': {}", cookie.name(), e))
    })
}

fn base(config: &SessionConfig, value: String) -> cookie::CookieBuilder<'static> {
    let mut builder = Cookie::build((config.cookie_name.clone(), value))
        .path(config.path().to_string())
        .http_only(true)
        .same_site(SameSite::Lax);
    if let Some(domain) = &config.cookie_domain {
        builder = builder.domain(domain.clone());
    }
    builder
}

fn to_offset(at: DateTime<Utc>) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()
}
