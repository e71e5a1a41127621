//! Construction of the cookies the gateway sets.

use axum_extra::extract::cookie::{Cookie, SameSite};
use std::time::Duration;
use time::Duration as TimeDuration;

use crate::config::ServerConfig;

/// Lifetime of a CSRF cookie and the login attempt it protects.
pub const CSRF_LIFETIME: Duration = Duration::from_secs(3600);

fn build(config: &ServerConfig, name: String, value: String, max_age: TimeDuration) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(!config.insecure_cookie)
        .same_site(SameSite::Lax)
        .max_age(max_age);

    if let Some(domain) = &config.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }

    cookie.build()
}

fn max_age(lifetime: Duration) -> TimeDuration {
    TimeDuration::seconds(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX))
}

/// Builds the session cookie carrying an encoded identity.
#[must_use]
pub fn session(config: &ServerConfig, value: String) -> Cookie<'static> {
    build(config, config.cookie_name.clone(), value, max_age(config.lifetime()))
}

/// Builds a CSRF cookie for one login attempt.
#[must_use]
pub fn csrf(config: &ServerConfig, name: String, value: String) -> Cookie<'static> {
    build(config, name, value, max_age(CSRF_LIFETIME))
}

/// Builds a cookie that makes the browser drop `name`.
#[must_use]
pub fn expired(config: &ServerConfig, name: String) -> Cookie<'static> {
    build(config, name, String::new(), TimeDuration::ZERO)
}
