//! Handlers answering the reverse proxy.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use porter_access::csrf::{self, CsrfState};
use porter_access::{Action, CookieError, CsrfError, DEFAULT_RULE, ProviderError, User};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use super::{AppState, Forwarded, cookies};
use crate::config::{ServerConfig, USERINFO_PATH};
use crate::error::AuthError;

/// Header carrying the verified identity to the backend.
pub const X_FORWARDED_USER: &str = "x-forwarded-user";

/// Query parameters the provider sends to the callback.
#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

/// What a forwarded request is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Callback,
    Logout,
    UserInfo,
    Allow { rule: String },
    Auth { rule: String },
}

impl Route {
    fn resolve(state: &AppState, forwarded: &Forwarded) -> Self {
        let config = &state.config;
        let path = forwarded.path();

        if path == config.path {
            return Self::Callback;
        }
        if path == config.logout_path() {
            return Self::Logout;
        }
        if path == USERINFO_PATH {
            return Self::UserInfo;
        }

        let rule = state
            .matcher
            .match_rule(forwarded)
            .unwrap_or(DEFAULT_RULE)
            .to_string();

        match config.rule(&rule).action {
            Action::Allow => Self::Allow { rule },
            Action::Auth => Self::Auth { rule },
        }
    }

    fn handler(&self) -> &'static str {
        match self {
            Self::Callback => "callback",
            Self::Logout => "logout",
            Self::UserInfo => "userinfo",
            Self::Allow { .. } => "allow",
            Self::Auth { .. } => "auth",
        }
    }

    fn rule(&self) -> Option<&str> {
        match self {
            Self::Allow { rule } | Self::Auth { rule } => Some(rule),
            _ => None,
        }
    }
}

/// Answers every request the proxy forwards.
pub async fn forward_auth(
    State(state): State<Arc<AppState>>,
    forwarded: Forwarded,
    jar: CookieJar,
) -> Response {
    let route = Route::resolve(&state, &forwarded);

    let span = info_span!(
        "request",
        handler = route.handler(),
        rule = route.rule(),
        method = %forwarded.method,
        proto = %forwarded.proto,
        host = %forwarded.host,
        uri = %forwarded.uri,
        source_ip = %forwarded.source_ip,
    );

    async move {
        match &route {
            Route::Allow { .. } => {
                debug!("allowing request");
                (StatusCode::OK, "OK").into_response()
            }
            Route::Auth { rule } => authenticate(&state, &forwarded, jar, rule),
            Route::Callback => callback(&state, &forwarded, jar).await,
            Route::Logout => logout(&state, jar).await,
            Route::UserInfo => user_info(&state, jar).await.into_response(),
        }
    }
    .instrument(span)
    .await
}

fn authenticate(state: &AppState, forwarded: &Forwarded, jar: CookieJar, rule: &str) -> Response {
    let config = &state.config;

    let Some(cookie) = jar.get(&config.cookie_name) else {
        debug!("no session cookie");
        return start_login(state, forwarded, jar, rule);
    };

    match state.session_codec.decode(&config.cookie_name, cookie.value()) {
        Ok(identity) => {
            if !state.policy.validate_email(&identity, rule) {
                return AuthError::PolicyDenied {
                    identity,
                    rule: rule.to_string(),
                }
                .into_response();
            }
            authorized(&identity)
        }
        Err(CookieError::Expired) => {
            debug!("session cookie expired");
            start_login(state, forwarded, jar, rule)
        }
        Err(e) => AuthError::from(e).into_response(),
    }
}

/// Answers 200 naming `identity`. Internationalized addresses are sent as
/// raw UTF-8; only control characters cannot be carried.
fn authorized(identity: &str) -> Response {
    match axum::http::HeaderValue::from_bytes(identity.as_bytes()) {
        Ok(value) => {
            debug!(user = identity, "allowing valid request");
            (StatusCode::OK, [(X_FORWARDED_USER, value)], "OK").into_response()
        }
        Err(_) => AuthError::InvalidCookie(CookieError::InvalidFormat {
            reason: "identity is not a valid header value".to_string(),
        })
        .into_response(),
    }
}

fn start_login(state: &AppState, forwarded: &Forwarded, jar: CookieJar, rule: &str) -> Response {
    match login_redirect(state, forwarded, rule) {
        Ok((cookie, login_url)) => (jar.add(cookie), Redirect::temporary(&login_url)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Prepares the CSRF cookie and the provider login URL for a new login.
fn login_redirect(
    state: &AppState,
    forwarded: &Forwarded,
    rule: &str,
) -> Result<(Cookie<'static>, String), AuthError> {
    let config = &state.config;
    let rule = config.rule(rule);
    let provider = state.providers.get(config.provider_for(&rule))?;

    let nonce = csrf::nonce()?;
    let login_state = csrf::make_state(&forwarded.return_url(), provider.name(), &nonce);
    let login_url = provider.login_url(&forwarded.callback_url(&config.path), &login_state)?;

    let name = csrf::csrf_cookie_name(&config.csrf_cookie_name, &nonce);
    let value = state.csrf_codec.encode(&name, &login_state)?;

    warn_if_insecure(config, forwarded);
    debug!(provider = provider.name(), "redirecting to identity provider");
    Ok((cookies::csrf(config, name, value), login_url))
}

async fn callback(state: &AppState, forwarded: &Forwarded, jar: CookieJar) -> Response {
    let config = &state.config;
    let query = Query::<CallbackQuery>::try_from_uri(&forwarded.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();

    let login_state = match csrf::validate_state(&query.state) {
        Ok(login_state) => login_state,
        Err(e) => return AuthError::from(e).into_response(),
    };

    let cookie_name = csrf::csrf_cookie_name(&config.csrf_cookie_name, login_state.nonce());
    let Some(cookie_value) = jar.get(&cookie_name).map(|c| c.value().to_string()) else {
        return AuthError::from(CsrfError::MissingCsrfCookie { name: cookie_name }).into_response();
    };

    let jar = jar.add(cookies::expired(config, cookie_name.clone()));

    match finish_login(state, forwarded, &cookie_name, &cookie_value, &login_state, query.code).await {
        Ok((session, target)) => (jar.add(session), Redirect::temporary(&target)).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

/// Verifies the CSRF cookie, resolves the user and mints a session.
async fn finish_login(
    state: &AppState,
    forwarded: &Forwarded,
    cookie_name: &str,
    cookie_value: &str,
    login_state: &CsrfState,
    code: String,
) -> Result<(Cookie<'static>, String), AuthError> {
    let config = &state.config;
    let sealed = csrf::validate_csrf_cookie(
        &state.csrf_codec,
        cookie_name,
        cookie_value,
        login_state,
        &state.providers,
    )?;

    let provider = state.providers.get(sealed.provider())?;
    let provider_name = provider.name().to_string();
    let redirect_uri = forwarded.callback_url(&config.path);

    // Runs to completion even if the client goes away; the result is then
    // dropped with this future and no cookie is written.
    let exchange =
        tokio::spawn(async move { provider.get_user_from_code(&code, &redirect_uri).await });
    let (user, access_token) = match exchange.await {
        Ok(result) => result?,
        Err(e) => {
            return Err(provider_failure(&provider_name, format!("provider task failed: {e}")));
        }
    };

    let identity = user.session_identity();
    if identity.is_empty() {
        return Err(provider_failure(&provider_name, "provider returned no identity".to_string()));
    }

    let value = state.session_codec.encode(&config.cookie_name, identity)?;
    state.tokens.insert(&value, &provider_name, &access_token).await;

    warn_if_insecure(config, forwarded);
    info!(user = identity, provider = %provider_name, "user logged in");
    Ok((cookies::session(config, value), post_login_target(sealed.redirect())))
}

fn provider_failure(provider: &str, reason: String) -> AuthError {
    AuthError::Provider(
        ProviderError::UserFetchFailed {
            provider: provider.to_string(),
            reason,
        }
        .into(),
    )
}

/// The userinfo endpoint is an API; after login land on the site root.
fn post_login_target(redirect: &str) -> String {
    match Url::parse(redirect) {
        Ok(url) if url.path() == USERINFO_PATH => url.origin().ascii_serialization(),
        _ => redirect.to_string(),
    }
}

async fn logout(state: &AppState, jar: CookieJar) -> Response {
    let config = &state.config;

    if let Some(value) = jar.get(&config.cookie_name).map(|c| c.value().to_string()) {
        state.tokens.remove(&value).await;
    }
    let jar = jar.add(cookies::expired(config, config.cookie_name.clone()));

    info!("user logged out");
    match config.logout_redirect.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => (jar, Redirect::temporary(url)).into_response(),
        None => (jar, (StatusCode::UNAUTHORIZED, "You have been logged out")).into_response(),
    }
}

async fn user_info(state: &AppState, jar: CookieJar) -> Result<Json<User>, AuthError> {
    let config = &state.config;
    let session = jar
        .get(&config.cookie_name)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::MissingSession)?;

    let identity = state.session_codec.decode(&config.cookie_name, &session)?;
    let stored = state
        .tokens
        .get(&session)
        .await
        .ok_or(AuthError::MissingToken)?;

    let provider = state.providers.get(stored.provider())?;
    let user = provider.user_info(stored.access_token()).await?;

    debug!(user = %identity, "served userinfo");
    Ok(Json(user))
}

fn warn_if_insecure(config: &ServerConfig, forwarded: &Forwarded) {
    if !config.insecure_cookie && !forwarded.is_https() {
        warn!("issuing Secure cookies for a request not received over https; browsers will drop them unless insecure_cookie is set");
    }
}
