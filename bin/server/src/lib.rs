//! porter forward-authentication gateway.
//!
//! A reverse proxy asks this server whether each incoming request may pass.
//! The answer is `200` with an `X-Forwarded-User` header, a redirect into
//! an OpenID Connect login, or `401`. The server also owns the login
//! callback, logout and a small userinfo endpoint.
//!
//! Cookie codecs, policy and providers live in `porter-access`; this crate
//! wires them to HTTP.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
