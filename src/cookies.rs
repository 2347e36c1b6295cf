// src/cookies.rs
//! Cookies: `Set-Cookie` rendering, request header lookup and the client-side
//! [`CookieDocument`].
//!
//! The cookie is the canonical store for a consent snapshot. It is the only backend
//! a server can read, so every client write that lands somewhere else is mirrored
//! into it as well.

mod attributes;
mod cookie_jar;

pub use attributes::expire_cookie;
pub use attributes::read_cookie;
pub use attributes::set_cookie;
pub use attributes::SameSite;

pub use cookie_jar::Cookie;
pub use cookie_jar::CookieDocument;
pub use cookie_jar::CookieDocumentHandle;
pub use cookie_jar::DefaultCookieJar;
