//! Double-submit anti-forgery tokens.
//!
//! The token lives in an `HttpOnly` cookie and is echoed in the page payload
//! so clients can send it back as the `_xsrf` form input.

use actix_web::HttpRequest;
use actix_web::cookie::{Cookie, SameSite};
use rand::RngCore;

use crate::domain::form::XSRF_FIELD;

/// Cookie carrying the issued token.
pub const XSRF_COOKIE: &str = XSRF_FIELD;

const TOKEN_BYTES: usize = 32;

/// Token issued to the client, and whether it still needs to be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsrfToken {
    value: String,
    issued_now: bool,
}

impl XsrfToken {
    /// Reuse the token from the request cookie or mint a new one.
    pub fn for_request(req: &HttpRequest) -> Self {
        match req.cookie(XSRF_COOKIE).filter(|cookie| !cookie.value().is_empty()) {
            Some(cookie) => Self {
                value: cookie.value().to_owned(),
                issued_now: false,
            },
            None => Self {
                value: generate(),
                issued_now: true,
            },
        }
    }

    /// Token value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Token the client already held before this request.
    pub fn issued(&self) -> Option<String> {
        (!self.issued_now).then(|| self.value.clone())
    }

    /// Cookie to attach when the token was minted for this request.
    pub fn cookie(&self, secure: bool) -> Option<Cookie<'static>> {
        self.issued_now.then(|| {
            Cookie::build(XSRF_COOKIE, self.value.clone())
                .path("/")
                .http_only(true)
                .secure(secure)
                .same_site(SameSite::Strict)
                .finish()
        })
    }
}

fn generate() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
