//! Per-form session state on top of the Actix cookie session.
//!
//! Each form keeps its own [`SessionState`] under `form:<name>`, so an
//! access code accepted for one form never unlocks another.

use actix_session::config::{CookieContentSecurity, PersistentSession};
use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::{Key, SameSite, time::Duration};
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures_util::future::LocalBoxFuture;

use crate::domain::Error;
use crate::domain::access::SessionState;

/// Name of the encrypted session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Lifetime of a session without activity.
const SESSION_TTL_HOURS: i64 = 12;

/// Encrypted cookie session holding every form's state.
pub fn session_middleware(
    key: Key,
    cookie_secure: bool,
    same_site: SameSite,
) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(same_site)
        .session_lifecycle(PersistentSession::default().session_ttl(Duration::hours(SESSION_TTL_HOURS)))
        .build()
}

fn session_key(form: &str) -> String {
    format!("form:{form}")
}

/// Newtype wrapper exposing per-form session operations.
#[derive(Clone)]
pub struct FormSession(Session);

impl FormSession {
    /// Construct a new wrapper from the underlying Actix session.
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// State stored for `form`, or an empty state.
    ///
    /// A state that no longer deserialises is discarded with a warning.
    pub fn load(&self, form: &str) -> Result<SessionState, Error> {
        match self.0.get::<SessionState>(&session_key(form)) {
            Ok(state) => Ok(state.unwrap_or_default()),
            Err(error) => {
                tracing::warn!(form, %error, "discarding unreadable form session");
                self.0.remove(&session_key(form));
                Ok(SessionState::default())
            }
        }
    }

    /// Persist `state` for `form`; an empty state removes the entry.
    pub fn store(&self, form: &str, state: &SessionState) -> Result<(), Error> {
        if state.is_empty() {
            self.0.remove(&session_key(form));
            return Ok(());
        }
        self.0
            .insert(session_key(form), state)
            .map_err(|error| Error::internal(format!("failed to persist session: {error}")))
    }
}

impl FromRequest for FormSession {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Session::from_request(req, payload);
        Box::pin(async move { fut.await.map(FormSession::new) })
    }
}
