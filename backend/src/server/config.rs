//! Listener and session-cookie settings for the form server.

use std::net::SocketAddr;

use actix_web::cookie::{Key, SameSite};
use web_form::inbound::http::session_config::BuildMode;
use web_form::settings::AppSettings;

/// Session cookie parameters cloned into every worker.
#[derive(Clone)]
pub(crate) struct SessionCookie {
    pub(crate) key: Key,
    pub(crate) secure: bool,
    pub(crate) same_site: SameSite,
}

/// Resolved inputs for [`super::create_server`].
pub struct ServerConfig {
    pub(crate) session: SessionCookie,
    pub(crate) bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Combine loaded settings with the session key. `SameSite` follows the
    /// build mode: `Lax` for debug builds, `Strict` otherwise.
    #[must_use]
    pub fn from_settings(settings: &AppSettings, key: Key, mode: BuildMode) -> Self {
        Self {
            session: SessionCookie {
                key,
                secure: settings.cookie_secure(),
                same_site: mode.same_site(),
            },
            bind_addr: settings.bind_addr(),
        }
    }

    /// Listen address.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
