//! Caller identity supplied by an authenticating reverse proxy.

use actix_web::http::header::HeaderMap;

use crate::domain::form::Credentials;

/// User name header.
pub const USER_HEADER: &str = "x-forwarded-user";
/// Email header.
pub const EMAIL_HEADER: &str = "x-forwarded-email";
/// Comma-separated group list header.
pub const GROUPS_HEADER: &str = "x-forwarded-groups";

/// Credentials from the forwarded identity headers.
///
/// Returns `None` when neither a user nor an email is present. The user
/// falls back to the email address.
pub fn credentials_from_headers(headers: &HeaderMap) -> Option<Credentials> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    };
    let email = header(EMAIL_HEADER).unwrap_or_default();
    let user = header(USER_HEADER).unwrap_or_else(|| email.clone());
    if user.is_empty() {
        return None;
    }
    let groups = header(GROUPS_HEADER)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|group| !group.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Some(Credentials {
        user,
        email,
        groups,
    })
}
