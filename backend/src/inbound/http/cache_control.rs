//! Cache-control policies for HTTP handlers.

/// Responses carrying per-caller tokens or probe state must never be cached.
pub const NO_STORE: &str = "no-store";

/// Header tuple for responses that must not be stored by any cache.
pub const fn no_store_header() -> (&'static str, &'static str) {
    ("Cache-Control", NO_STORE)
}
