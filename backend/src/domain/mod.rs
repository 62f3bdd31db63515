//! Domain model and submission pipeline.
//!
//! Purpose: keep form semantics independent of HTTP, storage, template and
//! broker technology. Adapters live in `inbound` and `outbound` and meet the
//! domain at the traits in [`ports`].
//!
//! Public surface:
//! - `form`: immutable form definitions and typed field values.
//! - `validation`: per-field parsing and coercion of raw input.
//! - `access`: XSRF, policy, access-code and captcha gates.
//! - `submission`: request orchestration and the form registry.
//! - `notification`: queued, retrying webhook and broker delivery.
//! - Error (alias to `error::Error`): API error response payload.
//! - TraceId (alias to `trace_id::TraceId`): request correlation id.

pub mod access;
pub mod error;
pub mod form;
pub mod notification;
pub mod ports;
pub mod submission;
pub mod trace_id;
pub mod validation;

pub use self::error::{Error, ErrorCode, TRACE_ID_HEADER};
pub use self::trace_id::TraceId;

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use web_form::domain::{ApiResult, Error};
///
/// fn lookup(known: bool) -> ApiResult<&'static str> {
///     if known { Ok("signup") } else { Err(Error::not_found("no such form")) }
/// }
/// assert!(lookup(false).is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
