//! Declarative web forms: validation, access control, storage and
//! retrying notification fan-out.

pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;

pub use middleware::Trace;
