//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **template**: MiniJinja renderer with markdown helpers
//! - **policy**: Rhai expressions evaluated against caller credentials
//! - **persistence**: JSON-file and in-memory submission stores
//! - **webhook**: reqwest-backed webhook transport
//! - **amqp**: lapin-backed broker connector
//! - **captcha**: Cloudflare Turnstile verifier
//! - **forms**: TOML/JSON form definition loader
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod amqp;
pub mod captcha;
pub mod forms;
pub mod persistence;
pub mod policy;
pub mod template;
pub mod webhook;
