//! HTTP inbound adapter exposing the form endpoints.

pub mod cache_control;
pub mod error;
pub mod forms;
pub mod forms_dto;
pub mod health;
pub mod identity;
pub mod session;
pub mod session_config;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod xsrf;

pub use error::ApiResult;
