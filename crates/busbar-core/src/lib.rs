//! Shared service plumbing for busbar services.
//!
//! Tracing setup, health handlers, HTTP middleware, and sea-orm helpers.

pub mod health;
pub mod middleware;
pub mod sea_ext;
pub mod tracing;
