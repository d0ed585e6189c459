//! Shared domain primitives used by every busbar service.
//!
//! Keep this crate dependency-light: types only, no IO.

pub mod pagination;
pub mod report;
pub mod temporality;
pub mod trace;
pub mod wire;
