//! Test utilities for busbar services.
//!
//! Failure-report fixtures and framed-payload builders. Import in
//! `#[cfg(test)]` blocks only — never in production code.

pub mod payload;
pub mod report;
