pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod listener;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod usecase;
