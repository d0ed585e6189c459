pub mod failure;
pub mod group;
pub mod ingest;
pub mod query;
pub mod reactivate;
pub mod replay;
pub mod retry;
pub mod sync;
