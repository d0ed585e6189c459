pub mod bus;
pub mod db;
pub mod inspect;
pub mod task;
