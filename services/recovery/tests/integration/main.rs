mod helpers;

mod health_test;
mod lifecycle_test;
mod listener_test;
